//! Parallel per-event extraction of instrument data into columnar tables.
//!
//! A run's time-ordered event index is split across a fixed pool of
//! workers. Each worker feeds its slice through an ordered set of
//! extractors; an event is kept only when every extractor accepts it.
//! Once all slices are drained the per-worker buffers are gathered on root
//! and materialized as one Arrow `RecordBatch` per extractor.

pub mod aggregate;
pub mod calibration;
pub mod columns;
pub mod comm;
pub mod config;
pub mod dataset;
pub mod error;
pub mod event_loop;
pub mod extract;
pub mod layout;
pub mod manifest;
pub mod partition;
pub mod registry;
pub mod runner;
pub mod source;
#[cfg(feature = "storage")]
pub mod storage;
pub mod value;

pub use aggregate::Aggregator;
pub use calibration::{CalibrationTable, RunCalibration};
pub use comm::{Communicator, LocalComm};
pub use config::{ExtractionConfig, ExtractorSpec};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use event_loop::{EventLoop, LoopState, LoopSummary};
pub use extract::{Extractor, ExtractorBuffer, ExtractorStats};
pub use layout::{FieldType, RecordLayout};
pub use manifest::{CapabilityManifest, ManifestEntry};
pub use partition::{Partition, Partitioner};
pub use registry::ExtractorRegistry;
pub use runner::{run_parallel, RunOutcome, RunPlan};
pub use source::{EventContext, EventSource, EventTime};
pub use value::Value;
