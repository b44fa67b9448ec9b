//! Abstractions over the acquisition stream.
//!
//! Extractors only ever see the traits below, so a real backend can be
//! swapped in without touching extraction code. The bundled [`MemoryRun`]
//! serves tests and the JSON-lines loader used by the binary.

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};

use crate::value::Value;

pub mod jsonl;
pub mod memory;

pub use memory::{DetectorRecord, Image, MemoryEvent, MemoryRun, SlowControlLog};

/// Position of one event in the time-ordered run index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTime(pub u64);

/// A random-access, time-indexed run.
pub trait EventSource: Send + Sync {
    /// Every event time of the run in ascending order.
    fn times(&self) -> &[EventTime];

    /// Returns the event at `time`, or `None` if the backend cannot produce it.
    fn event_at(&self, time: EventTime) -> AnyResult<Option<Box<dyn EventHandle + '_>>>;

    /// Side-channel slow-control values associated with this run.
    fn slow_control(&self) -> &dyn SlowControlStore;
}

/// Read-only view of one event.
pub trait EventHandle {
    /// Structured detector object published under `source`.
    fn detector(&self, source: &str) -> Option<&dyn DetectorData>;

    /// One channel of a digitizer's waveform readout.
    fn waveform(&self, device: &str, channel: usize) -> Option<&[f64]>;

    /// Raw image published under `alias`.
    fn image(&self, alias: &str) -> Option<ImageView<'_>>;

    /// Event codes fired for this event, if the timing system reported any.
    fn event_codes(&self) -> Option<&[u16]>;
}

impl<T: EventHandle + ?Sized> EventHandle for &T {
    fn detector(&self, source: &str) -> Option<&dyn DetectorData> {
        (**self).detector(source)
    }

    fn waveform(&self, device: &str, channel: usize) -> Option<&[f64]> {
        (**self).waveform(device, channel)
    }

    fn image(&self, alias: &str) -> Option<ImageView<'_>> {
        (**self).image(alias)
    }

    fn event_codes(&self) -> Option<&[u16]> {
        (**self).event_codes()
    }
}

/// A structured detector object with named attributes and accessors.
pub trait DetectorData {
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Result of a zero-argument accessor.
    fn accessor(&self, name: &str) -> Option<Value>;
}

/// Slow-control key-value store.
pub trait SlowControlStore: Send + Sync {
    /// Value of `channel` as seen by the event at `at`.
    fn value(&self, channel: &str, at: EventTime) -> Option<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDims {
    One(usize),
    Two { rows: usize, cols: usize },
}

/// Borrowed row-major image data.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub shape: &'a [usize],
    pub data: &'a [f64],
}

impl<'a> ImageView<'a> {
    /// `None` when the shape is neither 1-D nor 2-D or disagrees with the data.
    pub fn dims(&self) -> Option<ImageDims> {
        let dims = match *self.shape {
            [len] => ImageDims::One(len),
            [rows, cols] => ImageDims::Two { rows, cols },
            _ => return None,
        };
        let expected = match dims {
            ImageDims::One(len) => len,
            ImageDims::Two { rows, cols } => rows.checked_mul(cols)?,
        };
        (expected == self.data.len()).then_some(dims)
    }
}

/// Everything an extractor may look at for one event.
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    pub time: EventTime,
    pub event: &'a dyn EventHandle,
    pub slow: &'a dyn SlowControlStore,
}

impl<'a> EventContext<'a> {
    pub fn new(time: EventTime, event: &'a dyn EventHandle, slow: &'a dyn SlowControlStore) -> Self {
        Self { time, event, slow }
    }

    pub fn slow_value(&self, channel: &str) -> Option<Value> {
        self.slow.value(channel, self.time)
    }
}
