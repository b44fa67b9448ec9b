use thiserror::Error;

use crate::layout::LayoutMismatch;

#[derive(Debug, Error)]
pub enum Error {
    #[error("layout error in extractor '{extractor}': {mismatch}")]
    Layout {
        extractor: String,
        mismatch: LayoutMismatch,
    },
    #[error("gather mismatch in extractor '{extractor}' from rank {rank}: {detail}")]
    GatherMismatch {
        extractor: String,
        rank: usize,
        detail: String,
    },
    #[error("extractor '{extractor}' recorded an event it did not validate")]
    NotValidated { extractor: String },
    #[error("extractor '{extractor}' was already merged and cannot record")]
    Sealed { extractor: String },
    #[error("invalid partition: {0}")]
    Partition(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("calibration error: {0}")]
    Calibration(String),
    #[error("worker rank {rank} left the run before gather")]
    WorkerLost { rank: usize },
    #[error("worker rank {rank} panicked")]
    WorkerPanicked { rank: usize },
    #[error("event source error: {0:#}")]
    Source(anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[cfg(feature = "storage")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    /// Structural failures abort the run; everything else is environmental.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Layout { .. } | Error::GatherMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
