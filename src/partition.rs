//! Deterministic split of the run's time index across workers.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::source::EventTime;

/// One worker's contiguous slice of the time-ordered event index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub start: usize,
    pub len: usize,
}

impl Partition {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slice<'a>(&self, times: &'a [EventTime]) -> &'a [EventTime] {
        &times[self.range()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    total: usize,
    workers: usize,
    cap: Option<usize>,
}

impl Partitioner {
    pub fn new(total: usize, workers: usize, cap: Option<usize>) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Partition("worker count must be > 0".to_string()));
        }
        Ok(Self {
            total,
            workers,
            cap,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Events per worker before any cap; the `total % workers` tail is dropped.
    pub fn events_per_rank(&self) -> usize {
        self.total / self.workers
    }

    /// Slice length each worker actually processes.
    pub fn slice_len(&self) -> usize {
        let per_rank = self.events_per_rank();
        match self.cap {
            Some(cap) => per_rank.min(cap / self.workers),
            None => per_rank,
        }
    }

    /// With a cap the workers share the first `workers * slice_len` events.
    pub fn partition(&self, rank: usize) -> Result<Partition> {
        if rank >= self.workers {
            return Err(Error::Partition(format!(
                "rank {rank} out of range for {} workers",
                self.workers
            )));
        }
        let len = self.slice_len();
        Ok(Partition {
            rank,
            start: rank * len,
            len,
        })
    }

    pub fn partitions(&self) -> Vec<Partition> {
        let len = self.slice_len();
        (0..self.workers)
            .map(|rank| Partition {
                rank,
                start: rank * len,
                len,
            })
            .collect()
    }
}
