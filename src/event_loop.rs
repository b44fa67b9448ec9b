use std::time::{Duration, Instant};

use log::info;

use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::registry::ExtractorRegistry;
use crate::source::{EventContext, EventSource};

pub const DEFAULT_PROGRESS_EVERY: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Draining,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub rank: usize,
    pub processed: u64,
    pub good: u64,
    pub bad: u64,
    pub elapsed: Duration,
}

/// Drives one worker's partition through its extractor registry.
pub struct EventLoop<'r> {
    partition: Partition,
    registry: &'r mut ExtractorRegistry,
    progress_every: u64,
    state: LoopState,
    summary: LoopSummary,
}

impl<'r> EventLoop<'r> {
    pub fn new(partition: Partition, registry: &'r mut ExtractorRegistry) -> Self {
        Self {
            partition,
            registry,
            progress_every: DEFAULT_PROGRESS_EVERY,
            state: LoopState::Idle,
            summary: LoopSummary {
                rank: partition.rank,
                ..LoopSummary::default()
            },
        }
    }

    /// Progress readout cadence in events; 0 disables it.
    pub fn progress_every(mut self, events: u64) -> Self {
        self.progress_every = events;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// Runs the partition to exhaustion and stops in `Draining`.
    ///
    /// An event is recorded by every extractor or by none. A layout error
    /// aborts the loop and leaves it in `Running`.
    pub fn run(&mut self, source: &dyn EventSource) -> Result<LoopSummary> {
        if self.state != LoopState::Idle {
            return Err(Error::Config(format!(
                "event loop for rank {} already ran",
                self.partition.rank
            )));
        }
        let all_times = source.times();
        let times = all_times.get(self.partition.range()).ok_or_else(|| {
            Error::Partition(format!(
                "partition {:?} exceeds the run's {} events",
                self.partition.range(),
                all_times.len()
            ))
        })?;
        let slow = source.slow_control();
        let rank = self.partition.rank;
        let start = Instant::now();

        self.state = LoopState::Running;
        info!("rank {rank}: starting event loop over {} events", times.len());

        for (counter, &time) in times.iter().enumerate() {
            if self.progress_every > 0 && counter as u64 % self.progress_every == 0 {
                info!(
                    "rank {rank}: events {} good {}",
                    counter, self.summary.good
                );
            }
            self.summary.processed += 1;

            let Some(event) = source.event_at(time).map_err(Error::Source)? else {
                self.summary.bad += 1;
                continue;
            };
            let ctx = EventContext::new(time, event.as_ref(), slow);
            if !self.registry.validate_all(&ctx) {
                self.summary.bad += 1;
                continue;
            }
            self.registry.record_all(&ctx)?;
            self.summary.good += 1;
        }

        self.summary.elapsed = start.elapsed();
        self.state = LoopState::Draining;
        Ok(self.summary)
    }

    /// Freezes the drained loop; the registry buffers are ready for gathering.
    pub fn finish(&mut self) -> Result<LoopSummary> {
        if self.state != LoopState::Draining {
            return Err(Error::Config(format!(
                "event loop for rank {} finished while {:?}",
                self.partition.rank, self.state
            )));
        }
        self.state = LoopState::Done;
        info!(
            "rank {}: done, {} good / {} bad in {:.2?}",
            self.partition.rank, self.summary.good, self.summary.bad, self.summary.elapsed
        );
        Ok(self.summary)
    }
}
