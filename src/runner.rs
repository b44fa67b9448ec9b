//! Fixed worker pool driving one run from partition to dataset.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::aggregate::Aggregator;
use crate::comm::{Communicator, LocalComm, ROOT};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::event_loop::{EventLoop, LoopSummary, DEFAULT_PROGRESS_EVERY};
use crate::partition::Partitioner;
use crate::registry::ExtractorRegistry;
use crate::source::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub run: u32,
    pub workers: usize,
    pub max_events: Option<usize>,
    pub progress_every: u64,
}

impl RunPlan {
    pub fn new(run: u32, workers: usize) -> Self {
        Self {
            run,
            workers,
            max_events: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn max_events(mut self, max_events: Option<usize>) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn progress_every(mut self, events: u64) -> Self {
        self.progress_every = events;
        self
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub dataset: Dataset,
    /// One per rank, in rank order.
    pub summaries: Vec<LoopSummary>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn good(&self) -> u64 {
        self.summaries.iter().map(|s| s.good).sum()
    }

    pub fn bad(&self) -> u64 {
        self.summaries.iter().map(|s| s.bad).sum()
    }
}

type WorkerResult = Result<(LoopSummary, Option<Dataset>)>;

/// Runs `plan.workers` extraction workers over `source` and returns the
/// dataset assembled on root.
///
/// Each worker builds its own registry from `factory`, so no extractor
/// state is shared between threads. Any worker failure fails the whole run.
pub fn run_parallel<F>(source: Arc<dyn EventSource>, plan: &RunPlan, factory: F) -> Result<RunOutcome>
where
    F: Fn() -> Result<ExtractorRegistry> + Send + Sync + 'static,
{
    let start = Instant::now();
    let total = source.times().len();
    let partitioner = Partitioner::new(total, plan.workers, plan.max_events)?;
    match plan.max_events {
        Some(cap) => info!("run {}: processing the first {cap} of {total} events", plan.run),
        None => info!("run {}: processing all {total} events", plan.run),
    }
    info!(
        "run {}: {} workers x {} events",
        plan.run,
        plan.workers,
        partitioner.slice_len()
    );

    let factory = Arc::new(factory);
    let mut handles = Vec::with_capacity(plan.workers);
    for comm in LocalComm::group(plan.workers)? {
        let rank = comm.rank();
        let source = Arc::clone(&source);
        let factory = Arc::clone(&factory);
        let progress_every = plan.progress_every;
        let handle = thread::Builder::new()
            .name(format!("extract-worker-{rank}"))
            .spawn(move || -> WorkerResult {
                let mut registry = factory()?;
                let partition = partitioner.partition(rank)?;
                let mut event_loop =
                    EventLoop::new(partition, &mut registry).progress_every(progress_every);
                event_loop.run(source.as_ref())?;
                let summary = event_loop.finish()?;
                let dataset = Aggregator::new(&comm).gather(&mut registry)?;
                Ok((summary, dataset))
            })?;
        handles.push(handle);
    }

    let results: Vec<WorkerResult> = handles
        .into_iter()
        .enumerate()
        .map(|(rank, handle)| {
            handle
                .join()
                .unwrap_or_else(|_| Err(Error::WorkerPanicked { rank }))
        })
        .collect();

    let mut summaries = Vec::with_capacity(results.len());
    let mut dataset = None;
    let mut failures = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok((summary, gathered)) => {
                summaries.push(summary);
                if rank == ROOT {
                    dataset = gathered;
                }
            }
            Err(err) => failures.push(err),
        }
    }
    if let Some(err) = root_cause(failures) {
        return Err(err);
    }
    let dataset = dataset.ok_or(Error::WorkerLost { rank: ROOT })?;

    let outcome = RunOutcome {
        dataset,
        summaries,
        elapsed: start.elapsed(),
    };
    info!(
        "run {}: done in {:.2}s, {} good and {} bad events, {} tables",
        plan.run,
        outcome.elapsed.as_secs_f64(),
        outcome.good(),
        outcome.bad(),
        outcome.dataset.len()
    );
    Ok(outcome)
}

/// Structural errors first, then anything that is not a knock-on
/// `WorkerLost`, then the first lost worker.
fn root_cause(failures: Vec<Error>) -> Option<Error> {
    let rank_of = |err: &Error| match err {
        e if e.is_structural() => 0,
        Error::WorkerLost { .. } => 2,
        _ => 1,
    };
    failures.into_iter().min_by_key(rank_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{EventCodeExtractor, FieldRef, ScalarFieldExtractor};
    use crate::source::{DetectorRecord, EventTime, MemoryEvent, MemoryRun};

    fn run(events: u64) -> Arc<dyn EventSource> {
        let mut run = MemoryRun::new();
        for t in 0..events {
            run.push(
                EventTime(t),
                MemoryEvent::new()
                    .with_event_codes(vec![(t % 3) as u16])
                    .with_detector("gd", DetectorRecord::new().with_attribute("e", t as f64)),
            );
        }
        Arc::new(run)
    }

    fn factory() -> Result<ExtractorRegistry> {
        ExtractorRegistry::new()
            .with(EventCodeExtractor::new("EVR"))?
            .with(ScalarFieldExtractor::new("gd", "gd", vec![FieldRef::attribute("e")])?)
    }

    #[test]
    fn runs_every_worker_and_gathers_on_root() {
        let outcome = run_parallel(run(90), &RunPlan::new(7, 3), factory).unwrap();
        assert_eq!(outcome.summaries.len(), 3);
        assert_eq!(outcome.good(), 90);
        assert_eq!(outcome.bad(), 0);
        assert_eq!(outcome.dataset.names(), vec!["EVR", "gd"]);
        assert_eq!(outcome.dataset.row_count("gd"), Some(90));
        assert_eq!(outcome.dataset.get("EVR").unwrap().num_columns(), 3);
    }

    #[test]
    fn factory_failure_fails_the_run() {
        let err = run_parallel(run(10), &RunPlan::new(1, 2), || {
            Err(Error::Config("broken".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(run_parallel(run(10), &RunPlan::new(1, 0), factory).is_err());
    }

    #[test]
    fn root_cause_prefers_structural_errors() {
        let err = root_cause(vec![
            Error::WorkerLost { rank: 1 },
            Error::WorkerPanicked { rank: 2 },
            Error::GatherMismatch {
                extractor: "EVR".to_string(),
                rank: 1,
                detail: String::new(),
            },
        ])
        .unwrap();
        assert!(err.is_structural());
        assert!(matches!(
            root_cause(vec![Error::WorkerLost { rank: 1 }, Error::WorkerPanicked { rank: 3 }]),
            Some(Error::WorkerPanicked { rank: 3 })
        ));
    }
}
