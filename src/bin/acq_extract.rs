use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use acq_extract::calibration::CalibrationTable;
use acq_extract::source::jsonl;
use acq_extract::storage::{DatasetWriter, ParquetDatasetWriter};
use acq_extract::{run_parallel, ExtractionConfig, RunPlan};
use anyhow::{bail, Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(name = "acq-extract")]
#[command(about = "Extract per-event detector data for one run into Parquet tables")]
struct Cli {
    /// Run number to process
    run: u32,

    /// Only process the first N events of the run
    #[arg(long)]
    maxevt: Option<usize>,

    /// Worker count (default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Extraction config (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Run-range calibration table (CSV)
    #[arg(long)]
    calibrations: Option<PathBuf>,

    /// Run event file (JSON lines)
    #[arg(long)]
    source: PathBuf,

    /// Directory the run's output directory is created in
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ExtractionConfig::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;

    config.manifest.report(cli.run);

    let coefficients = config.coefficients();
    let calibration = match &cli.calibrations {
        Some(path) => {
            let table = CalibrationTable::load(path)
                .with_context(|| format!("load calibrations {}", path.display()))?;
            table.require(&coefficients)?;
            let cal = table.for_run(cli.run)?;
            log::info!("run {}: calibration {:?}", cli.run, cal);
            Some(cal)
        }
        None if !coefficients.is_empty() => {
            bail!("config references calibration coefficients {coefficients:?}; pass --calibrations")
        }
        None => None,
    };

    let source = jsonl::load_run(&cli.source)
        .with_context(|| format!("load run {}", cli.source.display()))?;

    let workers = match cli.workers {
        Some(workers) => workers,
        None => thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };
    let plan = RunPlan::new(cli.run, workers)
        .max_events(cli.maxevt)
        .progress_every(config.progress_every);

    let run = cli.run;
    let outcome = run_parallel(Arc::new(source), &plan, move || {
        config.build_registry(run, calibration.as_ref())
    })?;

    let mut writer = ParquetDatasetWriter::new(&cli.output, cli.run, cli.maxevt);
    let target = writer.write(&outcome.dataset)?;
    println!(
        "run {}: {} good / {} bad events in {:.2}s -> {}",
        cli.run,
        outcome.good(),
        outcome.bad(),
        outcome.elapsed.as_secs_f64(),
        target.display()
    );
    Ok(())
}
