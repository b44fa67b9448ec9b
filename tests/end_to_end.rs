use std::fs;
use std::sync::Arc;

use acq_extract::calibration::CalibrationTable;
use acq_extract::source::jsonl;
use acq_extract::storage::{read_table, DatasetWriter, ParquetDatasetWriter};
use acq_extract::{run_parallel, ExtractionConfig, RunPlan};
use arrow::array::{Array, Float64Array};
use tempfile::tempdir;

const CONFIG: &str = r#"{
    "version": 1,
    "progress_every": 1,
    "extractors": [
        {"kind": "epics_channels", "channels": ["BEAM:ENERGY"]},
        {"kind": "event_codes"},
        {"kind": "waveform_integral", "name": "acq", "device": "Acqiris", "channel": 0,
         "dead": {"start": "mcp_dead_start", "end": "mcp_dead_end"},
         "signal": {"start": "mcp_int_start", "end": "mcp_int_end"},
         "invert": false}
    ],
    "manifest": [
        {"first_run": 40, "last_run": 45, "disabled": ["EVR"], "note": "timing not cabled"}
    ]
}"#;

const CALIBRATIONS: &str = "\
run_start,run_end,mcp_dead_start,mcp_dead_end,mcp_int_start,mcp_int_end
1,39,0,2,2,4
40,50,0,3,3,6
";

const RUN: &str = r#"# run 42
{"time": 1, "slow": {"BEAM:ENERGY": 778.5}, "event_codes": [40], "waveforms": {"Acqiris": [[1, 1, 1, 6, 6, 7]]}}
{"time": 2, "event_codes": [40], "waveforms": {"Acqiris": [[1, 1, 1, 7, 6, 7]]}}
{"time": 3, "event_codes": [40]}
{"time": 4, "event_codes": [40, 140], "waveforms": {"Acqiris": [[1, 1, 1, 9, 6, 7]]}}
{"time": 5, "event_codes": [40], "waveforms": {"Acqiris": [[1, 1, 1, 10, 6, 7]]}}
{"time": 6, "unreadable": true}
"#;

fn floats(batch: &arrow::record_batch::RecordBatch, name: &str) -> Vec<f64> {
    let array = batch
        .column_by_name(name)
        .expect("column")
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("float column");
    (0..array.len()).map(|i| array.value(i)).collect()
}

#[test]
fn config_calibration_and_run_file_produce_parquet_tables() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("extract.json");
    let cal_path = dir.path().join("abs_run_reference.csv");
    let run_path = dir.path().join("run42.jsonl");
    fs::write(&config_path, CONFIG).expect("write config");
    fs::write(&cal_path, CALIBRATIONS).expect("write calibrations");
    fs::write(&run_path, RUN).expect("write run");

    let config = ExtractionConfig::load(&config_path).expect("config");
    let table = CalibrationTable::load(&cal_path).expect("calibrations");
    table.require(&config.coefficients()).expect("coefficients");
    let calibration = table.for_run(42).expect("run 42 row");
    let source = jsonl::load_run(&run_path).expect("run file");
    assert_eq!(source.len(), 6);

    // 2 workers x min(6 / 2, 4 / 2) events: times 1-2 and 3-4
    let plan = RunPlan::new(42, 2)
        .max_events(Some(4))
        .progress_every(config.progress_every);
    let outcome = run_parallel(Arc::new(source), &plan, move || {
        config.build_registry(42, Some(&calibration))
    })
    .expect("run");
    assert_eq!((outcome.good(), outcome.bad()), (3, 1));
    assert_eq!(outcome.dataset.names(), vec!["Epics", "acq"]);

    let out = dir.path().join("out");
    let target = ParquetDatasetWriter::new(&out, 42, Some(4))
        .write(&outcome.dataset)
        .expect("write dataset");
    assert_eq!(target, out.join("run42first4evts"));

    let mut files: Vec<String> = fs::read_dir(&target)
        .expect("read output")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["Epics.parquet", "acq.parquet"]);

    let epics = read_table(target.join("Epics.parquet")).expect("read Epics");
    assert_eq!(floats(&epics, "BEAM:ENERGY"), vec![778.5; 3]);

    // background = median of samples 0..3, integral over samples 3..6
    let acq = read_table(target.join("acq.parquet")).expect("read acq");
    assert_eq!(floats(&acq, "acq"), vec![16.0, 17.0, 19.0]);
}

#[test]
fn run_outside_the_calibration_table_is_rejected() {
    let table = CalibrationTable::from_reader(CALIBRATIONS.as_bytes()).expect("calibrations");
    assert!(table.for_run(51).is_err());
    assert!(table.for_run(0).is_err());
}
