//! JSON-lines run files.
//!
//! One event per line:
//! `{"time": 1, "detectors": {..}, "waveforms": {..}, "images": {..}, "event_codes": [..], "slow": {..}}`.
//! Entries under `slow` are slow-control updates that hold from `time` on.
//! A line with `"unreadable": true` marks a time slot with no decodable event.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{EventTime, MemoryEvent, MemoryRun};
use crate::value::Value;

#[derive(Debug, Deserialize)]
struct EventLine {
    time: EventTime,
    #[serde(default)]
    unreadable: bool,
    #[serde(default)]
    slow: BTreeMap<String, Value>,
    #[serde(flatten)]
    event: MemoryEvent,
}

pub fn load_run(path: impl AsRef<Path>) -> Result<MemoryRun> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open run file {}", path.display()))?;
    read_run(BufReader::new(file)).with_context(|| format!("parse run file {}", path.display()))
}

pub fn read_run(reader: impl BufRead) -> Result<MemoryRun> {
    let mut run = MemoryRun::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed: EventLine =
            serde_json::from_str(trimmed).with_context(|| format!("line {}", idx + 1))?;

        for (channel, value) in parsed.slow {
            run.slow_update(channel, parsed.time, value);
        }
        if parsed.unreadable {
            run.push_unreadable(parsed.time);
            continue;
        }
        if let Some(alias) = inconsistent_image(&parsed.event) {
            bail!("line {}: image '{alias}' shape does not match its data", idx + 1);
        }
        run.push(parsed.time, parsed.event);
    }
    Ok(run)
}

fn inconsistent_image(event: &MemoryEvent) -> Option<String> {
    use super::EventHandle;

    event.image_aliases().find_map(|alias| {
        let view = event.image(alias)?;
        let expected: usize = view.shape.iter().product();
        (expected != view.data.len()).then(|| alias.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EventSource;

    const RUN: &str = r#"
# run 42
{"time": 2, "detectors": {"ebeam": {"attributes": {"ebeamCharge": 0.25}}}, "event_codes": [40, 140]}
{"time": 1, "slow": {"SXR:MON:MMS:06.RBV": 778.5}, "waveforms": {"Acqiris2": [[1.0, 2.0, 3.0]]}}
{"time": 3, "unreadable": true}
{"time": 4, "images": {"andor": {"shape": [2, 2], "data": [1, 2, 3, 4]}}}
"#;

    #[test]
    fn parses_events_and_slow_updates() {
        let run = read_run(RUN.as_bytes()).expect("parse");
        assert_eq!(
            run.times(),
            &[EventTime(1), EventTime(2), EventTime(3), EventTime(4)]
        );

        let second = run.event_at(EventTime(2)).unwrap().expect("event 2");
        let ebeam = second.detector("ebeam").expect("ebeam");
        assert_eq!(ebeam.attribute("ebeamCharge"), Some(Value::F64(0.25)));
        assert_eq!(second.event_codes(), Some(&[40u16, 140][..]));

        assert!(run.event_at(EventTime(3)).unwrap().is_none());

        let slow = run.slow_control();
        assert_eq!(
            slow.value("SXR:MON:MMS:06.RBV", EventTime(4)),
            Some(Value::F64(778.5))
        );
    }

    #[test]
    fn rejects_inconsistent_images() {
        let line = r#"{"time": 1, "images": {"andor": {"shape": [3, 3], "data": [1, 2]}}}"#;
        let err = read_run(line.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("andor"));
    }
}
