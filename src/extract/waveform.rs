use arrow::record_batch::RecordBatch;

use super::{Extractor, ExtractorBuffer, ExtractorStats, IndexWindow, RowAccumulator};
use crate::error::{Error, Result};
use crate::layout::{FieldSpec, FieldType, RecordLayout};
use crate::source::EventContext;
use crate::value::{Row, Value};

pub const COLUMN: &str = "acq";

/// Background-subtracted integral of one digitizer channel.
///
/// The background is the median of the dead window; the signal window is
/// summed after subtracting it, and negated when `invert` is set (negative
/// going detector pulses).
#[derive(Debug)]
pub struct WaveformIntegralExtractor {
    device: String,
    channel: usize,
    dead: IndexWindow,
    signal: IndexWindow,
    invert: bool,
    acc: RowAccumulator,
}

impl WaveformIntegralExtractor {
    pub fn new(
        name: impl Into<String>,
        device: impl Into<String>,
        channel: usize,
        dead: IndexWindow,
        signal: IndexWindow,
        invert: bool,
    ) -> Result<Self> {
        let name = name.into();
        if dead.is_empty() {
            return Err(Error::Config(format!(
                "waveform extractor '{name}' has an empty dead window"
            )));
        }
        let layout = RecordLayout::new(vec![FieldSpec::new(COLUMN, FieldType::Float64)]);
        Ok(Self {
            device: device.into(),
            channel,
            dead,
            signal,
            invert,
            acc: RowAccumulator::fixed(name, layout)?,
        })
    }

    fn capture(&self, ctx: &EventContext<'_>) -> Option<Row> {
        let samples = ctx.event.waveform(&self.device, self.channel)?;
        let value = integrate(samples, self.dead, self.signal, self.invert)?;
        Some(vec![Value::F64(value)])
    }
}

/// `None` when either window does not fit inside `samples`.
pub fn integrate(samples: &[f64], dead: IndexWindow, signal: IndexWindow, invert: bool) -> Option<f64> {
    let dead = dead.within(samples.len()).filter(|range| !range.is_empty())?;
    let signal = signal.within(samples.len())?;
    let mut background = samples[dead].to_vec();
    let background = median(&mut background);
    let integral: f64 = samples[signal]
        .iter()
        .map(|sample| sample - background)
        .sum();
    Some(if invert { -integral } else { integral })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

impl Extractor for WaveformIntegralExtractor {
    fn name(&self) -> &str {
        self.acc.name()
    }

    fn validate(&mut self, ctx: &EventContext<'_>) -> bool {
        let captured = self.capture(ctx);
        self.acc.validate(captured)
    }

    fn record(&mut self, _ctx: &EventContext<'_>) -> Result<()> {
        self.acc.record()
    }

    fn stats(&self) -> ExtractorStats {
        self.acc.stats()
    }

    fn reset(&mut self) {
        self.acc.reset();
    }

    fn take_buffer(&mut self) -> ExtractorBuffer {
        self.acc.take_buffer()
    }

    fn merge(&mut self, buffers: Vec<ExtractorBuffer>) -> Result<()> {
        self.acc.merge(buffers)
    }

    fn materialize(&self) -> Result<RecordBatch> {
        self.acc.materialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EventTime, MemoryEvent, SlowControlLog};
    use arrow::array::{Array, Float64Array};

    fn window(start: usize, end: usize) -> IndexWindow {
        IndexWindow::new(start, end).unwrap()
    }

    /// Flat background `b` with a pulse of total area `area` spread over 4 samples.
    fn trace(b: f64, area: f64) -> Vec<f64> {
        let mut samples = vec![b; 40];
        for sample in &mut samples[20..24] {
            *sample += area / 4.0;
        }
        samples
    }

    #[test]
    fn integral_is_independent_of_background() {
        for background in [0.0, 3.5, -120.0] {
            let samples = trace(background, 10.0);
            let plain = integrate(&samples, window(0, 10), window(15, 30), false).unwrap();
            let inverted = integrate(&samples, window(0, 10), window(15, 30), true).unwrap();
            assert!((plain - 10.0).abs() < 1e-9, "background {background}: {plain}");
            assert!((inverted + 10.0).abs() < 1e-9, "background {background}: {inverted}");
        }
    }

    #[test]
    fn median_rejects_spikes_in_dead_window() {
        let mut samples = trace(2.0, 8.0);
        samples[3] = 1_000.0;
        let value = integrate(&samples, window(0, 10), window(20, 24), false).unwrap();
        assert!((value - 8.0).abs() < 1e-9);
    }

    #[test]
    fn even_length_median_averages_middle_samples() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut values), 2.5);
    }

    #[test]
    fn short_or_missing_waveform_fails_validation() {
        let slow = SlowControlLog::new();
        let mut ext =
            WaveformIntegralExtractor::new("Acqiris2", "Acqiris2", 0, window(0, 10), window(15, 30), true)
                .unwrap();

        let missing = MemoryEvent::new();
        assert!(!ext.validate(&EventContext::new(EventTime(0), &missing, &slow)));

        let short = MemoryEvent::new().with_waveform("Acqiris2", 0, vec![0.0; 20]);
        assert!(!ext.validate(&EventContext::new(EventTime(1), &short, &slow)));

        let good = MemoryEvent::new().with_waveform("Acqiris2", 0, trace(1.0, 6.0));
        let ctx = EventContext::new(EventTime(2), &good, &slow);
        assert!(ext.validate(&ctx));
        ext.record(&ctx).unwrap();

        let batch = ext.materialize().unwrap();
        let acq = batch
            .column_by_name(COLUMN)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!((acq.value(0) + 6.0).abs() < 1e-9);
    }

    #[test]
    fn windows_past_the_trace_end_do_not_integrate() {
        let samples = vec![1.0; 10];
        assert_eq!(integrate(&samples, window(0, 2), window(8, 11), false), None);
        assert_eq!(integrate(&samples, window(0, 11), window(4, 8), false), None);
        assert_eq!(integrate(&samples, window(0, 2), window(10, 10), false), Some(0.0));
    }

    #[test]
    fn empty_dead_window_is_a_config_error() {
        let err = WaveformIntegralExtractor::new("mcp", "Acqiris2", 0, window(5, 5), window(6, 9), true)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
