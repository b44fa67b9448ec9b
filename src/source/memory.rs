use std::collections::{BTreeMap, HashMap};

use anyhow::Result as AnyResult;
use serde::Deserialize;

use super::{DetectorData, EventHandle, EventSource, EventTime, ImageView, SlowControlStore};
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectorRecord {
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    accessors: BTreeMap<String, Value>,
}

impl DetectorRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_accessor(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.accessors.insert(name.into(), value.into());
        self
    }
}

impl DetectorData for DetectorRecord {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }

    fn accessor(&self, name: &str) -> Option<Value> {
        self.accessors.get(name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Image {
    pub fn two_d(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        Self {
            shape: vec![rows, cols],
            data,
        }
    }

    pub fn one_d(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemoryEvent {
    #[serde(default)]
    detectors: BTreeMap<String, DetectorRecord>,
    #[serde(default)]
    waveforms: BTreeMap<String, Vec<Vec<f64>>>,
    #[serde(default)]
    images: BTreeMap<String, Image>,
    #[serde(default)]
    event_codes: Option<Vec<u16>>,
}

impl MemoryEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(mut self, source: impl Into<String>, record: DetectorRecord) -> Self {
        self.detectors.insert(source.into(), record);
        self
    }

    /// Sets one channel of `device`, padding lower channels with empty traces.
    pub fn with_waveform(mut self, device: impl Into<String>, channel: usize, samples: Vec<f64>) -> Self {
        let channels = self.waveforms.entry(device.into()).or_default();
        if channels.len() <= channel {
            channels.resize(channel + 1, Vec::new());
        }
        channels[channel] = samples;
        self
    }

    pub fn with_image(mut self, alias: impl Into<String>, image: Image) -> Self {
        self.images.insert(alias.into(), image);
        self
    }

    pub fn with_event_codes(mut self, codes: Vec<u16>) -> Self {
        self.event_codes = Some(codes);
        self
    }

    pub fn image_aliases(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }
}

impl EventHandle for MemoryEvent {
    fn detector(&self, source: &str) -> Option<&dyn DetectorData> {
        self.detectors
            .get(source)
            .map(|record| record as &dyn DetectorData)
    }

    fn waveform(&self, device: &str, channel: usize) -> Option<&[f64]> {
        let samples = self.waveforms.get(device)?.get(channel)?;
        (!samples.is_empty()).then_some(samples.as_slice())
    }

    fn image(&self, alias: &str) -> Option<ImageView<'_>> {
        self.images.get(alias).map(|image| ImageView {
            shape: &image.shape,
            data: &image.data,
        })
    }

    fn event_codes(&self) -> Option<&[u16]> {
        self.event_codes.as_deref()
    }
}

/// Time-ordered updates per channel; a value holds until the next update.
#[derive(Debug, Clone, Default)]
pub struct SlowControlLog {
    channels: HashMap<String, Vec<(EventTime, Value)>>,
}

impl SlowControlLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, channel: impl Into<String>, at: EventTime, value: impl Into<Value>) {
        let updates = self.channels.entry(channel.into()).or_default();
        let idx = updates.partition_point(|(time, _)| *time <= at);
        updates.insert(idx, (at, value.into()));
    }
}

impl SlowControlStore for SlowControlLog {
    fn value(&self, channel: &str, at: EventTime) -> Option<Value> {
        let updates = self.channels.get(channel)?;
        let idx = updates.partition_point(|(time, _)| *time <= at);
        idx.checked_sub(1).map(|i| updates[i].1.clone())
    }
}

/// A fully loaded run held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRun {
    times: Vec<EventTime>,
    events: HashMap<EventTime, MemoryEvent>,
    slow: SlowControlLog,
}

impl MemoryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event, replacing any earlier event at the same time.
    pub fn push(&mut self, time: EventTime, event: MemoryEvent) {
        if self.events.insert(time, event).is_none() {
            let idx = self.times.partition_point(|t| *t < time);
            self.times.insert(idx, time);
        }
    }

    /// Records a time slot the backend knows about but cannot decode.
    pub fn push_unreadable(&mut self, time: EventTime) {
        if self.events.remove(&time).is_some() {
            return;
        }
        if let Err(idx) = self.times.binary_search(&time) {
            self.times.insert(idx, time);
        }
    }

    pub fn slow_update(&mut self, channel: impl Into<String>, at: EventTime, value: impl Into<Value>) {
        self.slow.update(channel, at, value);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl EventSource for MemoryRun {
    fn times(&self) -> &[EventTime] {
        &self.times
    }

    fn event_at(&self, time: EventTime) -> AnyResult<Option<Box<dyn EventHandle + '_>>> {
        Ok(self
            .events
            .get(&time)
            .map(|event| Box::new(event) as Box<dyn EventHandle + '_>))
    }

    fn slow_control(&self) -> &dyn SlowControlStore {
        &self.slow
    }
}
