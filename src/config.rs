use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::calibration::RunCalibration;
use crate::error::{Error, Result};
use crate::event_loop::DEFAULT_PROGRESS_EVERY;
use crate::extract::{
    epics, event_code, roi, EpicsChannelExtractor, EventCodeExtractor, Extractor, FieldRef,
    ImageRoiExtractor, IndexWindow, Roi, RoiStat, ScalarFieldExtractor,
    WaveformIntegralExtractor,
};
use crate::manifest::CapabilityManifest;
use crate::registry::ExtractorRegistry;

pub const CONFIG_VERSION: u32 = 1;

/// Extraction settings for one invocation, read from JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    pub version: u32,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
    pub extractors: Vec<ExtractorSpec>,
    #[serde(default)]
    pub manifest: CapabilityManifest,
}

fn default_progress_every() -> u64 {
    DEFAULT_PROGRESS_EVERY
}

fn default_true() -> bool {
    true
}

fn default_epics_name() -> String {
    epics::DEFAULT_NAME.to_string()
}

fn default_event_code_name() -> String {
    event_code::DEFAULT_NAME.to_string()
}

fn default_roi_name() -> String {
    roi::DEFAULT_NAME.to_string()
}

impl ExtractionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(Error::Config(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        let mut seen = BTreeSet::new();
        for spec in &self.extractors {
            if !seen.insert(spec.name()) {
                return Err(Error::Config(format!(
                    "duplicate extractor name '{}'",
                    spec.name()
                )));
            }
            let mut fields = BTreeSet::new();
            if let Some(dup) = spec.field_names().into_iter().find(|f| !fields.insert(*f)) {
                return Err(Error::Config(format!(
                    "extractor '{}' declares field '{dup}' more than once",
                    spec.name()
                )));
            }
        }
        let names: Vec<&str> = self.extractors.iter().map(ExtractorSpec::name).collect();
        self.manifest.check(&names)
    }

    /// Calibration coefficients referenced by any extractor bound.
    pub fn coefficients(&self) -> Vec<&str> {
        let mut names = BTreeSet::new();
        for spec in &self.extractors {
            for bound in spec.bounds() {
                if let Bound::Coefficient(name) = bound {
                    names.insert(name.as_str());
                }
            }
        }
        names.into_iter().collect()
    }

    pub fn enabled(&self, run: u32) -> impl Iterator<Item = &ExtractorSpec> + '_ {
        let disabled = self.manifest.disabled_for(run);
        self.extractors
            .iter()
            .filter(move |spec| !disabled.contains(spec.name()))
    }

    /// A fresh registry of the extractors enabled for `run`.
    pub fn build_registry(
        &self,
        run: u32,
        calibration: Option<&RunCalibration>,
    ) -> Result<ExtractorRegistry> {
        let mut registry = ExtractorRegistry::new();
        for spec in self.enabled(run) {
            registry.register(spec.build(calibration)?)?;
        }
        Ok(registry)
    }
}

/// A sample or pixel index, given literally or as a calibration coefficient.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Index(usize),
    Coefficient(String),
}

impl Bound {
    pub fn resolve(&self, calibration: Option<&RunCalibration>) -> Result<usize> {
        match self {
            Bound::Index(index) => Ok(*index),
            Bound::Coefficient(name) => calibration
                .ok_or_else(|| {
                    Error::Config(format!(
                        "bound '{name}' needs a calibration table"
                    ))
                })?
                .index(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowSpec {
    pub start: Bound,
    pub end: Bound,
}

impl WindowSpec {
    pub fn resolve(&self, calibration: Option<&RunCalibration>) -> Result<IndexWindow> {
        IndexWindow::new(self.start.resolve(calibration)?, self.end.resolve(calibration)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoiSpec {
    pub name: String,
    pub y: WindowSpec,
    pub x: WindowSpec,
    #[serde(default)]
    pub stat: RoiStat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    ScalarField {
        name: String,
        source: String,
        fields: Vec<FieldRef>,
    },
    EpicsChannels {
        #[serde(default = "default_epics_name")]
        name: String,
        channels: Vec<String>,
    },
    WaveformIntegral {
        name: String,
        device: String,
        channel: usize,
        dead: WindowSpec,
        signal: WindowSpec,
        #[serde(default = "default_true")]
        invert: bool,
    },
    EventCodes {
        #[serde(default = "default_event_code_name")]
        name: String,
    },
    ImageRoi {
        #[serde(default = "default_roi_name")]
        name: String,
        alias: String,
        rois: Vec<RoiSpec>,
    },
}

impl ExtractorSpec {
    pub fn name(&self) -> &str {
        match self {
            ExtractorSpec::ScalarField { name, .. }
            | ExtractorSpec::EpicsChannels { name, .. }
            | ExtractorSpec::WaveformIntegral { name, .. }
            | ExtractorSpec::EventCodes { name }
            | ExtractorSpec::ImageRoi { name, .. } => name,
        }
    }

    /// Column names known before any event is read.
    fn field_names(&self) -> Vec<&str> {
        match self {
            ExtractorSpec::ScalarField { fields, .. } => {
                fields.iter().map(|f| f.name.as_str()).collect()
            }
            ExtractorSpec::EpicsChannels { channels, .. } => {
                channels.iter().map(String::as_str).collect()
            }
            ExtractorSpec::ImageRoi { rois, .. } => rois.iter().map(|r| r.name.as_str()).collect(),
            ExtractorSpec::WaveformIntegral { .. } | ExtractorSpec::EventCodes { .. } => Vec::new(),
        }
    }

    fn bounds(&self) -> Vec<&Bound> {
        match self {
            ExtractorSpec::WaveformIntegral { dead, signal, .. } => {
                vec![&dead.start, &dead.end, &signal.start, &signal.end]
            }
            ExtractorSpec::ImageRoi { rois, .. } => rois
                .iter()
                .flat_map(|roi| [&roi.y.start, &roi.y.end, &roi.x.start, &roi.x.end])
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn build(&self, calibration: Option<&RunCalibration>) -> Result<Box<dyn Extractor>> {
        let extractor: Box<dyn Extractor> = match self {
            ExtractorSpec::ScalarField {
                name,
                source,
                fields,
            } => Box::new(ScalarFieldExtractor::new(
                name.clone(),
                source.clone(),
                fields.clone(),
            )?),
            ExtractorSpec::EpicsChannels { name, channels } => {
                Box::new(EpicsChannelExtractor::new(name.clone(), channels.clone())?)
            }
            ExtractorSpec::WaveformIntegral {
                name,
                device,
                channel,
                dead,
                signal,
                invert,
            } => Box::new(WaveformIntegralExtractor::new(
                name.clone(),
                device.clone(),
                *channel,
                dead.resolve(calibration)?,
                signal.resolve(calibration)?,
                *invert,
            )?),
            ExtractorSpec::EventCodes { name } => Box::new(EventCodeExtractor::new(name.clone())),
            ExtractorSpec::ImageRoi { name, alias, rois } => {
                let rois = rois
                    .iter()
                    .map(|spec| -> Result<Roi> {
                        Ok(Roi {
                            name: spec.name.clone(),
                            rows: spec.y.resolve(calibration)?,
                            cols: spec.x.resolve(calibration)?,
                            stat: spec.stat,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Box::new(ImageRoiExtractor::new(name.clone(), alias.clone(), rois)?)
            }
        };
        Ok(extractor)
    }
}
