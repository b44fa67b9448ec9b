//! Per-run capability manifest.
//!
//! Some runs lack hardware that later runs have (the early runs of a beam
//! time had no timing-code readout, for instance). Each entry disables a
//! set of extractors over an inclusive run range.

use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub first_run: u32,
    pub last_run: u32,
    pub disabled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ManifestEntry {
    pub fn covers(&self, run: u32) -> bool {
        self.first_run <= run && run <= self.last_run
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityManifest {
    entries: Vec<ManifestEntry>,
}

impl CapabilityManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Rejects inverted ranges and names no extractor carries.
    pub fn check(&self, known: &[&str]) -> Result<()> {
        for entry in &self.entries {
            if entry.first_run > entry.last_run {
                return Err(Error::Config(format!(
                    "manifest range {}..={} is inverted",
                    entry.first_run, entry.last_run
                )));
            }
            if let Some(unknown) = entry.disabled.iter().find(|name| !known.contains(&name.as_str())) {
                return Err(Error::Config(format!(
                    "manifest disables unknown extractor '{unknown}'"
                )));
            }
        }
        Ok(())
    }

    pub fn covering(&self, run: u32) -> impl Iterator<Item = &ManifestEntry> + '_ {
        self.entries.iter().filter(move |entry| entry.covers(run))
    }

    /// Names disabled for `run` by any covering entry.
    pub fn disabled_for(&self, run: u32) -> BTreeSet<&str> {
        self.covering(run)
            .flat_map(|entry| entry.disabled.iter().map(String::as_str))
            .collect()
    }

    /// Logs what is disabled for `run`. Called once per invocation, not per worker.
    pub fn report(&self, run: u32) {
        for entry in self.covering(run) {
            match &entry.note {
                Some(note) => info!("run {run}: disabling {:?} ({note})", entry.disabled),
                None => info!("run {run}: disabling {:?}", entry.disabled),
            }
        }
    }

    pub fn is_enabled(&self, run: u32, name: &str) -> bool {
        !self
            .entries
            .iter()
            .any(|entry| entry.covers(run) && entry.disabled.iter().any(|d| d == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> CapabilityManifest {
        CapabilityManifest::new(vec![
            ManifestEntry {
                first_run: 1,
                last_run: 20,
                disabled: vec!["EVR".to_string()],
                note: Some("no timing readout".to_string()),
            },
            ManifestEntry {
                first_run: 15,
                last_run: 30,
                disabled: vec!["Andor".to_string()],
                note: None,
            },
        ])
    }

    #[test]
    fn overlapping_entries_accumulate() {
        let manifest = manifest();
        assert_eq!(manifest.disabled_for(10).into_iter().collect::<Vec<_>>(), vec!["EVR"]);
        assert_eq!(
            manifest.disabled_for(16).into_iter().collect::<Vec<_>>(),
            vec!["Andor", "EVR"]
        );
        assert!(manifest.disabled_for(31).is_empty());
        assert_eq!(manifest.covering(16).count(), 2);
        assert_eq!(manifest.covering(21).count(), 1);
        assert!(manifest.is_enabled(21, "EVR"));
        assert!(!manifest.is_enabled(30, "Andor"));
    }

    #[test]
    fn unknown_names_and_inverted_ranges_are_rejected() {
        let manifest = manifest();
        assert!(manifest.check(&["EVR", "Andor", "Epics"]).is_ok());
        assert!(manifest.check(&["EVR"]).is_err());

        let inverted = CapabilityManifest::new(vec![ManifestEntry {
            first_run: 9,
            last_run: 3,
            disabled: vec![],
            note: None,
        }]);
        assert!(inverted.check(&[]).is_err());
    }

    #[test]
    fn parses_from_json_list() {
        let manifest: CapabilityManifest = serde_json::from_str(
            r#"[{"first_run": 1, "last_run": 5, "disabled": ["EVR"]}]"#,
        )
        .unwrap();
        assert_eq!(manifest.entries().len(), 1);
        assert_eq!(manifest.entries()[0].note, None);
    }
}
