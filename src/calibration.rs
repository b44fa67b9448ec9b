//! Run-range calibration table.
//!
//! A CSV file with a header row whose first two required columns are
//! `run_start` and `run_end`. Each data row holds numeric coefficients that
//! apply to every run in the inclusive range.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::{Error, Result};

pub const RUN_START: &str = "run_start";
pub const RUN_END: &str = "run_end";

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl CalibrationTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            Error::Calibration(format!("open {}: {err}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let row = record
                .iter()
                .zip(&columns)
                .map(|(cell, column)| {
                    cell.parse::<f64>().map_err(|_| {
                        Error::Calibration(format!(
                            "row {}: column '{column}' is not numeric: '{cell}'",
                            line + 1
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        let table = Self { columns, rows };
        table.require(&[RUN_START, RUN_END])?;
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fails unless every named coefficient is a column of the table.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !self.columns.iter().any(|c| c == name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Calibration(format!(
                "missing calibration coefficients: {}",
                missing.join(", ")
            )))
        }
    }

    /// The single row whose `[run_start, run_end]` range contains `run`.
    pub fn for_run(&self, run: u32) -> Result<RunCalibration> {
        let start = self.column_index(RUN_START)?;
        let end = self.column_index(RUN_END)?;
        let run_f = f64::from(run);

        let mut matching = self
            .rows
            .iter()
            .filter(|row| row[start] <= run_f && run_f <= row[end]);
        let row = matching
            .next()
            .ok_or_else(|| Error::Calibration(format!("no calibration row covers run {run}")))?;
        if matching.next().is_some() {
            return Err(Error::Calibration(format!(
                "several calibration rows cover run {run}"
            )));
        }

        Ok(RunCalibration {
            run,
            values: self.columns.iter().cloned().zip(row.iter().copied()).collect(),
        })
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Calibration(format!("missing calibration column '{name}'")))
    }
}

/// Coefficients in effect for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunCalibration {
    run: u32,
    values: BTreeMap<String, f64>,
}

impl RunCalibration {
    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// A coefficient used as a sample or pixel index.
    pub fn index(&self, name: &str) -> Result<usize> {
        let value = self.get(name).ok_or_else(|| {
            Error::Calibration(format!("run {} has no coefficient '{name}'", self.run))
        })?;
        if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
            return Err(Error::Calibration(format!(
                "coefficient '{name}' = {value} is not a valid index"
            )));
        }
        Ok(value as usize)
    }
}
