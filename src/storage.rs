//! Parquet output for aggregated datasets.
//!
//! A run is written as one directory holding a `{extractor}.parquet` file
//! per table. Files are written into a `.partial` sibling first and the
//! directory is renamed into place only once every table is on disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::dataset::Dataset;
use crate::error::{Error, Result};

pub trait DatasetWriter {
    /// Persists the dataset and returns where it landed.
    fn write(&mut self, dataset: &Dataset) -> Result<PathBuf>;
}

/// `run{N}allevts` or `run{N}first{max}evts`.
pub fn output_stem(run: u32, max_events: Option<usize>) -> String {
    match max_events {
        Some(max) => format!("run{run}first{max}evts"),
        None => format!("run{run}allevts"),
    }
}

pub struct ParquetDatasetWriter {
    root: PathBuf,
    stem: String,
    props: Option<WriterProperties>,
}

impl ParquetDatasetWriter {
    pub fn new(root: impl Into<PathBuf>, run: u32, max_events: Option<usize>) -> Self {
        Self {
            root: root.into(),
            stem: output_stem(run, max_events),
            props: Some(
                WriterProperties::builder()
                    .set_compression(Compression::SNAPPY)
                    .build(),
            ),
        }
    }

    pub fn with_properties(mut self, props: WriterProperties) -> Self {
        self.props = Some(props);
        self
    }

    pub fn target(&self) -> PathBuf {
        self.root.join(&self.stem)
    }

    fn partial(&self) -> PathBuf {
        self.root.join(format!("{}.partial", self.stem))
    }

    fn write_tables(&self, dir: &Path, dataset: &Dataset) -> Result<()> {
        for (name, batch) in dataset.iter() {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(Error::Config(format!(
                    "extractor name '{name}' cannot be used as a file name"
                )));
            }
            if batch.num_columns() == 0 {
                warn!("skipping '{name}': no columns ({} rows)", batch.num_rows());
                continue;
            }
            let file = File::create(dir.join(format!("{name}.parquet")))?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), self.props.clone())?;
            writer.write(batch)?;
            writer.close()?;
            info!("wrote {name}: {} rows x {} columns", batch.num_rows(), batch.num_columns());
        }
        Ok(())
    }
}

impl DatasetWriter for ParquetDatasetWriter {
    fn write(&mut self, dataset: &Dataset) -> Result<PathBuf> {
        let target = self.target();
        let partial = self.partial();
        if partial.exists() {
            fs::remove_dir_all(&partial)?;
        }
        fs::create_dir_all(&partial)?;

        if let Err(err) = self.write_tables(&partial, dataset) {
            let _ = fs::remove_dir_all(&partial);
            return Err(err);
        }

        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&partial, &target)?;
        info!("dataset written to {}", target.display());
        Ok(target)
    }
}

/// Reads a table written by [`ParquetDatasetWriter`] back into one batch.
pub fn read_table(path: impl AsRef<Path>) -> Result<RecordBatch> {
    let file = File::open(path.as_ref())?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = Arc::clone(builder.schema());
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RecordLayout;
    use crate::value::Value;
    use tempfile::tempdir;

    fn dataset() -> Dataset {
        let layout = RecordLayout::float64(&["acq".to_string()]);
        let rows = vec![vec![Value::F64(1.5)], vec![Value::F64(-2.0)]];
        let mut dataset = Dataset::new();
        dataset.push("acq", crate::columns::materialize("acq", &layout, &rows).unwrap());
        dataset.push(
            "EVR",
            crate::columns::boolean_columns(&[], 0, |_, _| false).unwrap(),
        );
        dataset
    }

    #[test]
    fn stem_follows_event_cap() {
        assert_eq!(output_stem(12, None), "run12allevts");
        assert_eq!(output_stem(12, Some(500)), "run12first500evts");
    }

    #[test]
    fn writes_tables_and_skips_columnless_ones() {
        let dir = tempdir().expect("tempdir");
        let mut writer = ParquetDatasetWriter::new(dir.path(), 3, Some(10));
        let target = writer.write(&dataset()).expect("write");

        assert_eq!(target, dir.path().join("run3first10evts"));
        assert!(!dir.path().join("run3first10evts.partial").exists());
        assert!(!target.join("EVR.parquet").exists());

        let batch = read_table(target.join("acq.parquet")).expect("read");
        let expected = dataset();
        let expected = expected.get("acq").unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "acq");
        assert_eq!(batch.column(0).as_ref(), expected.column(0).as_ref());
    }

    #[test]
    fn rewrite_replaces_previous_output() {
        let dir = tempdir().expect("tempdir");
        let mut writer = ParquetDatasetWriter::new(dir.path(), 3, None);
        writer.write(&dataset()).expect("first write");
        let target = writer.write(&dataset()).expect("second write");
        assert_eq!(fs::read_dir(&target).unwrap().count(), 1);
    }

    #[test]
    fn unsafe_table_name_leaves_nothing_behind() {
        let dir = tempdir().expect("tempdir");
        let mut dataset = dataset();
        let acq = dataset.get("acq").unwrap().clone();
        dataset.push("../escape", acq);
        let mut writer = ParquetDatasetWriter::new(dir.path(), 4, None);
        assert!(writer.write(&dataset).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
