use arrow::record_batch::RecordBatch;

/// The aggregated output of one run: a table per extractor, in
/// registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    tables: Vec<(String, RecordBatch)>,
}

impl Dataset {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, batch: RecordBatch) {
        self.tables.push((name.into(), batch));
    }

    pub fn get(&self, name: &str) -> Option<&RecordBatch> {
        self.tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, batch)| batch)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordBatch)> {
        self.tables.iter().map(|(name, batch)| (name.as_str(), batch))
    }

    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.get(name).map(RecordBatch::num_rows)
    }
}
