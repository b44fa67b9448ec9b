//! Collective merge of every worker's extractor state onto root.

use crate::comm::Communicator;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::registry::ExtractorRegistry;

pub struct Aggregator<'c, C: Communicator> {
    comm: &'c C,
}

impl<'c, C: Communicator> Aggregator<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }

    /// Gathers, merges and materializes every registered extractor.
    ///
    /// Every rank must call this with an identically configured registry.
    /// Root returns the dataset; other ranks return `None` once their
    /// buffers are handed over.
    pub fn gather(&self, registry: &mut ExtractorRegistry) -> Result<Option<Dataset>> {
        self.check_registries(registry)?;

        for extractor in registry.iter_mut() {
            let name = extractor.name().to_string();
            let payload = (name.clone(), extractor.take_buffer());
            let gathered = self.comm.gather(payload).map_err(|err| match err {
                Error::GatherMismatch { rank, detail, .. } => Error::GatherMismatch {
                    extractor: name.clone(),
                    rank,
                    detail,
                },
                other => other,
            })?;
            let Some(gathered) = gathered else {
                continue;
            };
            let mut buffers = Vec::with_capacity(gathered.len());
            for (rank, (sent, buffer)) in gathered.into_iter().enumerate() {
                if sent != name {
                    return Err(Error::GatherMismatch {
                        extractor: name,
                        rank,
                        detail: format!("rank sent buffers for '{sent}'"),
                    });
                }
                buffers.push(buffer);
            }
            extractor.merge(buffers)?;
        }

        if !self.comm.is_root() {
            return Ok(None);
        }
        let mut dataset = Dataset::new();
        for extractor in registry.iter() {
            dataset.push(extractor.name(), extractor.materialize()?);
        }
        Ok(Some(dataset))
    }

    fn check_registries(&self, registry: &ExtractorRegistry) -> Result<()> {
        let names = registry.names();
        let Some(all) = self.comm.gather(names.clone())? else {
            return Ok(());
        };
        for (rank, theirs) in all.iter().enumerate() {
            if *theirs == names {
                continue;
            }
            let extractor = names
                .iter()
                .zip(theirs)
                .find(|(ours, other)| ours != other)
                .map(|(ours, _)| ours.clone())
                .or_else(|| names.get(theirs.len()).cloned())
                .or_else(|| theirs.get(names.len()).cloned())
                .unwrap_or_default();
            return Err(Error::GatherMismatch {
                extractor,
                rank,
                detail: format!("rank registered {theirs:?}, root registered {names:?}"),
            });
        }
        Ok(())
    }
}
