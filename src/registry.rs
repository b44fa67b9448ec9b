use std::fmt;

use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::source::EventContext;

/// The extractors configured for one run, in registration order.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extractors.iter().map(|e| e.name()))
            .finish()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) -> Result<()> {
        if self.extractors.iter().any(|e| e.name() == extractor.name()) {
            return Err(Error::Config(format!(
                "duplicate extractor name '{}'",
                extractor.name()
            )));
        }
        self.extractors.push(extractor);
        Ok(())
    }

    pub fn with(mut self, extractor: impl Extractor + 'static) -> Result<Self> {
        self.register(Box::new(extractor))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Extractor + 'static)> + '_ {
        self.extractors.iter().map(|e| e.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Extractor>> + '_ {
        self.extractors.iter_mut()
    }

    /// True only if every extractor accepts the event.
    ///
    /// All extractors are asked even after a rejection so each keeps an
    /// accurate miss count.
    pub fn validate_all(&mut self, ctx: &EventContext<'_>) -> bool {
        let mut good = true;
        for extractor in &mut self.extractors {
            good &= extractor.validate(ctx);
        }
        good
    }

    pub fn record_all(&mut self, ctx: &EventContext<'_>) -> Result<()> {
        for extractor in &mut self.extractors {
            extractor.record(ctx)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for extractor in &mut self.extractors {
            extractor.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{EpicsChannelExtractor, EventCodeExtractor};
    use crate::source::{EventTime, MemoryEvent, SlowControlLog};

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = ExtractorRegistry::new();
        registry
            .register(Box::new(EventCodeExtractor::new("EVR")))
            .unwrap();
        let err = registry
            .register(Box::new(EventCodeExtractor::new("EVR")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn debug_lists_registered_names() {
        let registry = ExtractorRegistry::new()
            .with(EventCodeExtractor::new("EVR"))
            .unwrap();
        assert_eq!(format!("{registry:?}"), r#"["EVR"]"#);
    }

    #[test]
    fn validation_does_not_short_circuit() {
        let mut registry = ExtractorRegistry::new()
            .with(EpicsChannelExtractor::new("Epics", vec!["PV".to_string()]).unwrap())
            .unwrap()
            .with(EventCodeExtractor::new("EVR"))
            .unwrap();

        let slow = SlowControlLog::new();
        let event = MemoryEvent::new().with_event_codes(vec![40]);
        let ctx = EventContext::new(EventTime(0), &event, &slow);

        assert!(!registry.validate_all(&ctx));
        let evr = registry.get("EVR").unwrap().stats();
        assert_eq!(evr.good, 1);
        let epics = registry.get("Epics").unwrap().stats();
        assert_eq!(epics.bad, 1);
    }
}
