use std::{fmt, sync::Arc};

use hagrid_error::TopicError;

use super::TopicPattern;
use crate::serdes::Serdes;

/// Свойства топика.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicProperties {
    dedicated_worker: bool,
}

/// Зарегистрированный топик: шаблон, привязка сериализации и свойства.
#[derive(Clone)]
pub struct Topic {
    pattern: TopicPattern,
    serdes: Arc<dyn Serdes>,
    properties: TopicProperties,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TopicProperties {
    /// Топик, которому нужен собственный потребитель.
    pub fn dedicated() -> Self {
        Self {
            dedicated_worker: true,
        }
    }

    pub fn with_dedicated_worker(
        mut self,
        dedicated: bool,
    ) -> Self {
        self.dedicated_worker = dedicated;
        self
    }

    pub fn dedicated_worker(&self) -> bool {
        self.dedicated_worker
    }
}

impl Topic {
    pub fn new(
        pattern: &str,
        serdes: Arc<dyn Serdes>,
        properties: TopicProperties,
    ) -> Result<Self, TopicError> {
        Ok(Self {
            pattern: TopicPattern::parse(pattern)?,
            serdes,
            properties,
        })
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    pub fn name(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn serdes(&self) -> &Arc<dyn Serdes> {
        &self.serdes
    }

    pub fn properties(&self) -> TopicProperties {
        self.properties
    }
}

impl fmt::Debug for Topic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Topic")
            .field("pattern", &self.pattern.as_str())
            .field("type_tag", &self.serdes.type_tag())
            .field("properties", &self.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serdes::StringSerdes;

    #[test]
    fn test_topic_new() {
        let topic = Topic::new(
            "events-*",
            Arc::new(StringSerdes),
            TopicProperties::dedicated(),
        )
        .unwrap();

        assert_eq!(topic.name(), "events-*");
        assert!(topic.properties().dedicated_worker());
        assert_eq!(topic.serdes().type_tag(), "string");
    }

    #[test]
    fn test_topic_rejects_bad_pattern() {
        assert!(Topic::new("Events", Arc::new(StringSerdes), TopicProperties::default()).is_err());
    }

    #[test]
    fn test_properties_default_shared() {
        let props = TopicProperties::default();
        assert!(!props.dedicated_worker());
        assert!(props.with_dedicated_worker(true).dedicated_worker());
    }
}
