use std::sync::Arc;

use dashmap::DashMap;
use hagrid_error::TopicError;

use super::{prefix_of, Topic, TopicGroup};

/// Реестр топиков, сгруппированных по первому сегменту.
///
/// Безопасен для одновременной регистрации, удаления и поиска.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    groups: DashMap<String, TopicGroup>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет или заменяет топик, создавая группу при необходимости.
    pub fn insert(
        &self,
        topic: impl Into<Arc<Topic>>,
    ) -> (Arc<Topic>, Option<Arc<Topic>>) {
        let topic = topic.into();
        let prefix = topic.pattern().prefix().to_string();
        let previous = self
            .groups
            .entry(prefix.clone())
            .or_insert_with(|| TopicGroup::new(prefix))
            .insert(Arc::clone(&topic));

        tracing::debug!(topic = topic.name(), replaced = previous.is_some(), "Topic registered");
        (topic, previous)
    }

    /// Удаляет топик по точному шаблону. Пустая группа удаляется.
    pub fn remove(
        &self,
        pattern: &str,
    ) -> Option<Arc<Topic>> {
        let prefix = prefix_of(pattern);
        let removed = self.groups.get_mut(prefix)?.remove(pattern);
        self.groups.remove_if(prefix, |_, group| group.is_empty());

        if removed.is_some() {
            tracing::debug!(topic = pattern, "Topic unregistered");
        }
        removed
    }

    /// Точное совпадение шаблона или самый специфичный подходящий шаблон.
    pub fn find(
        &self,
        topic: &str,
    ) -> Option<Arc<Topic>> {
        self.groups
            .get(prefix_of(topic))
            .and_then(|group| group.most_fitting(topic).cloned())
    }

    /// То же, что [`find`](Self::find), но с ошибкой `NotFound`.
    pub fn get_topic(
        &self,
        topic: &str,
    ) -> Result<Arc<Topic>, TopicError> {
        self.find(topic).ok_or_else(|| TopicError::NotFound {
            topic: topic.to_string(),
        })
    }

    pub fn contains(
        &self,
        pattern: &str,
    ) -> bool {
        self.groups
            .get(prefix_of(pattern))
            .is_some_and(|group| group.get(pattern).is_some())
    }

    /// Все зарегистрированные топики.
    pub fn topics(&self) -> Vec<Arc<Topic>> {
        self.groups
            .iter()
            .flat_map(|group| group.iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
