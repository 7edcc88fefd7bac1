use std::{collections::HashMap, sync::Arc};

use super::Topic;

/// Все топики с общим первым сегментом.
///
/// Хранит точное соответствие шаблон → топик и список, отсортированный от
/// самого специфичного шаблона к самому общему.
#[derive(Debug, Default)]
pub struct TopicGroup {
    prefix: String,
    topics: HashMap<String, Arc<Topic>>,
    sorted: Vec<Arc<Topic>>,
}

impl TopicGroup {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            topics: HashMap::new(),
            sorted: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Добавляет или заменяет топик. Возвращает предыдущий топик с тем же
    /// шаблоном.
    pub fn insert(
        &mut self,
        topic: Arc<Topic>,
    ) -> Option<Arc<Topic>> {
        let previous = self
            .topics
            .insert(topic.name().to_string(), Arc::clone(&topic));

        match self
            .sorted
            .binary_search_by(|t| t.pattern().cmp(topic.pattern()))
        {
            Ok(pos) => self.sorted[pos] = topic,
            Err(pos) => self.sorted.insert(pos, topic),
        }

        previous
    }

    pub fn remove(
        &mut self,
        pattern: &str,
    ) -> Option<Arc<Topic>> {
        let removed = self.topics.remove(pattern)?;
        self.sorted.retain(|t| t.name() != pattern);
        Some(removed)
    }

    /// Точное совпадение шаблона.
    pub fn get(
        &self,
        pattern: &str,
    ) -> Option<&Arc<Topic>> {
        self.topics.get(pattern)
    }

    /// Самый специфичный топик, принимающий `topic`.
    ///
    /// Точное совпадение возвращается без обхода списка.
    pub fn most_fitting(
        &self,
        topic: &str,
    ) -> Option<&Arc<Topic>> {
        if let Some(exact) = self.topics.get(topic) {
            return Some(exact);
        }
        self.sorted.iter().find(|t| t.pattern().matches(topic))
    }

    /// Топики от самого специфичного к самому общему.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Topic>> {
        self.sorted.iter()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
