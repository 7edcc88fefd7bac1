use std::{
    cmp::{Ordering, Reverse},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use hagrid_error::TopicError;
use regex::Regex;

/// Последний сегмент-шаблон: "этот сегмент и любые следующие".
pub const WILDCARD: &str = "*";
/// Разделитель сегментов.
pub const SEPARATOR: char = '-';

/// Скомпилированный шаблон топика.
///
/// Шаблон `foo-bar` принимает `foo-bar` и любое продолжение `foo-bar-...`.
/// Шаблон `foo-bar-*` принимает только продолжения: хотя бы один сегмент
/// после `foo-bar`.
///
/// Порядок (`Ord`) ранжирует шаблоны от самого специфичного к самому общему.
/// Каждый шаблон задаёт язык вида "префикс из сегментов + не меньше N
/// сегментов всего", поэтому порядок строится по ключу:
/// 1. минимальное число сегментов, по убыванию;
/// 2. при равенстве литеральный шаблон раньше шаблона с `*`;
/// 3. затем лексикографически по сегментам.
///
/// Если язык `A` строго вложен в язык `B`, то `A < B`.
#[derive(Clone)]
pub struct TopicPattern {
    raw: Arc<str>,
    segments: Vec<String>,
    wildcard: bool,
    matcher: Regex,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TopicPattern {
    /// Проверяет синтаксис и компилирует шаблон.
    pub fn parse(pattern: &str) -> Result<Self, TopicError> {
        let (segments, wildcard) = validate(pattern)?;

        let mut source = String::from("^");
        source.push_str(&regex::escape(&segments.join("-")));
        if wildcard {
            source.push_str(r"(?:-\w+)+$");
        } else {
            source.push_str(r"(?:-\w+)*$");
        }

        let matcher = Regex::new(&source).map_err(|e| TopicError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: Arc::from(pattern),
            segments,
            wildcard,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Первый сегмент: ключ группы топиков.
    pub fn prefix(&self) -> &str {
        &self.segments[0]
    }

    /// Литеральные сегменты (без `*`).
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Скомпилированное регулярное выражение (например, для подписки брокера
    /// по шаблону).
    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    /// Проверяет, принимает ли шаблон конкретное имя топика.
    pub fn matches(
        &self,
        topic: &str,
    ) -> bool {
        self.matcher.is_match(topic)
    }

    /// Минимальное число сегментов в принимаемом имени.
    pub fn min_segments(&self) -> usize {
        self.segments.len() + usize::from(self.wildcard)
    }

    /// Принимает ли `self` всё, что принимает `other`.
    pub fn covers(
        &self,
        other: &TopicPattern,
    ) -> bool {
        other.segments.starts_with(&self.segments) && other.min_segments() >= self.min_segments()
    }

    /// Строго ли `self` специфичнее `other`: язык `self` строго вложен в язык
    /// `other`.
    pub fn is_more_specific_than(
        &self,
        other: &TopicPattern,
    ) -> bool {
        self != other && other.covers(self)
    }

    fn sort_key(&self) -> (Reverse<usize>, bool, &[String]) {
        (Reverse(self.min_segments()), self.wildcard, &self.segments)
    }
}

/// Возвращает первый сегмент имени топика.
pub fn prefix_of(topic: &str) -> &str {
    topic.split(SEPARATOR).next().unwrap_or(topic)
}

fn validate(pattern: &str) -> Result<(Vec<String>, bool), TopicError> {
    let invalid = |reason: &str| TopicError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("pattern is empty"));
    }

    let parts: Vec<&str> = pattern.split(SEPARATOR).collect();
    let last = parts.len() - 1;
    let mut segments = Vec::with_capacity(parts.len());
    let mut wildcard = false;

    for (i, part) in parts.iter().enumerate() {
        if *part == WILDCARD {
            if i == 0 {
                return Err(invalid("wildcard must not be the first segment"));
            }
            if i != last {
                return Err(invalid("wildcard must be the last segment"));
            }
            wildcard = true;
            continue;
        }
        if part.is_empty() {
            return Err(invalid("empty segment"));
        }
        if !part
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid("segments must be lowercase alphanumeric"));
        }
        segments.push(part.to_string());
    }

    Ok((segments, wildcard))
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for TopicPattern {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.raw == other.raw
    }
}

impl Eq for TopicPattern {}

impl Hash for TopicPattern {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.raw.hash(state);
    }
}

impl Ord for TopicPattern {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for TopicPattern {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for TopicPattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "TopicPattern({})", self.raw)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
