use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки реестра топиков.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Шаблон не соответствует синтаксису kebab-case
    InvalidPattern { pattern: String, reason: String },
    /// Ни один зарегистрированный шаблон не подходит
    NotFound { topic: String },
}

impl std::fmt::Display for TopicError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid topic pattern '{pattern}': {reason}")
            }
            Self::NotFound { topic } => write!(f, "Topic not found: {topic}"),
        }
    }
}

impl std::error::Error for TopicError {}

impl ErrorExt for TopicError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            Self::NotFound { .. } => ErrorCode::TopicNotFound,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let topic = match self {
            Self::InvalidPattern { pattern, .. } => pattern.clone(),
            Self::NotFound { topic } => topic.clone(),
        };
        vec![
            ("error_type", "topic".to_string()),
            ("error_code", self.error_code().to_string()),
            ("topic", topic),
        ]
    }
}
