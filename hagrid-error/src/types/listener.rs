use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки регистрации и исполнения слушателей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// Шаблон топика слушателя некорректен
    InvalidPattern { pattern: String, reason: String },
    /// Обработчик вернул ошибку
    Execution { topic: String, message: String },
    /// Обработчик запаниковал
    Panicked { topic: String, message: String },
    /// Ожидание коррелированного ответа прервано до доставки
    Abandoned { request_id: String },
}

impl std::fmt::Display for ListenerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid listener pattern '{pattern}': {reason}")
            }
            Self::Execution { topic, message } => {
                write!(f, "Listener on '{topic}' failed: {message}")
            }
            Self::Panicked { topic, message } => {
                write!(f, "Listener on '{topic}' panicked: {message}")
            }
            Self::Abandoned { request_id } => {
                write!(f, "Wait for reply to '{request_id}' was abandoned")
            }
        }
    }
}

impl std::error::Error for ListenerError {}

impl ErrorExt for ListenerError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            Self::Execution { .. } => ErrorCode::ListenerFailed,
            Self::Panicked { .. } => ErrorCode::ListenerPanicked,
            Self::Abandoned { .. } => ErrorCode::Cancelled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
