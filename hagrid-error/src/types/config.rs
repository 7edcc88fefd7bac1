use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки загрузки и проверки конфигурации.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Источник конфигурации не читается или не парсится
    Load { reason: String },
    /// Значение вне допустимого диапазона
    Invalid { key: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "Failed to load configuration: {reason}"),
            Self::Invalid { key, reason } => write!(f, "Invalid value for '{key}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Load { .. } => ErrorCode::ConfigLoadFailed,
            Self::Invalid { .. } => ErrorCode::InvalidConfig,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
