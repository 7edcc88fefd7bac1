use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки пула потребителей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Достигнут максимум параллельных потребителей
    CapacityExceeded { max: usize },
}

impl std::fmt::Display for PoolError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { max } => {
                write!(f, "Reached maximum of {max} parallel consumer workers")
            }
        }
    }
}

impl std::error::Error for PoolError {}

impl ErrorExt for PoolError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::CapacityExceeded
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let Self::CapacityExceeded { max } = self;
        vec![
            ("error_type", "pool".to_string()),
            ("error_code", self.error_code().to_string()),
            ("max_workers", max.to_string()),
        ]
    }
}
