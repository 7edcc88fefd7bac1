use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки управления соединением.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Отправка до вызова `connect()`
    NotConnected,
    /// Не удалось открыть клиентов брокера
    ConnectFailed { reason: String },
    /// Проверка доступности брокера не прошла
    LivenessCheckFailed { reason: String },
}

impl std::fmt::Display for ConnectionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "connect() has to be called before sending"),
            Self::ConnectFailed { reason } => write!(f, "Failed to connect: {reason}"),
            Self::LivenessCheckFailed { reason } => {
                write!(f, "Broker liveness check failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

impl ErrorExt for ConnectionError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConnected => ErrorCode::NotConnected,
            Self::ConnectFailed { .. } | Self::LivenessCheckFailed { .. } => {
                ErrorCode::ConnectionFailed
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
