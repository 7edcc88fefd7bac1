use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки, сообщаемые транспортом брокера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Брокер недоступен
    Unavailable { reason: String },
    /// Брокер не ответил вовремя
    Timeout,
    /// Операция отменена до завершения
    Cancelled,
    /// Брокер отклонил запись
    Rejected { reason: String },
    /// Клиент брокера уже закрыт
    Closed,
}

impl BrokerError {
    /// Является ли ошибка настоящей потерей связи.
    ///
    /// Отмена и отказ брокера принять запись не считаются фатальными и не
    /// переводят соединение в `INACTIVE`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "Broker unavailable: {reason}"),
            Self::Timeout => write!(f, "Broker request timed out"),
            Self::Cancelled => write!(f, "Broker request cancelled"),
            Self::Rejected { reason } => write!(f, "Broker rejected record: {reason}"),
            Self::Closed => write!(f, "Broker client is closed"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl ErrorExt for BrokerError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Unavailable { .. } => ErrorCode::BrokerUnavailable,
            Self::Timeout => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::Closed => ErrorCode::ConnectionClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
