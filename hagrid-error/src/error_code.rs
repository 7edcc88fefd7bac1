use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Топики и реестры
/// - 3xxx: Слушатели
/// - 4xxx: Ограничения ресурсов
/// - 5xxx: Сериализация
/// - 6xxx: Соединение / брокер
/// - 7xxx: Конфигурация
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum ErrorCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    NotImplemented = 1005,

    // === 2xxx: Топики и реестры ===
    InvalidPattern = 2000,
    TopicNotFound = 2001,
    NotFound = 2002,
    AlreadyExists = 2003,

    // === 3xxx: Слушатели ===
    ListenerFailed = 3000,
    ListenerPanicked = 3001,
    ListenerTimeout = 3002,

    // === 4xxx: Ограничения ресурсов ===
    CapacityExceeded = 4000,
    RateLimited = 4001,

    // === 5xxx: Сериализация ===
    SerializationFailed = 5000,
    DeserializationFailed = 5001,
    EncodingError = 5002,
    DecodingError = 5003,
    TypeMismatch = 5004,

    // === 6xxx: Соединение/брокер ===
    NotConnected = 6000,
    ConnectionFailed = 6001,
    ConnectionClosed = 6002,
    Timeout = 6003,
    Cancelled = 6004,
    PublishFailed = 6005,
    BrokerUnavailable = 6006,
    Rejected = 6007,
    Io = 6008,

    // === 7xxx: Конфигурация ===
    InvalidConfig = 7000,
    ConfigLoadFailed = 7001,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ErrorCode {
    /// Числовое представление кода.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `ErrorCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с таким кодом имеет смысл повторить.
    ///
    /// Ошибки конфигурации и валидации никогда не повторяются.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionFailed
                | Self::ConnectionClosed
                | Self::BrokerUnavailable
                | Self::PublishFailed
                | Self::RateLimited
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающей стороны: неверный шаблон, неизвестный топик,
    /// исчерпанный пул, неверная конфигурация.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) || (7000..=7999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Внутренняя или инфраструктурная ошибка (диапазоны `1xxx`, `5xxx`,
    /// `6xxx`).
    pub fn is_server_error(&self) -> bool {
        let c = self.code();
        !matches!(self, Self::InvalidArgs) && matches!(c, 1000..=1999 | 5000..=6999)
    }

    /// Ошибка связи с брокером (диапазон 6xxx).
    pub fn is_connectivity_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::BrokerUnavailable)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::TopicNotFound | Self::AlreadyExists => LogLevel::Debug,
            Self::InvalidArgs | Self::InvalidPattern | Self::InvalidConfig => LogLevel::Info,
            Self::Timeout
            | Self::ListenerTimeout
            | Self::ConnectionClosed
            | Self::Cancelled
            | Self::ListenerFailed => LogLevel::Warn,
            Self::Internal
            | Self::BrokerUnavailable
            | Self::ListenerPanicked
            | Self::PublishFailed => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ErrorCode
////////////////////////////////////////////////////////////////////////////////

impl From<ErrorCode> for u32 {
    fn from(c: ErrorCode) -> Self {
        c.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
