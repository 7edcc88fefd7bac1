use std::any::Any;

use crate::{ErrorCode, ErrorExt};

/// Ошибки пути отправки и приёма пакетов.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Брокер не принял пакет
    Publish { topic: String, reason: String },
    /// Полезная нагрузка не сериализуется
    Serialization { topic: String, reason: String },
    /// Байты записи не десериализуются
    Deserialization {
        topic: String,
        type_tag: String,
        reason: String,
    },
    /// Тип полезной нагрузки не совпадает с привязкой топика
    TypeMismatch { expected: String, got: String },
    /// Ошибка кодирования/декодирования wire-пакета
    Codec { reason: String },
}

impl std::fmt::Display for StreamError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Publish { topic, reason } => {
                write!(f, "Failed to publish to '{topic}': {reason}")
            }
            Self::Serialization { topic, reason } => {
                write!(f, "Failed to serialize payload for '{topic}': {reason}")
            }
            Self::Deserialization {
                topic,
                type_tag,
                reason,
            } => write!(
                f,
                "Failed to deserialize '{type_tag}' payload from '{topic}': {reason}"
            ),
            Self::TypeMismatch { expected, got } => {
                write!(f, "Payload type mismatch: expected {expected}, got {got}")
            }
            Self::Codec { reason } => write!(f, "Wire codec error: {reason}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl ErrorExt for StreamError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Publish { .. } => ErrorCode::PublishFailed,
            Self::Serialization { .. } => ErrorCode::SerializationFailed,
            Self::Deserialization { .. } => ErrorCode::DeserializationFailed,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::Codec { .. } => ErrorCode::DecodingError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Publish { topic, .. } => format!("Failed to publish to '{topic}'"),
            _ => self.to_string(),
        }
    }
}
