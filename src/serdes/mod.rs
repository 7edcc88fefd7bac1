//! Привязки сериализации полезной нагрузки к топику.
//!
//! Каждый топик хранит свой [`Serdes`]. Путь отправки вызывает `serialize`,
//! потребители вызывают `deserialize` только для непустых байтов.

use std::{any::Any, marker::PhantomData, string::FromUtf8Error};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::packet::{Payload, PayloadType};

/// Ошибки сериализации полезной нагрузки.
#[derive(Debug, Error)]
pub enum SerdesError {
    #[error("expected payload of type {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("unexpected type tag '{0}'")]
    UnknownTag(String),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Сериализатор/десериализатор полезной нагрузки топика.
pub trait Serdes: Send + Sync + 'static {
    /// Тег типа, записываемый в `payload.type_tag`.
    fn type_tag(&self) -> &str;

    /// Тип значения, который принимает и возвращает привязка. `None` для
    /// привязок без нагрузки.
    fn declared_type(&self) -> Option<PayloadType>;

    fn serialize(
        &self,
        payload: &Payload,
    ) -> Result<Bytes, SerdesError>;

    fn deserialize(
        &self,
        type_tag: &str,
        bytes: &[u8],
    ) -> Result<Payload, SerdesError>;
}

fn downcast<'a, T: Any>(payload: &'a Payload) -> Result<&'a T, SerdesError> {
    payload
        .downcast_ref::<T>()
        .ok_or_else(|| SerdesError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            got: payload.type_name(),
        })
}

/// Привязка для топиков без полезной нагрузки.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSerdes;

impl Serdes for NullSerdes {
    fn type_tag(&self) -> &str {
        ""
    }

    fn declared_type(&self) -> Option<PayloadType> {
        None
    }

    fn serialize(
        &self,
        _payload: &Payload,
    ) -> Result<Bytes, SerdesError> {
        Ok(Bytes::new())
    }

    fn deserialize(
        &self,
        type_tag: &str,
        _bytes: &[u8],
    ) -> Result<Payload, SerdesError> {
        Err(SerdesError::UnknownTag(type_tag.to_string()))
    }
}

/// UTF-8 строки.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerdes;

impl Serdes for StringSerdes {
    fn type_tag(&self) -> &str {
        "string"
    }

    fn declared_type(&self) -> Option<PayloadType> {
        Some(PayloadType::of::<String>())
    }

    fn serialize(
        &self,
        payload: &Payload,
    ) -> Result<Bytes, SerdesError> {
        let s = downcast::<String>(payload)?;
        Ok(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn deserialize(
        &self,
        _type_tag: &str,
        bytes: &[u8],
    ) -> Result<Payload, SerdesError> {
        Ok(Payload::new(String::from_utf8(bytes.to_vec())?))
    }
}

/// Сырые байты без преобразования.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerdes;

impl Serdes for BytesSerdes {
    fn type_tag(&self) -> &str {
        "bytes"
    }

    fn declared_type(&self) -> Option<PayloadType> {
        Some(PayloadType::of::<Bytes>())
    }

    fn serialize(
        &self,
        payload: &Payload,
    ) -> Result<Bytes, SerdesError> {
        downcast::<Bytes>(payload).cloned()
    }

    fn deserialize(
        &self,
        _type_tag: &str,
        bytes: &[u8],
    ) -> Result<Payload, SerdesError> {
        Ok(Payload::new(Bytes::copy_from_slice(bytes)))
    }
}

/// JSON через `serde_json` для любого `T: Serialize + DeserializeOwned`.
pub struct JsonSerdes<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerdes<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerdes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serdes for JsonSerdes<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn type_tag(&self) -> &str {
        std::any::type_name::<T>()
    }

    fn declared_type(&self) -> Option<PayloadType> {
        Some(PayloadType::of::<T>())
    }

    fn serialize(
        &self,
        payload: &Payload,
    ) -> Result<Bytes, SerdesError> {
        let value = downcast::<T>(payload)?;
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(
        &self,
        _type_tag: &str,
        bytes: &[u8],
    ) -> Result<Payload, SerdesError> {
        let value: T = serde_json::from_slice(bytes)?;
        Ok(Payload::new(value))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
