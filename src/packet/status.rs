use std::fmt;

use num_enum::TryFromPrimitive;

/// Код статуса пакета.
///
/// Числовые значения передаются по проводу как есть.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive)]
#[repr(u32)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    Timeout = 408,
    Internal = 500,
    Unavailable = 503,
}

/// Статус пакета: код, необязательный подкод (0 = не задан) и сообщение.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub code: StatusCode,
    pub subcode: i32,
    pub message: String,
}

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Неизвестные значения с провода трактуются как `Internal`.
    pub fn from_wire(v: u32) -> Self {
        Self::try_from(v).unwrap_or(Self::Internal)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            subcode: 0,
            message: String::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    pub fn timeout() -> Self {
        Self::new(StatusCode::Timeout)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal).with_message(message)
    }

    pub fn with_message(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_subcode(
        mut self,
        subcode: i32,
    ) -> Self {
        self.subcode = subcode;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for Status {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", self.code)?;
        if self.subcode != 0 {
            write!(f, "/{}", self.subcode)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire() {
        assert_eq!(StatusCode::from_wire(0), StatusCode::Ok);
        assert_eq!(StatusCode::from_wire(408), StatusCode::Timeout);
        assert_eq!(StatusCode::from_wire(12345), StatusCode::Internal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::ok().to_string(), "Ok");
        assert_eq!(
            Status::internal("boom").with_subcode(7).to_string(),
            "Internal/7: boom"
        );
    }
}
