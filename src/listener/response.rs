use std::any::Any;

use crate::packet::{Packet, Payload, Status, StatusCode};

/// Ответ, который слушатель может заполнить во время обработки.
///
/// Если задан статус или полезная нагрузка, диспетчер публикует ответный
/// пакет, связанный с входящим через `request_id`.
#[derive(Debug, Default, Clone)]
pub struct Response {
    status: Option<Status>,
    payload: Option<Payload>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(
        &mut self,
        status: impl Into<Status>,
    ) -> &mut Self {
        self.status = Some(status.into());
        self
    }

    pub fn set_payload<T: Any + Send + Sync>(
        &mut self,
        value: T,
    ) -> &mut Self {
        self.payload = Some(Payload::new(value));
        self
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payload.is_none()
    }

    /// Превращает заполненный ответ в пакет-ответ на `request`. Статус по
    /// умолчанию `OK`.
    pub fn into_reply(
        self,
        request: &Packet,
    ) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let status = self.status.unwrap_or_else(|| Status::new(StatusCode::Ok));
        Some(
            Packet::reply_to(request)
                .with_status(status)
                .with_optional_payload(self.payload),
        )
    }
}
