use uuid::Uuid;

use super::{Payload, Status};

/// Пакет, проходящий через брокер.
///
/// `id` задаётся при создании и больше не меняется. `request_id` пуст, если
/// пакет ни на что не отвечает, иначе равен `id` исходного пакета.
#[derive(Debug, Clone)]
pub struct Packet {
    topic: String,
    id: String,
    request_id: String,
    status: Status,
    payload: Option<Payload>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Packet {
    /// Создаёт пакет со случайным UUID v4 в качестве `id`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self::with_id(topic, Uuid::new_v4().to_string())
    }

    /// Создаёт пакет с заданным `id` (например, восстановленный с провода).
    pub fn with_id(
        topic: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            request_id: String::new(),
            status: Status::ok(),
            payload: None,
        }
    }

    /// Создаёт ответ на `packet`: тот же топик, `request_id` = `packet.id`.
    pub fn reply_to(packet: &Packet) -> Self {
        Self::new(packet.topic.clone()).with_request_id(packet.id.clone())
    }

    pub fn with_request_id(
        mut self,
        request_id: impl Into<String>,
    ) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_status(
        mut self,
        status: impl Into<Status>,
    ) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_payload(
        mut self,
        payload: Payload,
    ) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_optional_payload(
        mut self,
        payload: Option<Payload>,
    ) -> Self {
        self.payload = payload;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Является ли пакет ответом на другой пакет.
    pub fn is_reply(&self) -> bool {
        !self.request_id.is_empty()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Типизированный доступ к полезной нагрузке.
    pub fn payload_as<T: std::any::Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(Payload::downcast_ref::<T>)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::StatusCode;

    /// Тест проверяет значения по умолчанию нового пакета.
    #[test]
    fn test_new_packet_defaults() {
        let packet = Packet::new("events-login");

        assert_eq!(packet.topic(), "events-login");
        assert!(Uuid::parse_str(packet.id()).is_ok());
        assert_eq!(packet.request_id(), "");
        assert!(!packet.is_reply());
        assert!(packet.status().is_ok());
        assert!(packet.payload().is_none());
    }

    /// Тест проверяет, что id уникальны.
    #[test]
    fn test_ids_are_unique() {
        let a = Packet::new("t");
        let b = Packet::new("t");
        assert_ne!(a.id(), b.id());
    }

    /// Тест проверяет построение ответа.
    #[test]
    fn test_reply_to() {
        let request = Packet::new("ping").with_payload(Payload::new("hi".to_string()));
        let reply = Packet::reply_to(&request).with_status(StatusCode::NotFound);

        assert_eq!(reply.topic(), "ping");
        assert_eq!(reply.request_id(), request.id());
        assert_ne!(reply.id(), request.id());
        assert!(reply.is_reply());
        assert_eq!(reply.status().code, StatusCode::NotFound);
        assert!(reply.payload().is_none());
    }

    #[test]
    fn test_payload_as() {
        let packet = Packet::new("t").with_payload(Payload::new(42u64));
        assert_eq!(packet.payload_as::<u64>(), Some(&42));
        assert_eq!(packet.payload_as::<String>(), None);
    }
}
