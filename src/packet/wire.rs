use bytes::Bytes;
use hagrid_error::StreamError;
use serde::{Deserialize, Serialize};

use super::{Packet, Payload, Status, StatusCode};

/// Пакет в том виде, в каком он уходит в брокер: одна запись на пакет.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePacket {
    pub topic: String,
    pub id: String,
    pub request_id: String,
    pub status: WireStatus,
    pub payload: WirePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireStatus {
    pub code: u32,
    pub subcode: i32,
    pub message: String,
}

/// Сериализованная полезная нагрузка. Пустые `bytes` означают отсутствие
/// нагрузки, и десериализатор не вызывается.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WirePayload {
    pub type_tag: String,
    pub bytes: Bytes,
}

impl WirePacket {
    /// Собирает wire-пакет из пакета и уже сериализованной нагрузки.
    pub fn from_packet(
        packet: &Packet,
        payload: WirePayload,
    ) -> Self {
        let status = packet.status();
        Self {
            topic: packet.topic().to_string(),
            id: packet.id().to_string(),
            request_id: packet.request_id().to_string(),
            status: WireStatus {
                code: status.code.code(),
                subcode: status.subcode,
                message: status.message.clone(),
            },
            payload,
        }
    }

    pub fn status(&self) -> Status {
        Status {
            code: StatusCode::from_wire(self.status.code),
            subcode: self.status.subcode,
            message: self.status.message.clone(),
        }
    }

    /// Восстанавливает пакет с уже десериализованной нагрузкой.
    pub fn into_packet(
        self,
        payload: Option<Payload>,
    ) -> Packet {
        let status = self.status();
        Packet::with_id(self.topic, self.id)
            .with_request_id(self.request_id)
            .with_status(status)
            .with_optional_payload(payload)
    }

    pub fn has_payload(&self) -> bool {
        !self.payload.bytes.is_empty()
    }

    pub fn encode(&self) -> Result<Bytes, StreamError> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| StreamError::Codec {
                reason: e.to_string(),
            })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, StreamError> {
        bincode::deserialize(buf).map_err(|e| StreamError::Codec {
            reason: e.to_string(),
        })
    }
}

impl WirePayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        type_tag: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            bytes: bytes.into(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет перенос полей пакета в wire-формат и обратно через
    /// кодек.
    #[test]
    fn test_from_packet_and_codec() {
        let request = Packet::new("orders-created");
        let reply = Packet::reply_to(&request)
            .with_status(Status::internal("boom").with_subcode(3));

        let wire = WirePacket::from_packet(&reply, WirePayload::new("string", "abc"));
        let decoded = WirePacket::decode(&wire.encode().unwrap()).unwrap();

        assert_eq!(decoded, wire);
        assert_eq!(decoded.request_id, request.id());
        assert_eq!(decoded.status().code, StatusCode::Internal);
        assert_eq!(decoded.status().subcode, 3);
        assert_eq!(decoded.status().message, "boom");
        assert!(decoded.has_payload());
    }

    #[test]
    fn test_empty_payload() {
        let wire = WirePacket::from_packet(&Packet::new("t"), WirePayload::empty());
        assert!(!wire.has_payload());
        assert_eq!(wire.payload.type_tag, "");
    }

    #[test]
    fn test_into_packet_keeps_identity() {
        let request = Packet::new("orders");
        let reply = Packet::reply_to(&request).with_status(Status::timeout());
        let wire = WirePacket::from_packet(&reply, WirePayload::empty());

        let restored = wire.into_packet(Some(Payload::new(7u8)));
        assert_eq!(restored.id(), reply.id());
        assert_eq!(restored.request_id(), request.id());
        assert_eq!(restored.status().code, StatusCode::Timeout);
        assert_eq!(restored.payload_as::<u8>(), Some(&7));
    }

    /// Тест проверяет, что мусор не декодируется.
    #[test]
    fn test_decode_garbage() {
        let err = WirePacket::decode(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, StreamError::Codec { .. }));
    }
}
