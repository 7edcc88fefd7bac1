use std::sync::Arc;

use hagrid_error::{bail, BrokerError, ConnectionError, HagridResult, ResultExt, StreamError};
use tokio::sync::RwLock;
use tracing::{debug, error, trace};

use super::IdleTracker;
use crate::{
    broker::{Publisher, Transport},
    connection::ConnectionHandler,
    listener::{Direction, ListenerRegistry},
    packet::{Packet, WirePacket, WirePayload},
    topic::{Topic, TopicRegistry},
};

/// Путь отправки: проверка топика, сериализация, публикация, учёт
/// отправленных пакетов и диспетчеризация `UPSTREAM`.
pub struct UpstreamHandler {
    transport: Arc<dyn Transport>,
    topics: Arc<TopicRegistry>,
    listeners: Arc<ListenerRegistry>,
    connection: ConnectionHandler,
    idle: Arc<IdleTracker>,
    publisher: RwLock<Option<Box<dyn Publisher>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl UpstreamHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        topics: Arc<TopicRegistry>,
        listeners: Arc<ListenerRegistry>,
        connection: ConnectionHandler,
        idle: Arc<IdleTracker>,
    ) -> Self {
        Self {
            transport,
            topics,
            listeners,
            connection,
            idle,
            publisher: RwLock::new(None),
        }
    }

    /// Открывает нового издателя. Предыдущий, если был, закрывается.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        let mut publisher = self.transport.publisher();
        publisher.open().await?;

        let previous = self.publisher.write().await.replace(publisher);
        if let Some(mut previous) = previous {
            previous.close().await;
        }
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(mut publisher) = self.publisher.write().await.take() {
            publisher.close().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.publisher.read().await.is_some()
    }

    /// Публикует пакет в `topic` с ключом маршрутизации `key`.
    ///
    /// Ошибка брокера передаётся машине состояний соединения и возвращается
    /// как [`StreamError::Publish`]. После успешной публикации пакет попадает
    /// в набор отправленных, затем вызываются слушатели `UPSTREAM`. Ответы
    /// этих слушателей не публикуются.
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        packet: &Packet,
    ) -> HagridResult<()> {
        let guard = self.publisher.read().await;
        let publisher = guard.as_ref().ok_or(ConnectionError::NotConnected)?;

        let registered = self
            .topics
            .get_topic(topic)
            .context("Resolving topic for send")?;
        let payload = encode_payload(&registered, topic, packet)
            .with_context(|| format!("Encoding payload of packet {}", packet.id()))?;
        let wire = WirePacket::from_packet(packet, payload);

        if let Err(e) = publisher.push(topic, key, &wire).await {
            error!(topic, packet = packet.id(), error = %e, "Failed to publish packet");
            self.connection.handle_error(&e);
            bail!(StreamError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }
        drop(guard);

        trace!(topic, key, packet = packet.id(), "Sent packet");
        self.idle.track(packet.clone());

        let replies = self
            .listeners
            .execute_listeners(topic, Direction::Upstream, packet);
        if !replies.is_empty() {
            debug!(topic, count = replies.len(), "Discarding replies from upstream listeners");
        }
        Ok(())
    }

    pub fn is_idling(
        &self,
        packet_id: &str,
    ) -> bool {
        self.idle.is_idling(packet_id)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Пустая нагрузка даёт пустые байты без вызова сериализатора.
fn encode_payload(
    registered: &Topic,
    topic: &str,
    packet: &Packet,
) -> Result<WirePayload, StreamError> {
    let Some(payload) = packet.payload() else {
        return Ok(WirePayload::empty());
    };

    let serdes = registered.serdes();
    let bytes = serdes
        .serialize(payload)
        .map_err(|e| StreamError::Serialization {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
    Ok(WirePayload::new(serdes.type_tag(), bytes))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
