use std::{any::Any, time::Duration};

use hagrid_error::HagridResult;
use tracing::debug;

use crate::{
    packet::{Packet, Payload, Status},
    service::Hagrid,
};

/// Построитель пакета для одного топика.
///
/// ```ignore
/// let reply = hagrid
///     .wizard("ping")
///     .payload("ping".to_string())
///     .timeout(Duration::from_secs(1))
///     .send_and_wait()
///     .await?;
/// ```
pub struct PacketWizard<'a> {
    hagrid: &'a Hagrid,
    topic: String,
    key: String,
    status: Status,
    payload: Option<Payload>,
    request_id: Option<String>,
    timeout: Option<Duration>,
}

impl<'a> PacketWizard<'a> {
    pub(crate) fn new(
        hagrid: &'a Hagrid,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            hagrid,
            topic: topic.into(),
            key: String::new(),
            status: Status::ok(),
            payload: None,
            request_id: None,
            timeout: hagrid.config().listener_timeout(),
        }
    }

    /// Ключ маршрутизации. По умолчанию пустой.
    pub fn key(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        self.key = key.into();
        self
    }

    pub fn status(
        mut self,
        status: impl Into<Status>,
    ) -> Self {
        self.status = status.into();
        self
    }

    pub fn payload<T: Any + Send + Sync>(
        mut self,
        value: T,
    ) -> Self {
        self.payload = Some(Payload::new(value));
        self
    }

    /// Делает пакет ответом на `request`.
    pub fn responds_to(
        self,
        request: &Packet,
    ) -> Self {
        self.request_id(request.id())
    }

    pub fn request_id(
        mut self,
        request_id: impl Into<String>,
    ) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Таймаут ожидания ответа. `Duration::ZERO` означает ожидание без
    /// ограничения.
    pub fn timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    fn build(&mut self) -> Packet {
        Packet::new(self.topic.clone())
            .with_request_id(self.request_id.take().unwrap_or_default())
            .with_status(self.status.clone())
            .with_optional_payload(self.payload.take())
    }

    /// Отправляет пакет и возвращает его.
    pub async fn send(mut self) -> HagridResult<Packet> {
        let packet = self.build();
        self.hagrid.send(&self.topic, &self.key, &packet).await?;
        Ok(packet)
    }

    /// Отправляет пакет и ждёт ответ на него.
    ///
    /// Слушатель ответа регистрируется до отправки. По истечении таймаута
    /// возвращается пакет со статусом `TIMEOUT`.
    pub async fn send_and_wait(mut self) -> HagridResult<Packet> {
        let packet = self.build();
        let reply = self
            .hagrid
            .await_correlated(&self.topic, packet.id(), self.timeout)?;

        if let Err(e) = self.hagrid.send(&self.topic, &self.key, &packet).await {
            self.hagrid.unregister_listener(reply.listener_id());
            return Err(e);
        }
        debug!(topic = %self.topic, packet = packet.id(), "Waiting for reply");

        Ok(reply.wait().await?)
    }
}
