//! Граница с брокером сообщений.
//!
//! Ядро работает с брокером только через три трейта:
//! - [`Transport`]: фабрика клиентов и проверка доступности;
//! - [`Publisher`]: публикация wire-пакетов;
//! - [`Subscriber`]: подписка по шаблону и опрос записей.
//!
//! `memory` содержит внутрипроцессную реализацию для тестов и демо.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
pub use hagrid_error::BrokerError;

pub use memory::*;
use crate::{packet::WirePacket, topic::TopicPattern};

/// Запись, полученная при опросе брокера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Конкретное имя топика, в который была опубликована запись.
    pub topic: String,
    pub packet: WirePacket,
}

/// Клиент публикации.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn open(&mut self) -> Result<(), BrokerError>;

    async fn close(&mut self);

    /// Публикует пакет и ждёт подтверждения брокера.
    async fn push(
        &self,
        topic: &str,
        key: &str,
        packet: &WirePacket,
    ) -> Result<(), BrokerError>;
}

/// Клиент подписки. Принадлежит одному потребителю.
#[async_trait]
pub trait Subscriber: Send {
    async fn open(&mut self) -> Result<(), BrokerError>;

    async fn close(&mut self);

    async fn subscribe(
        &mut self,
        topic: &TopicPattern,
    ) -> Result<(), BrokerError>;

    async fn unsubscribe(
        &mut self,
        topic: &TopicPattern,
    ) -> Result<(), BrokerError>;

    /// Ждёт записи не дольше `timeout`. Пустой результат не является
    /// ошибкой.
    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<Record>, BrokerError>;
}

/// Конкретный брокер: создаёт клиентов и проверяет связь.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn publisher(&self) -> Box<dyn Publisher>;

    fn subscriber(&self) -> Box<dyn Subscriber>;

    /// Проверка доступности на уровне протокола.
    async fn check_connection(&self) -> Result<(), BrokerError>;
}
