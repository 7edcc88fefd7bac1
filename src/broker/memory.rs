use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{BrokerError, Publisher, Record, Subscriber, Transport};
use crate::{packet::WirePacket, topic::TopicPattern};

/// Сколько записей подписчик забирает за один опрос.
pub const MAX_POLL_RECORDS: usize = 500;

/// Сообщение внутри брокера: закодированный wire-пакет.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: Arc<str>,
    pub key: String,
    pub payload: Bytes,
}

/// Внутрипроцессный брокер.
///
/// Каждая запись доставляется не более чем одному подписчику из каждой
/// группы потребителей (подписчику с наименьшим идентификатором среди
/// подходящих). Разные группы получают свои копии.
///
/// Клонирование дешёвое: все клоны разделяют одно состояние.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    subscribers: DashMap<u64, SubscriberSlot>,
    next_subscriber: AtomicU64,
    /// `true` означает "недоступен"; по умолчанию брокер доступен.
    offline: AtomicBool,
    /// Общее количество успешных публикаций
    publish_count: AtomicUsize,
    /// Публикации, которые никто не получил
    send_error_count: AtomicUsize,
}

struct SubscriberSlot {
    group: Arc<str>,
    patterns: Vec<TopicPattern>,
    tx: mpsc::UnboundedSender<Message>,
}

/// Транспорт для одной группы потребителей.
#[derive(Clone)]
pub struct InMemoryTransport {
    broker: InMemoryBroker,
    group: Arc<str>,
}

pub struct InMemoryPublisher {
    broker: InMemoryBroker,
    open: bool,
}

pub struct InMemorySubscriber {
    broker: InMemoryBroker,
    group: Arc<str>,
    slot: Option<u64>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    patterns: Vec<TopicPattern>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Транспорт, чьи подписчики принадлежат группе `group`.
    pub fn transport(
        &self,
        group: &str,
    ) -> InMemoryTransport {
        InMemoryTransport {
            broker: self.clone(),
            group: Arc::from(group),
        }
    }

    /// Включает или выключает брокер. Недоступный брокер отклоняет
    /// публикации, открытие подписчиков и проверку связи.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.inner.offline.store(!available, Ordering::SeqCst);
        debug!(available, "in-memory broker availability changed");
    }

    pub fn is_available(&self) -> bool {
        !self.inner.offline.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.inner.publish_count.load(Ordering::Relaxed)
    }

    pub fn send_error_count(&self) -> usize {
        self.inner.send_error_count.load(Ordering::Relaxed)
    }

    /// Количество открытых подписчиков.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Публикует сообщение. Возвращает количество групп, получивших его.
    pub fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<usize, BrokerError> {
        self.ensure_available()?;
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        // группа → (id, sender) подписчика с наименьшим id
        let mut targets: BTreeMap<Arc<str>, (u64, mpsc::UnboundedSender<Message>)> =
            BTreeMap::new();
        for entry in self.inner.subscribers.iter() {
            let slot = entry.value();
            if !slot.patterns.iter().any(|p| p.matches(topic)) {
                continue;
            }
            let id = *entry.key();
            let lower = targets
                .get(&slot.group)
                .map_or(true, |(current, _)| id < *current);
            if lower {
                targets.insert(slot.group.clone(), (id, slot.tx.clone()));
            }
        }

        let message = Message {
            topic: Arc::from(topic),
            key: key.to_string(),
            payload,
        };
        let delivered = targets
            .into_values()
            .filter(|(_, tx)| tx.send(message.clone()).is_ok())
            .count();

        if delivered == 0 {
            self.inner.send_error_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(delivered)
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable {
                reason: "in-memory broker is offline".to_string(),
            })
        }
    }

    fn attach(
        &self,
        group: Arc<str>,
        patterns: Vec<TopicPattern>,
    ) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.insert(
            id,
            SubscriberSlot {
                group,
                patterns,
                tx,
            },
        );
        (id, rx)
    }

    fn detach(
        &self,
        id: u64,
    ) {
        self.inner.subscribers.remove(&id);
    }

    fn update_patterns(
        &self,
        id: u64,
        patterns: &[TopicPattern],
    ) {
        if let Some(mut slot) = self.inner.subscribers.get_mut(&id) {
            slot.patterns = patterns.to_vec();
        }
    }
}

impl InMemorySubscriber {
    /// Шаблоны, на которые подписан клиент.
    pub fn patterns(&self) -> &[TopicPattern] {
        &self.patterns
    }

    fn decode(message: Message) -> Option<Record> {
        match WirePacket::decode(&message.payload) {
            Ok(packet) => Some(Record {
                topic: message.topic.to_string(),
                packet,
            }),
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping undecodable record");
                None
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Transport for InMemoryTransport {
    fn publisher(&self) -> Box<dyn Publisher> {
        Box::new(InMemoryPublisher {
            broker: self.broker.clone(),
            open: false,
        })
    }

    fn subscriber(&self) -> Box<dyn Subscriber> {
        Box::new(InMemorySubscriber {
            broker: self.broker.clone(),
            group: self.group.clone(),
            slot: None,
            rx: None,
            patterns: Vec::new(),
        })
    }

    async fn check_connection(&self) -> Result<(), BrokerError> {
        self.broker.ensure_available()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn open(&mut self) -> Result<(), BrokerError> {
        self.broker.ensure_available()?;
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
    }

    async fn push(
        &self,
        topic: &str,
        key: &str,
        packet: &WirePacket,
    ) -> Result<(), BrokerError> {
        if !self.open {
            return Err(BrokerError::Closed);
        }
        let bytes = packet.encode().map_err(|e| BrokerError::Rejected {
            reason: e.to_string(),
        })?;
        self.broker.publish(topic, key, bytes).map(|_| ())
    }
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn open(&mut self) -> Result<(), BrokerError> {
        self.broker.ensure_available()?;
        if self.slot.is_none() {
            let (id, rx) = self
                .broker
                .attach(self.group.clone(), self.patterns.clone());
            self.slot = Some(id);
            self.rx = Some(rx);
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(id) = self.slot.take() {
            self.broker.detach(id);
        }
        self.rx = None;
    }

    async fn subscribe(
        &mut self,
        topic: &TopicPattern,
    ) -> Result<(), BrokerError> {
        if !self.patterns.contains(topic) {
            self.patterns.push(topic.clone());
        }
        if let Some(id) = self.slot {
            self.broker.update_patterns(id, &self.patterns);
        }
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        topic: &TopicPattern,
    ) -> Result<(), BrokerError> {
        self.patterns.retain(|p| p != topic);
        if let Some(id) = self.slot {
            self.broker.update_patterns(id, &self.patterns);
        }
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<Record>, BrokerError> {
        let rx = self.rx.as_mut().ok_or(BrokerError::Closed)?;

        let first = match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => return Err(BrokerError::Closed),
            Err(_) => return Ok(Vec::new()),
        };

        let mut records = Vec::new();
        records.extend(Self::decode(first));
        while records.len() < MAX_POLL_RECORDS {
            match rx.try_recv() {
                Ok(message) => records.extend(Self::decode(message)),
                Err(_) => break,
            }
        }
        Ok(records)
    }
}

impl Drop for InMemorySubscriber {
    fn drop(&mut self) {
        if let Some(id) = self.slot.take() {
            self.broker.detach(id);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
