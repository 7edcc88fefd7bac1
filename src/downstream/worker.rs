use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use hagrid_error::StreamError;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    broker::{Record, Subscriber},
    packet::Packet,
    topic::{TopicPattern, TopicRegistry},
};

/// Точка входа для пакетов, полученных из брокера.
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// `topic`: конкретное имя топика записи.
    async fn receive(
        &self,
        topic: &str,
        packet: Packet,
    );
}

/// Команды потребителю от пула.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Subscribe(TopicPattern),
    Unsubscribe(TopicPattern),
    Stop,
}

/// Общие для всех потребителей зависимости.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) topics: Arc<TopicRegistry>,
    pub(crate) sink: Weak<dyn PacketSink>,
    pub(crate) poll_timeout: Duration,
}

/// Потребитель: владеет клиентом подписки и опрашивает его в цикле.
pub(crate) struct Worker {
    id: usize,
    subscriber: Box<dyn Subscriber>,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    initial: Vec<TopicPattern>,
    ctx: WorkerContext,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Worker {
    pub(crate) fn new(
        id: usize,
        subscriber: Box<dyn Subscriber>,
        commands: mpsc::UnboundedReceiver<WorkerCommand>,
        initial: Vec<TopicPattern>,
        ctx: WorkerContext,
    ) -> Self {
        Self {
            id,
            subscriber,
            commands,
            initial,
            ctx,
        }
    }

    /// Цикл опроса. Завершается по команде `Stop`, при закрытии канала
    /// команд или когда точка входа больше не существует.
    pub(crate) async fn run(self) {
        let Worker {
            id,
            mut subscriber,
            mut commands,
            initial,
            ctx,
        } = self;

        for pattern in &initial {
            if let Err(e) = subscriber.subscribe(pattern).await {
                warn!(worker = id, topic = %pattern, error = %e, "Failed to subscribe");
            }
        }

        let mut opened = false;
        debug!(worker = id, topics = initial.len(), "Consumer worker started");

        loop {
            if ctx.sink.strong_count() == 0 {
                break;
            }
            if !opened {
                match subscriber.open().await {
                    Ok(()) => opened = true,
                    Err(e) => warn!(worker = id, error = %e, "Failed to open subscriber"),
                }
            }

            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(WorkerCommand::Subscribe(pattern)) => {
                        if let Err(e) = subscriber.subscribe(&pattern).await {
                            warn!(worker = id, topic = %pattern, error = %e, "Failed to subscribe");
                        }
                    }
                    Some(WorkerCommand::Unsubscribe(pattern)) => {
                        if let Err(e) = subscriber.unsubscribe(&pattern).await {
                            warn!(worker = id, topic = %pattern, error = %e, "Failed to unsubscribe");
                        }
                    }
                    Some(WorkerCommand::Stop) | None => break,
                },
                polled = subscriber.poll(ctx.poll_timeout), if opened => match polled {
                    Ok(records) => {
                        for record in records {
                            ctx.deliver(record).await;
                        }
                    }
                    Err(e) => {
                        warn!(worker = id, error = %e, "Poll failed");
                        tokio::time::sleep(ctx.poll_timeout).await;
                    }
                },
                _ = tokio::time::sleep(ctx.poll_timeout), if !opened => {}
            }
        }

        subscriber.close().await;
        debug!(worker = id, "Consumer worker stopped");
    }
}

impl WorkerContext {
    /// Восстанавливает пакет из записи и передаёт его точке входа.
    ///
    /// Записи незарегистрированных топиков пропускаются молча, записи с
    /// недесериализуемой нагрузкой пропускаются с предупреждением.
    pub(crate) async fn deliver(
        &self,
        record: Record,
    ) {
        let Some(topic) = self.topics.find(&record.topic) else {
            trace!(topic = %record.topic, "Dropping record for unregistered topic");
            return;
        };

        let mut wire = record.packet;
        // Пустой топик в пакете означает топик канала.
        if wire.topic.is_empty() {
            wire.topic.clone_from(&record.topic);
        }
        let payload = if wire.has_payload() {
            match topic
                .serdes()
                .deserialize(&wire.payload.type_tag, &wire.payload.bytes)
            {
                Ok(payload) => Some(payload),
                Err(e) => {
                    let err = StreamError::Deserialization {
                        topic: record.topic.clone(),
                        type_tag: wire.payload.type_tag.clone(),
                        reason: e.to_string(),
                    };
                    warn!(packet = %wire.id, error = %err, "Dropping record");
                    return;
                }
            }
        } else {
            None
        };

        let Some(sink) = self.sink.upgrade() else {
            return;
        };
        sink.receive(&record.topic, wire.into_packet(payload)).await;
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
