use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use hagrid_error::{BrokerError, HagridResult, ListenerError, ResultExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    broker::Transport,
    config::HagridConfig,
    connection::{Connectible, ConnectionHandler, ConnectionStatus},
    downstream::{DownstreamPool, PacketSink},
    listener::{spawn_timeout_sweeper, CorrelatedReply, Direction, Listener, ListenerId, ListenerRegistry},
    packet::Packet,
    serdes::Serdes,
    topic::{Topic, TopicProperties, TopicRegistry},
    upstream::{spawn_idle_cleanup, IdleTracker, UpstreamHandler},
    wizard::PacketWizard,
};

/// Точка входа: связывает реестры, путь отправки, пул потребителей и
/// машину состояний соединения поверх одного [`Transport`].
///
/// Клонирование дешёвое. Фоновые задачи останавливаются, когда уничтожен
/// последний клон.
#[derive(Clone)]
pub struct Hagrid {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: HagridConfig,
    transport: Arc<dyn Transport>,
    topics: Arc<TopicRegistry>,
    listeners: Arc<ListenerRegistry>,
    idle: Arc<IdleTracker>,
    connection: ConnectionHandler,
    upstream: UpstreamHandler,
    downstream: DownstreamPool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Hagrid {
    /// Проверяет настройки, создаёт сервис и запускает очистку слушателей
    /// и отправленных пакетов. Должен вызываться внутри tokio runtime.
    pub fn new(
        config: HagridConfig,
        transport: impl Transport,
    ) -> HagridResult<Self> {
        config
            .validate()
            .context("Validating service configuration")?;

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let topics = Arc::new(TopicRegistry::new());
        let listeners = Arc::new(ListenerRegistry::new());
        let idle = Arc::new(IdleTracker::new(config.idle_retention()));

        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let target: Weak<dyn Connectible> = weak.clone();
            let sink: Weak<dyn PacketSink> = weak.clone();

            let connection = ConnectionHandler::new(target, config.reconnect_delay());
            let upstream = UpstreamHandler::new(
                Arc::clone(&transport),
                Arc::clone(&topics),
                Arc::clone(&listeners),
                connection.clone(),
                Arc::clone(&idle),
            );
            let downstream = DownstreamPool::new(
                Arc::clone(&transport),
                Arc::clone(&topics),
                sink,
                config.max_subscribers,
                config.poll_timeout(),
            );

            ServiceInner {
                config: config.clone(),
                transport: Arc::clone(&transport),
                topics: Arc::clone(&topics),
                listeners: Arc::clone(&listeners),
                idle: Arc::clone(&idle),
                connection,
                upstream,
                downstream,
                tasks: Mutex::new(Vec::new()),
            }
        });

        inner.tasks.lock().extend([
            spawn_timeout_sweeper(
                Arc::clone(&inner.listeners),
                inner.config.listener_cleanup_interval(),
            ),
            spawn_idle_cleanup(Arc::clone(&inner.idle), inner.config.idle_cleanup_interval()),
        ]);

        info!(
            max_subscribers = inner.config.max_subscribers,
            reconnect_delay_secs = inner.config.reconnect_delay_secs,
            "Hagrid service created"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &HagridConfig {
        &self.inner.config
    }

    /// Регистрирует топик и назначает его потребителю.
    ///
    /// Топик попадает в реестр раньше, чем потребитель на него подпишется.
    /// При ошибке пула (нет свободных потребителей) реестр возвращается в
    /// прежнее состояние.
    pub fn register_topic(
        &self,
        pattern: &str,
        serdes: Arc<dyn Serdes>,
        properties: TopicProperties,
    ) -> HagridResult<Arc<Topic>> {
        let topic = Arc::new(Topic::new(pattern, serdes, properties)?);
        let (topic, previous) = self.inner.topics.insert(topic);

        if let Err(e) = self.inner.downstream.add_to_subscriber(Arc::clone(&topic)) {
            match previous {
                Some(previous) => {
                    self.inner.topics.insert(previous);
                }
                None => {
                    self.inner.topics.remove(topic.name());
                }
            }
            return Err(e)
                .with_context(|| format!("Assigning topic {} to a consumer", topic.name()));
        }
        Ok(topic)
    }

    /// Снимает топик с потребителя и удаляет из реестра.
    pub fn unregister_topic(
        &self,
        pattern: &str,
    ) -> Option<Arc<Topic>> {
        self.inner.downstream.remove_from_subscriber(pattern);
        self.inner.topics.remove(pattern)
    }

    /// Самый специфичный зарегистрированный топик для имени.
    pub fn topic(
        &self,
        topic: &str,
    ) -> Option<Arc<Topic>> {
        self.inner.topics.find(topic)
    }

    pub fn register_listener(
        &self,
        listener: Listener,
    ) -> HagridResult<ListenerId> {
        Ok(self.inner.listeners.register(listener)?)
    }

    pub fn unregister_listener(
        &self,
        id: ListenerId,
    ) -> bool {
        self.inner.listeners.unregister(id)
    }

    pub async fn connect(&self) -> HagridResult<()> {
        self.inner
            .connection
            .connect()
            .await
            .context("Connecting to broker")
    }

    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
    }

    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        packet: &Packet,
    ) -> HagridResult<()> {
        self.inner.upstream.send(topic, key, packet).await
    }

    /// Входная точка для полученных пакетов: диспетчеризация `DOWNSTREAM`
    /// и публикация ответов слушателей.
    pub async fn receive(
        &self,
        topic: &str,
        packet: Packet,
    ) {
        self.inner.dispatch_downstream(topic, packet).await;
    }

    /// Одноразовый слушатель ответа на пакет `request_id` в `topic`.
    pub fn await_correlated(
        &self,
        topic: &str,
        request_id: &str,
        timeout: Option<Duration>,
    ) -> Result<CorrelatedReply, ListenerError> {
        self.inner
            .listeners
            .await_correlated(topic, request_id, timeout)
    }

    /// Построитель пакета с отправкой и ожиданием ответа.
    pub fn wizard(
        &self,
        topic: impl Into<String>,
    ) -> PacketWizard<'_> {
        PacketWizard::new(self, topic)
    }

    pub fn is_idling(
        &self,
        packet_id: &str,
    ) -> bool {
        self.inner.upstream.is_idling(packet_id)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.inner.topics
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn connection(&self) -> &ConnectionHandler {
        &self.inner.connection
    }

    pub fn downstream(&self) -> &DownstreamPool {
        &self.inner.downstream
    }
}

impl ServiceInner {
    /// Ответы публикуются в топик, по которому пришёл пакет. Ответ на
    /// пакет, который сам является ответом, не публикуется.
    async fn dispatch_downstream(
        &self,
        topic: &str,
        packet: Packet,
    ) {
        let replies = self
            .listeners
            .execute_listeners(topic, Direction::Downstream, &packet);
        if replies.is_empty() {
            return;
        }
        if packet.is_reply() {
            debug!(
                topic,
                packet = packet.id(),
                count = replies.len(),
                "Discarding replies to a reply packet"
            );
            return;
        }

        for reply in replies {
            if let Err(e) = self.upstream.send(topic, "", &reply).await {
                warn!(topic, request = packet.id(), error = %e, "Failed to publish reply");
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Connectible for ServiceInner {
    async fn open_paths(&self) -> Result<(), BrokerError> {
        self.upstream.connect().await?;
        self.downstream.connect();
        Ok(())
    }

    async fn close_paths(&self) {
        self.upstream.disconnect().await;
        self.downstream.disconnect().await;
    }

    async fn check_connection(&self) -> Result<(), BrokerError> {
        self.transport.check_connection().await
    }
}

#[async_trait]
impl PacketSink for ServiceInner {
    async fn receive(
        &self,
        topic: &str,
        packet: Packet,
    ) {
        self.dispatch_downstream(topic, packet).await;
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.connection.shutdown();
        self.downstream.shutdown();
        debug!("Hagrid service stopped");
    }
}

impl std::fmt::Debug for Hagrid {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Hagrid")
            .field("status", &self.status())
            .field("topics", &self.inner.topics.len())
            .field("listeners", &self.inner.listeners.len())
            .field("workers", &self.inner.downstream.worker_count())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use hagrid_error::{ErrorCode, PoolError};

    use super::*;
    use crate::{broker::InMemoryBroker, serdes::StringSerdes};

    async fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn config() -> HagridConfig {
        HagridConfig {
            max_subscribers: 2,
            poll_timeout_ms: 10,
            ..Default::default()
        }
    }

    /// Тест проверяет, что сервис не создаётся с нулевыми интервалами
    /// фоновых задач.
    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        for config in [
            HagridConfig {
                listener_cleanup_interval_secs: 0,
                ..config()
            },
            HagridConfig {
                idle_cleanup_interval_secs: 0,
                ..config()
            },
            HagridConfig {
                reconnect_delay_secs: 0,
                ..config()
            },
        ] {
            let err = Hagrid::new(config, InMemoryBroker::new().transport("svc")).unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::InvalidConfig);
            assert_eq!(err.contexts()[0].message, "Validating service configuration");
        }
    }

    /// Тест проверяет, что ответ на пакет без топика публикуется в топик,
    /// по которому пакет пришёл.
    #[tokio::test]
    async fn test_reply_goes_to_dispatch_topic() {
        let broker = InMemoryBroker::new();
        let hagrid = Hagrid::new(config(), broker.transport("svc")).unwrap();
        hagrid
            .register_topic("echo", Arc::new(StringSerdes), TopicProperties::default())
            .unwrap();
        hagrid
            .register_listener(
                Listener::builder("echo")
                    .downstream()
                    .handle_any(|_, response| {
                        response.set_payload("echo".to_string());
                        Ok(())
                    }),
            )
            .unwrap();
        hagrid.connect().await.unwrap();

        hagrid.receive("echo", Packet::new("")).await;
        assert_eq!(broker.publish_count(), 1);

        hagrid.disconnect().await;
    }

    /// Тест проверяет, что ошибка пула не оставляет топик в реестре.
    #[tokio::test]
    async fn test_register_topic_capacity() {
        let hagrid = Hagrid::new(config(), InMemoryBroker::new().transport("svc")).unwrap();

        hagrid
            .register_topic("a-*", Arc::new(StringSerdes), TopicProperties::dedicated())
            .unwrap();
        hagrid
            .register_topic("b-*", Arc::new(StringSerdes), TopicProperties::dedicated())
            .unwrap();
        let err = hagrid
            .register_topic("c-*", Arc::new(StringSerdes), TopicProperties::dedicated())
            .unwrap_err();

        assert_eq!(err.error_code(), ErrorCode::CapacityExceeded);
        assert!(err.downcast_ref::<PoolError>().is_some());
        assert!(hagrid.topic("c-x").is_none());
        assert_eq!(hagrid.topics().len(), 2);
        assert_eq!(hagrid.downstream().worker_count(), 2);

        // повторная регистрация заменяет топик, не занимая потребителя
        hagrid
            .register_topic("a-*", Arc::new(StringSerdes), TopicProperties::dedicated())
            .unwrap();
        assert_eq!(hagrid.topics().len(), 2);
        assert!(hagrid.topic("a-x").is_some());
    }

    #[tokio::test]
    async fn test_invalid_topic_pattern() {
        let hagrid = Hagrid::new(config(), InMemoryBroker::new().transport("svc")).unwrap();
        let err = hagrid
            .register_topic("Bad Topic", Arc::new(StringSerdes), TopicProperties::default())
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidPattern);
        assert_eq!(hagrid.downstream().worker_count(), 0);
    }

    /// Тест проверяет снятие топика с реестра и пула.
    #[tokio::test]
    async fn test_unregister_topic() {
        let hagrid = Hagrid::new(config(), InMemoryBroker::new().transport("svc")).unwrap();
        hagrid
            .register_topic("events-*", Arc::new(StringSerdes), TopicProperties::default())
            .unwrap();
        assert!(hagrid.downstream().get_subscriber("events-*").is_some());

        assert!(hagrid.unregister_topic("events-*").is_some());
        assert!(hagrid.topic("events-login").is_none());
        assert!(hagrid.downstream().get_subscriber("events-*").is_none());
        assert!(hagrid.unregister_topic("events-*").is_none());
    }

    /// Тест проверяет, что ответ на ответ не публикуется.
    #[tokio::test]
    async fn test_receive_does_not_reply_to_replies() {
        let broker = InMemoryBroker::new();
        let hagrid = Hagrid::new(config(), broker.transport("svc")).unwrap();
        hagrid
            .register_topic("echo", Arc::new(StringSerdes), TopicProperties::default())
            .unwrap();
        hagrid
            .register_listener(
                Listener::builder("echo")
                    .downstream()
                    .handle_any(|_, response| {
                        response.set_payload("echo".to_string());
                        Ok(())
                    }),
            )
            .unwrap();
        hagrid.connect().await.unwrap();

        let request = Packet::new("echo");
        hagrid.receive("echo", request.clone()).await;
        assert_eq!(broker.publish_count(), 1);

        let reply = Packet::reply_to(&request);
        hagrid.receive("echo", reply).await;
        assert_eq!(broker.publish_count(), 1);

        hagrid.disconnect().await;
    }

    #[tokio::test]
    async fn test_drop_stops_background_work() {
        let broker = InMemoryBroker::new();
        let hagrid = Hagrid::new(config(), broker.transport("svc")).unwrap();
        hagrid
            .register_topic("events-*", Arc::new(StringSerdes), TopicProperties::default())
            .unwrap();
        hagrid.connect().await.unwrap();
        assert_eq!(hagrid.status(), ConnectionStatus::Active);

        wait_for(|| broker.subscriber_count() == 1).await;

        drop(hagrid);
        wait_for(|| broker.subscriber_count() == 0).await;
        assert_eq!(broker.subscriber_count(), 0);
    }
}
