use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use hagrid_error::ListenerError;
use parking_lot::Mutex;
use tokio::{sync::oneshot, time::Instant};

use super::{Delivery, Direction, Listener, Priority, Response};
use crate::{
    packet::{Packet, PayloadType, Status},
    topic::TopicPattern,
};

/// Идентификатор зарегистрированного слушателя.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Слушатель в реестре: скомпилированный шаблон и время регистрации.
pub struct RegisteredListener {
    id: ListenerId,
    matcher: TopicPattern,
    listener: Listener,
    registered_at: Instant,
}

/// Реестр слушателей и движок диспетчеризации.
///
/// Слушатели с корреляцией удаляются тем же кодом, который их вызывает,
/// через атомарное `remove`: срабатывание по ответу и по таймауту взаимно
/// исключают друг друга.
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Arc<RegisteredListener>>,
    next_id: AtomicU64,
}

/// Ожидание ответа на конкретный пакет.
///
/// Разрешается ответом или синтетическим пакетом со статусом `TIMEOUT`.
pub struct CorrelatedReply {
    id: ListenerId,
    request_id: String,
    rx: oneshot::Receiver<Packet>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RegisteredListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    pub fn is_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.listener
            .timeout
            .is_some_and(|timeout| now >= self.registered_at + timeout)
    }

    /// Вызывает обработчик, перехватывая ошибки и панику.
    fn invoke(
        &self,
        topic: &str,
        direction: Direction,
        packet: &Packet,
        response: &mut Response,
    ) -> Result<(), ListenerError> {
        let delivery = Delivery::new(topic, direction, packet, self.listener.filter);
        let handler = &self.listener.handler;

        match catch_unwind(AssertUnwindSafe(|| handler(&delivery, response))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ListenerError::Execution {
                topic: topic.to_string(),
                message: err.root_cause().to_string(),
            }),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ListenerError::Panicked {
                    topic: topic.to_string(),
                    message,
                })
            }
        }
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Проверяет шаблон и регистрирует слушателя с текущим временем.
    pub fn register(
        &self,
        listener: Listener,
    ) -> Result<ListenerId, ListenerError> {
        let matcher = TopicPattern::parse(&listener.pattern).map_err(|e| {
            ListenerError::InvalidPattern {
                pattern: listener.pattern.clone(),
                reason: e.to_string(),
            }
        })?;

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            listener = id.0,
            pattern = %matcher,
            priority = listener.priority,
            correlation_id = listener.correlation_id.as_deref().unwrap_or(""),
            "Listener registered"
        );

        self.listeners.insert(
            id,
            Arc::new(RegisteredListener {
                id,
                matcher,
                listener,
                registered_at: Instant::now(),
            }),
        );
        Ok(id)
    }

    /// Удаляет слушателя. Возвращает `true`, если он был в реестре.
    pub fn unregister(
        &self,
        id: ListenerId,
    ) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Удаляет всех слушателей с указанным шаблоном.
    pub fn unregister_pattern(
        &self,
        pattern: &str,
    ) -> usize {
        let before = self.listeners.len();
        self.listeners
            .retain(|_, entry| entry.listener.pattern != pattern);
        before.saturating_sub(self.listeners.len())
    }

    pub fn contains(
        &self,
        id: ListenerId,
    ) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Все слушатели, чей шаблон принимает `topic` и чей фильтр совместим с
    /// типом нагрузки.
    pub fn get_listener(
        &self,
        topic: &str,
        payload: Option<PayloadType>,
    ) -> Vec<Arc<RegisteredListener>> {
        self.listeners
            .iter()
            .filter(|entry| entry.matcher.matches(topic))
            .filter(|entry| {
                let correlated = entry.listener.correlation_id.is_some();
                entry.listener.filter.accepts(payload, correlated)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn has_listener(
        &self,
        topic: &str,
        payload: Option<PayloadType>,
    ) -> bool {
        !self.get_listener(topic, payload).is_empty()
    }

    /// Вызывает подходящих слушателей в порядке приоритета.
    ///
    /// Возвращает ответные пакеты, которые нужно опубликовать: ответы,
    /// заполненные слушателями, и ответы `INTERNAL` от отзывчивых слушателей,
    /// завершившихся ошибкой.
    pub fn execute_listeners(
        &self,
        topic: &str,
        direction: Direction,
        packet: &Packet,
    ) -> Vec<Packet> {
        let mut candidates = self.get_listener(topic, packet.payload().map(|p| p.payload_type()));
        candidates.sort_by_key(|entry| (entry.listener.priority, entry.id));

        let mut replies = Vec::new();

        for entry in candidates {
            if !entry.listener.wants(direction, packet) {
                continue;
            }
            if entry.listener.correlation_id.is_some() && !self.unregister(entry.id) {
                // Уже сработал или истёк.
                continue;
            }

            let mut response = Response::new();
            match entry.invoke(topic, direction, packet, &mut response) {
                Ok(()) => {
                    if let Some(reply) = response.into_reply(packet) {
                        replies.push(reply);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        listener = entry.id.0,
                        topic,
                        ?direction,
                        error = %err,
                        "Listener execution failed"
                    );
                    if entry.listener.responsive {
                        let message = match &err {
                            ListenerError::Execution { message, .. }
                            | ListenerError::Panicked { message, .. } => message.clone(),
                            other => other.to_string(),
                        };
                        replies.push(
                            Packet::reply_to(packet).with_status(Status::internal(message)),
                        );
                    }
                }
            }
        }

        replies
    }

    /// Удаляет слушателей с истёкшим таймаутом и вызывает каждого один раз
    /// с пакетом `TIMEOUT` без нагрузки. Возвращает число сработавших.
    pub fn sweep_expired(
        &self,
        now: Instant,
    ) -> usize {
        let expired: Vec<Arc<RegisteredListener>> = self
            .listeners
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut fired = 0;
        for entry in expired {
            if !self.unregister(entry.id) {
                continue;
            }
            fired += 1;

            let packet = Packet::new(entry.matcher.as_str())
                .with_request_id(entry.listener.correlation_id.clone().unwrap_or_default())
                .with_status(Status::timeout());
            let direction = entry.listener.direction.unwrap_or(Direction::Downstream);

            let mut response = Response::new();
            if let Err(err) = entry.invoke(entry.matcher.as_str(), direction, &packet, &mut response)
            {
                tracing::warn!(listener = entry.id.0, error = %err, "Timeout handler failed");
            }
            tracing::debug!(
                listener = entry.id.0,
                pattern = %entry.matcher,
                "Listener timed out"
            );
        }
        fired
    }

    /// Регистрирует одноразового слушателя ответа на `request_id`.
    ///
    /// `None` в `timeout` означает бесконечное ожидание.
    pub fn await_correlated(
        &self,
        topic: &str,
        request_id: &str,
        timeout: Option<Duration>,
    ) -> Result<CorrelatedReply, ListenerError> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let mut builder = Listener::builder(topic)
            .downstream()
            .priority(Priority::HIGHEST)
            .listens_to(request_id);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let listener = builder.handle_any(move |delivery, _| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(delivery.packet().clone());
            }
            Ok(())
        });

        let id = self.register(listener)?;
        Ok(CorrelatedReply {
            id,
            request_id: request_id.to_string(),
            rx,
        })
    }
}

impl CorrelatedReply {
    pub fn listener_id(&self) -> ListenerId {
        self.id
    }

    /// Ждёт ответ или пакет `TIMEOUT`.
    ///
    /// Ошибка возвращается, только если слушатель удалили без срабатывания.
    pub async fn wait(self) -> Result<Packet, ListenerError> {
        self.rx.await.map_err(|_| ListenerError::Abandoned {
            request_id: self.request_id,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::packet::{Payload, StatusCode};

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(&Delivery<'_>, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_: &Delivery<'_>, _: &mut Response| {
            log.lock().push(name);
            Ok(())
        }
    }

    /// Тест проверяет отказ для некорректного шаблона.
    #[test]
    fn test_register_invalid_pattern() {
        let registry = ListenerRegistry::new();
        let err = registry
            .register(Listener::builder("*-x").handle_any(|_, _| Ok(())))
            .unwrap_err();
        assert!(matches!(err, ListenerError::InvalidPattern { .. }));
        assert!(registry.is_empty());
    }

    /// Тест проверяет, что приоритет 0 срабатывает раньше 10 независимо от
    /// порядка регистрации.
    #[test]
    fn test_priority_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                Listener::builder("jobs")
                    .priority(10)
                    .handle_any(recorder(&log, "low")),
            )
            .unwrap();
        registry
            .register(
                Listener::builder("jobs")
                    .priority(0)
                    .handle_any(recorder(&log, "high")),
            )
            .unwrap();

        registry.execute_listeners("jobs", Direction::Downstream, &Packet::new("jobs"));
        assert_eq!(*log.lock(), ["high", "low"]);
    }

    /// Тест проверяет пропуск слушателей другого направления.
    #[test]
    fn test_direction_filter() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                Listener::builder("jobs")
                    .upstream()
                    .handle_any(recorder(&log, "up")),
            )
            .unwrap();
        registry
            .register(
                Listener::builder("jobs")
                    .downstream()
                    .handle_any(recorder(&log, "down")),
            )
            .unwrap();
        registry
            .register(Listener::builder("jobs").handle_any(recorder(&log, "both")))
            .unwrap();

        registry.execute_listeners("jobs", Direction::Upstream, &Packet::new("jobs"));
        let mut seen = log.lock().clone();
        seen.sort();
        assert_eq!(seen, ["both", "up"]);
    }

    /// Тест проверяет фильтр по типу нагрузки.
    #[test]
    fn test_payload_type_filter() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        registry
            .register(
                Listener::builder("jobs").handle::<String, _>(move |payload, _, _| {
                    assert!(payload.is_some());
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let string_packet = Packet::new("jobs").with_payload(Payload::new("x".to_string()));
        let number_packet = Packet::new("jobs").with_payload(Payload::new(1u32));
        let empty_packet = Packet::new("jobs");

        registry.execute_listeners("jobs", Direction::Downstream, &string_packet);
        registry.execute_listeners("jobs", Direction::Downstream, &number_packet);
        registry.execute_listeners("jobs", Direction::Downstream, &empty_packet);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.has_listener("jobs", Some(PayloadType::of::<String>())));
        assert!(!registry.has_listener("jobs", None));
    }

    /// Тест проверяет, что коррелированный слушатель срабатывает ровно один
    /// раз.
    #[test]
    fn test_correlated_fires_once() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let request = Packet::new("ping");

        let counter = Arc::clone(&hits);
        let id = registry
            .register(
                Listener::builder("ping")
                    .listens_to(request.id())
                    .handle_any(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
            )
            .unwrap();

        // Сам запрос не является ответом.
        registry.execute_listeners("ping", Direction::Downstream, &request);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(registry.contains(id));

        let reply = Packet::reply_to(&request);
        registry.execute_listeners("ping", Direction::Downstream, &reply);
        registry.execute_listeners("ping", Direction::Downstream, &reply);
        registry.execute_listeners("ping", Direction::Downstream, &Packet::reply_to(&request));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(id));
    }

    /// Тест проверяет автоответ из заполненного `Response`.
    #[test]
    fn test_auto_reply() {
        let registry = ListenerRegistry::new();
        registry
            .register(
                Listener::builder("ping").handle::<String, _>(|payload, _, response| {
                    let name = payload.cloned().unwrap_or_default();
                    response.set_payload(format!("pong {name}"));
                    Ok(())
                }),
            )
            .unwrap();

        let request = Packet::new("ping").with_payload(Payload::new("anton".to_string()));
        let replies = registry.execute_listeners("ping", Direction::Downstream, &request);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].request_id(), request.id());
        assert_eq!(replies[0].topic(), "ping");
        assert_eq!(replies[0].status().code, StatusCode::Ok);
        assert_eq!(replies[0].payload_as::<String>().unwrap(), "pong anton");
    }

    /// Тест проверяет ответ INTERNAL от отзывчивого слушателя и молчание
    /// обычного.
    #[test]
    fn test_responsive_error_reply() {
        let registry = ListenerRegistry::new();
        registry
            .register(
                Listener::builder("jobs")
                    .responsive(true)
                    .handle_any(|_, _| Err(anyhow::anyhow!("disk full"))),
            )
            .unwrap();
        registry
            .register(
                Listener::builder("jobs")
                    .handle_any(|_, _| Err(anyhow::anyhow!("ignored"))),
            )
            .unwrap();

        let request = Packet::new("jobs");
        let replies = registry.execute_listeners("jobs", Direction::Downstream, &request);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status().code, StatusCode::Internal);
        assert_eq!(replies[0].status().message, "disk full");
        assert_eq!(replies[0].request_id(), request.id());
    }

    /// Тест проверяет, что паника в обработчике не прерывает диспетчеризацию.
    #[test]
    fn test_panic_is_contained() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                Listener::builder("jobs")
                    .priority(Priority::HIGHEST)
                    .responsive(true)
                    .handle_any(|_, _| panic!("bad listener")),
            )
            .unwrap();
        registry
            .register(
                Listener::builder("jobs")
                    .priority(Priority::LOWEST)
                    .handle_any(recorder(&log, "after")),
            )
            .unwrap();

        let replies = registry.execute_listeners("jobs", Direction::Downstream, &Packet::new("jobs"));

        assert_eq!(*log.lock(), ["after"]);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status().message, "bad listener");
    }

    /// Тест проверяет таймаут: срабатывание не раньше срока, один раз, со
    /// статусом TIMEOUT и удалением из реестра.
    #[tokio::test]
    async fn test_timeout_fires_once() {
        tokio::time::pause();

        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = registry
            .register(
                Listener::builder("ping")
                    .listens_to("req-1")
                    .timeout(Duration::from_secs(1))
                    .handle_any(move |delivery, _| {
                        sink.lock().push((
                            delivery.packet().status().code,
                            delivery.packet().payload().is_none(),
                            delivery.packet().request_id().to_string(),
                        ));
                        Ok(())
                    }),
            )
            .unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(registry.sweep_expired(Instant::now()), 0);
        assert!(registry.contains(id));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(registry.sweep_expired(Instant::now()), 1);
        assert_eq!(registry.sweep_expired(Instant::now()), 0);
        assert!(!registry.contains(id));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (StatusCode::Timeout, true, "req-1".to_string()));
    }

    /// Тест проверяет, что слушатель без таймаута не истекает.
    #[tokio::test]
    async fn test_no_timeout_never_expires() {
        tokio::time::pause();

        let registry = ListenerRegistry::new();
        let id = registry
            .register(Listener::builder("ping").handle_any(|_, _| Ok(())))
            .unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(registry.sweep_expired(Instant::now()), 0);
        assert!(registry.contains(id));
    }

    /// Тест проверяет ожидание ответа через `await_correlated`.
    #[tokio::test]
    async fn test_await_correlated_reply() {
        let registry = ListenerRegistry::new();
        let request = Packet::new("ping");

        let waiter = registry
            .await_correlated("ping", request.id(), Some(Duration::from_secs(5)))
            .unwrap();

        let reply = Packet::reply_to(&request).with_payload(Payload::new("pong".to_string()));
        registry.execute_listeners("ping", Direction::Downstream, &reply);

        let got = waiter.wait().await.unwrap();
        assert_eq!(got.id(), reply.id());
        assert_eq!(got.payload_as::<String>().unwrap(), "pong");
        assert!(registry.is_empty());
    }

    /// Тест проверяет, что ожидание завершается пакетом TIMEOUT.
    #[tokio::test]
    async fn test_await_correlated_timeout() {
        tokio::time::pause();

        let registry = ListenerRegistry::new();
        let waiter = registry
            .await_correlated("ping", "req-9", Some(Duration::from_secs(2)))
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        registry.sweep_expired(Instant::now());

        let got = waiter.wait().await.unwrap();
        assert_eq!(got.status().code, StatusCode::Timeout);
        assert_eq!(got.request_id(), "req-9");
    }

    /// Тест проверяет ошибку ожидания после ручного удаления слушателя.
    #[tokio::test]
    async fn test_await_correlated_abandoned() {
        let registry = ListenerRegistry::new();
        let waiter = registry.await_correlated("ping", "req-3", None).unwrap();

        assert!(registry.unregister(waiter.listener_id()));
        let err = waiter.wait().await.unwrap_err();
        assert!(matches!(err, ListenerError::Abandoned { .. }));
    }

    #[test]
    fn test_unregister_pattern() {
        let registry = ListenerRegistry::new();
        registry
            .register(Listener::builder("a").handle_any(|_, _| Ok(())))
            .unwrap();
        registry
            .register(Listener::builder("a").handle_any(|_, _| Ok(())))
            .unwrap();
        registry
            .register(Listener::builder("b").handle_any(|_, _| Ok(())))
            .unwrap();

        assert_eq!(registry.unregister_pattern("a"), 2);
        assert_eq!(registry.len(), 1);
    }
}
