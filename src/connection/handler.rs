use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use hagrid_error::{BrokerError, ConnectionError};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use super::{ConnectionState, ConnectionStatus};

/// То, что умеет открывать и закрывать пути отправки и приёма.
#[async_trait]
pub trait Connectible: Send + Sync {
    /// Открывает клиентов отправки и приёма.
    async fn open_paths(&self) -> Result<(), BrokerError>;

    /// Закрывает оба пути. Повторный вызов безопасен.
    async fn close_paths(&self);

    /// Проверка доступности брокера на уровне протокола.
    async fn check_connection(&self) -> Result<(), BrokerError>;
}

/// Машина состояний соединения: `IDLE → ACTIVE ⇄ INACTIVE`.
///
/// Все чтения и записи статуса идут под одним мьютексом. При фатальной
/// ошибке запускается единственный цикл переподключения, который пытается
/// `close_paths(); open_paths()` с заданной задержкой, пока статус остаётся
/// `INACTIVE`.
///
/// Клонирование дешёвое: клоны разделяют одно состояние.
#[derive(Clone)]
pub struct ConnectionHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    target: Weak<dyn Connectible>,
    state: Mutex<ConnectionState>,
    reconnect: Mutex<Option<ReconnectTask>>,
    reconnect_delay: Duration,
}

struct ReconnectTask {
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectionHandler {
    pub fn new(
        target: Weak<dyn Connectible>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                target,
                state: Mutex::new(ConnectionState::default()),
                reconnect: Mutex::new(None),
                reconnect_delay,
            }),
        }
    }

    /// Открывает оба пути и проверяет связь.
    ///
    /// Ошибка сначала проходит через [`handle_error`](Self::handle_error),
    /// затем возвращается вызывающему.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let target = self.target()?;

        if let Err(e) = target.open_paths().await {
            self.handle_error(&e);
            return Err(ConnectionError::ConnectFailed {
                reason: e.to_string(),
            });
        }

        match target.check_connection().await {
            Ok(()) => {
                self.handle_success();
                Ok(())
            }
            Err(e) => {
                self.handle_error(&e);
                Err(ConnectionError::LivenessCheckFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Закрывает оба пути, останавливает переподключение и безусловно
    /// переводит статус в `INACTIVE`.
    pub async fn disconnect(&self) {
        // Ошибка отправки во время закрытия не должна запустить новый цикл.
        self.set_status(ConnectionStatus::Inactive);
        self.stop_reconnect(true);
        if let Some(target) = self.inner.target.upgrade() {
            target.close_paths().await;
        }
        self.set_status(ConnectionStatus::Inactive);
        info!("Disconnected from broker");
    }

    /// `close_paths(); connect()` без смены статуса.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        if let Some(target) = self.inner.target.upgrade() {
            target.close_paths().await;
        }
        self.connect().await
    }

    /// Обрабатывает ошибку брокера.
    ///
    /// Нефатальные ошибки (отмена, отказ принять запись) игнорируются.
    /// Фатальная ошибка переводит соединение в `INACTIVE` и запускает цикл
    /// переподключения, если он ещё не запущен. Если статус уже `INACTIVE`,
    /// ничего не происходит.
    pub fn handle_error(
        &self,
        error: &BrokerError,
    ) {
        if !error.is_fatal() {
            debug!(error = %error, "Ignoring non-fatal broker error");
            return;
        }

        let changed = self.inner.state.lock().mark_failure(Instant::now());
        if !changed {
            return;
        }

        warn!(error = %error, "Connection to broker lost");
        self.start_reconnect();
    }

    /// Сбрасывает счётчик попыток, переводит в `ACTIVE` и останавливает
    /// цикл переподключения.
    pub fn handle_success(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = state.status;
            state.mark_success(Instant::now());
            previous
        };

        if previous != ConnectionStatus::Active {
            info!(from = %previous, "Connection to broker is active");
        }
        self.stop_reconnect(false);
    }

    /// Явная смена статуса. Сбрасывает счётчик попыток.
    pub fn set_status(
        &self,
        status: ConnectionStatus,
    ) {
        self.inner.state.lock().set_status(status);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == ConnectionStatus::Active
    }

    /// Снимок состояния под блокировкой.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn retries(&self) -> u32 {
        self.inner.state.lock().retries
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.inner.state.lock().last_success
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.inner.state.lock().last_failure
    }

    /// Работает ли сейчас цикл переподключения.
    pub fn is_reconnecting(&self) -> bool {
        self.inner
            .reconnect
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Останавливает цикл переподключения без смены статуса.
    pub(crate) fn shutdown(&self) {
        self.stop_reconnect(true);
    }

    fn target(&self) -> Result<Arc<dyn Connectible>, ConnectionError> {
        self.inner
            .target
            .upgrade()
            .ok_or_else(|| ConnectionError::ConnectFailed {
                reason: "service has been shut down".to_string(),
            })
    }

    fn start_reconnect(&self) {
        let mut slot = self.inner.reconnect.lock();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return;
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let handler = self.clone();
        let flag = Arc::clone(&stopped);
        let handle = tokio::spawn(async move { handler.run_reconnect(flag).await });

        *slot = Some(ReconnectTask { stopped, handle });
    }

    /// `abort` прерывает задачу немедленно; без него цикл завершится сам,
    /// что безопасно при вызове из самого цикла.
    fn stop_reconnect(
        &self,
        abort: bool,
    ) {
        if let Some(task) = self.inner.reconnect.lock().take() {
            task.stopped.store(true, Ordering::SeqCst);
            if abort {
                task.handle.abort();
            }
        }
    }

    async fn run_reconnect(
        self,
        stopped: Arc<AtomicBool>,
    ) {
        let delay = self.inner.reconnect_delay;

        loop {
            if stopped.load(Ordering::SeqCst) || self.inner.target.strong_count() == 0 {
                break;
            }

            let attempt = {
                let mut state = self.inner.state.lock();
                if state.status != ConnectionStatus::Inactive {
                    break;
                }
                state.retries += 1;
                state.retries
            };

            match self.reconnect().await {
                Ok(()) => {
                    info!(attempt, "Reconnected to broker");
                    break;
                }
                Err(e) => debug!(attempt, error = %e, "Reconnect attempt failed"),
            }

            if stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(delay).await;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    const DELAY: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct FakeTarget {
        offline: AtomicBool,
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl FakeTarget {
        fn result(&self) -> Result<(), BrokerError> {
            if self.offline.load(Ordering::SeqCst) {
                Err(BrokerError::Unavailable {
                    reason: "down".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Connectible for FakeTarget {
        async fn open_paths(&self) -> Result<(), BrokerError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.result()
        }

        async fn close_paths(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        async fn check_connection(&self) -> Result<(), BrokerError> {
            self.result()
        }
    }

    fn setup() -> (Arc<FakeTarget>, ConnectionHandler) {
        let target = Arc::new(FakeTarget::default());
        let weak: Weak<dyn Connectible> = Arc::downgrade(&target) as Weak<dyn Connectible>;
        (target, ConnectionHandler::new(weak, DELAY))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Тест проверяет успешное подключение из `IDLE`.
    #[tokio::test]
    async fn test_connect_success() {
        let (target, handler) = setup();
        assert_eq!(handler.status(), ConnectionStatus::Idle);

        handler.connect().await.unwrap();

        assert!(handler.is_active());
        assert_eq!(handler.retries(), 0);
        assert!(handler.last_success().is_some());
        assert_eq!(target.opens.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет полный цикл: потеря связи, переподключение с
    /// задержкой и возврат в `ACTIVE` со сброшенным счётчиком.
    #[tokio::test]
    async fn test_reconnect_cycle() {
        tokio::time::pause();
        let (target, handler) = setup();
        handler.connect().await.unwrap();

        target.offline.store(true, Ordering::SeqCst);
        handler.handle_error(&BrokerError::Timeout);

        assert_eq!(handler.status(), ConnectionStatus::Inactive);
        assert!(handler.last_failure().is_some());
        assert!(handler.is_reconnecting());

        settle().await;
        assert_eq!(handler.retries(), 1);
        assert_eq!(target.opens.load(Ordering::SeqCst), 2);

        target.offline.store(false, Ordering::SeqCst);
        tokio::time::advance(DELAY).await;
        settle().await;

        assert_eq!(handler.status(), ConnectionStatus::Active);
        assert_eq!(handler.retries(), 0);
        assert!(!handler.is_reconnecting());
        assert_eq!(target.opens.load(Ordering::SeqCst), 3);
    }

    /// Тест проверяет, что неудачный `connect()` возвращает ошибку и
    /// запускает переподключение.
    #[tokio::test]
    async fn test_connect_failure_starts_reconnect() {
        tokio::time::pause();
        let (target, handler) = setup();
        target.offline.store(true, Ordering::SeqCst);

        let err = handler.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectFailed { .. }));
        assert_eq!(handler.status(), ConnectionStatus::Inactive);
        assert!(handler.is_reconnecting());

        handler.shutdown();
        assert!(!handler.is_reconnecting());
    }

    /// Тест проверяет, что нефатальные ошибки не меняют статус.
    #[tokio::test]
    async fn test_non_fatal_error_ignored() {
        let (_target, handler) = setup();
        handler.connect().await.unwrap();

        handler.handle_error(&BrokerError::Cancelled);
        handler.handle_error(&BrokerError::Rejected {
            reason: "too large".to_string(),
        });

        assert!(handler.is_active());
        assert!(handler.last_failure().is_none());
        assert!(!handler.is_reconnecting());
    }

    /// Тест проверяет, что повторные фатальные ошибки не запускают второй
    /// цикл переподключения.
    #[tokio::test]
    async fn test_repeated_errors_single_loop() {
        tokio::time::pause();
        let (target, handler) = setup();
        handler.connect().await.unwrap();
        target.offline.store(true, Ordering::SeqCst);

        handler.handle_error(&BrokerError::Timeout);
        handler.handle_error(&BrokerError::Timeout);
        handler.handle_error(&BrokerError::Timeout);
        settle().await;

        // одна попытка от одного цикла
        assert_eq!(target.opens.load(Ordering::SeqCst), 2);
        assert_eq!(handler.retries(), 1);

        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(target.opens.load(Ordering::SeqCst), 3);
        assert_eq!(handler.retries(), 2);

        handler.shutdown();
    }

    /// Закрытие путей сообщает о фатальной ошибке, как неудачная отправка,
    /// совпавшая по времени с `disconnect()`.
    struct FailingOnClose {
        handler: Mutex<Option<ConnectionHandler>>,
    }

    #[async_trait]
    impl Connectible for FailingOnClose {
        async fn open_paths(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn close_paths(&self) {
            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler.handle_error(&BrokerError::Unavailable {
                    reason: "publish during shutdown".to_string(),
                });
            }
        }

        async fn check_connection(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    /// Тест проверяет, что фатальная ошибка во время `disconnect()` не
    /// запускает переподключение после внешнего отключения.
    #[tokio::test]
    async fn test_error_during_disconnect_does_not_reconnect() {
        tokio::time::pause();
        let target = Arc::new(FailingOnClose {
            handler: Mutex::new(None),
        });
        let weak: Weak<dyn Connectible> = Arc::downgrade(&target) as Weak<dyn Connectible>;
        let handler = ConnectionHandler::new(weak, DELAY);
        handler.connect().await.unwrap();
        *target.handler.lock() = Some(handler.clone());

        handler.disconnect().await;

        assert_eq!(handler.status(), ConnectionStatus::Inactive);
        assert!(handler.last_failure().is_none());
        assert!(!handler.is_reconnecting());

        tokio::time::advance(DELAY * 2).await;
        settle().await;
        assert_eq!(handler.status(), ConnectionStatus::Inactive);

        target.handler.lock().take();
    }

    /// Тест проверяет, что `disconnect()` останавливает цикл и оставляет
    /// `INACTIVE` со сброшенным счётчиком.
    #[tokio::test]
    async fn test_disconnect_stops_reconnect() {
        tokio::time::pause();
        let (target, handler) = setup();
        handler.connect().await.unwrap();
        target.offline.store(true, Ordering::SeqCst);
        handler.handle_error(&BrokerError::Timeout);
        settle().await;

        handler.disconnect().await;
        assert_eq!(handler.status(), ConnectionStatus::Inactive);
        assert_eq!(handler.retries(), 0);
        assert!(!handler.is_reconnecting());

        let opens = target.opens.load(Ordering::SeqCst);
        target.offline.store(false, Ordering::SeqCst);
        tokio::time::advance(DELAY * 3).await;
        settle().await;

        assert_eq!(target.opens.load(Ordering::SeqCst), opens);
        assert_eq!(handler.status(), ConnectionStatus::Inactive);
    }

    /// Тест проверяет, что цикл завершается, когда цель удалена.
    #[tokio::test]
    async fn test_loop_exits_when_target_dropped() {
        tokio::time::pause();
        let (target, handler) = setup();
        handler.connect().await.unwrap();
        target.offline.store(true, Ordering::SeqCst);
        handler.handle_error(&BrokerError::Timeout);
        settle().await;

        drop(target);
        tokio::time::advance(DELAY).await;
        settle().await;

        assert!(!handler.is_reconnecting());
        assert!(handler.connect().await.is_err());
    }
}
