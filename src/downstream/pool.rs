use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use hagrid_error::PoolError;
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{PacketSink, Worker, WorkerCommand, WorkerContext};
use crate::{
    broker::Transport,
    topic::{Topic, TopicRegistry},
};

/// Пул потребителей с ограниченным числом параллельных опрашивающих задач.
///
/// Распределение топиков:
/// - нет ни одного потребителя или топик требует выделенного: новый
///   потребитель (ошибка, если достигнут максимум);
/// - иначе наименее загруженный потребитель без выделенного топика.
///
/// Назначения хранятся и без подключения: `connect()` поднимает задачи
/// заново, `disconnect()` их останавливает.
pub struct DownstreamPool {
    transport: Arc<dyn Transport>,
    ctx: WorkerContext,
    max_workers: usize,
    state: Mutex<PoolState>,
}

/// Снимок одного потребителя.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: usize,
    /// Шаблоны назначенных топиков в порядке назначения
    pub topics: Vec<String>,
    pub dedicated: bool,
    /// Запущена ли опрашивающая задача
    pub running: bool,
}

#[derive(Default)]
struct PoolState {
    /// Все назначенные топики в порядке регистрации
    assigned: Vec<Arc<Topic>>,
    workers: Vec<WorkerSlot>,
    next_id: usize,
    running: bool,
}

struct WorkerSlot {
    id: usize,
    topics: Vec<Arc<Topic>>,
    dedicated: bool,
    runner: Option<WorkerRunner>,
}

struct WorkerRunner {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    handle: JoinHandle<()>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl DownstreamPool {
    pub fn new(
        transport: Arc<dyn Transport>,
        topics: Arc<TopicRegistry>,
        sink: Weak<dyn PacketSink>,
        max_workers: usize,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            ctx: WorkerContext {
                topics,
                sink,
                poll_timeout,
            },
            max_workers,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Назначает топик потребителю.
    ///
    /// Повторное назначение того же шаблона заменяет топик на месте.
    pub fn add_to_subscriber(
        &self,
        topic: Arc<Topic>,
    ) -> Result<(), PoolError> {
        let mut state = self.state.lock();

        if let Some(existing) = state
            .assigned
            .iter_mut()
            .find(|t| t.name() == topic.name())
        {
            *existing = Arc::clone(&topic);
            for slot in &mut state.workers {
                for t in slot.topics.iter_mut().filter(|t| t.name() == topic.name()) {
                    *t = Arc::clone(&topic);
                }
            }
            return Ok(());
        }

        let id = self.allocate(&mut state, &topic)?;
        state.assigned.push(topic);
        debug!(worker = id, "Topic assigned to consumer worker");
        Ok(())
    }

    /// Снимает топик с потребителя; опустевший потребитель
    /// останавливается. Возвращает `false`, если топик не был назначен.
    pub fn remove_from_subscriber(
        &self,
        pattern: &str,
    ) -> bool {
        let mut state = self.state.lock();

        let Some(position) = state.assigned.iter().position(|t| t.name() == pattern) else {
            return false;
        };
        let topic = state.assigned.remove(position);

        let Some(index) = state
            .workers
            .iter()
            .position(|slot| slot.topics.iter().any(|t| t.name() == pattern))
        else {
            return true;
        };

        let slot = &mut state.workers[index];
        slot.topics.retain(|t| t.name() != pattern);

        if slot.topics.is_empty() {
            let slot = state.workers.remove(index);
            if let Some(runner) = slot.runner {
                let _ = runner.commands.send(WorkerCommand::Stop);
            }
            debug!(worker = slot.id, "Stopped empty consumer worker");
        } else if let Some(runner) = &slot.runner {
            let _ = runner
                .commands
                .send(WorkerCommand::Unsubscribe(topic.pattern().clone()));
        }
        true
    }

    /// Снимок потребителя, которому назначен топик.
    pub fn get_subscriber(
        &self,
        pattern: &str,
    ) -> Option<WorkerInfo> {
        let state = self.state.lock();
        state
            .workers
            .iter()
            .find(|slot| slot.topics.iter().any(|t| t.name() == pattern))
            .map(WorkerSlot::info)
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.state.lock().workers.iter().map(WorkerSlot::info).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Останавливает текущие задачи и заново распределяет все назначенные
    /// топики по новым потребителям.
    pub fn connect(&self) {
        let mut state = self.state.lock();

        for slot in state.workers.drain(..) {
            if let Some(runner) = slot.runner {
                let _ = runner.commands.send(WorkerCommand::Stop);
            }
        }
        state.running = true;

        let assigned = state.assigned.clone();
        for topic in &assigned {
            if let Err(e) = self.allocate(&mut state, topic) {
                warn!(topic = topic.name(), error = %e, "Failed to reassign topic");
            }
        }
        info!(workers = state.workers.len(), topics = assigned.len(), "Consumer pool started");
    }

    /// Останавливает все задачи и ждёт их завершения. Назначения
    /// сохраняются до следующего `connect()`.
    pub async fn disconnect(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state.running = false;
            state
                .workers
                .iter_mut()
                .filter_map(|slot| slot.runner.take())
                .map(|runner| {
                    let _ = runner.commands.send(WorkerCommand::Stop);
                    runner.handle
                })
                .collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Consumer worker ended abnormally");
            }
        }
        debug!("Consumer pool stopped");
    }

    /// Немедленно прерывает все задачи.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.running = false;
        for slot in &mut state.workers {
            if let Some(runner) = slot.runner.take() {
                runner.handle.abort();
            }
        }
    }

    /// Выбирает или создаёт потребителя для топика. Возвращает его id.
    fn allocate(
        &self,
        state: &mut PoolState,
        topic: &Arc<Topic>,
    ) -> Result<usize, PoolError> {
        let dedicated = topic.properties().dedicated_worker();

        let shared = if dedicated {
            None
        } else {
            state
                .workers
                .iter_mut()
                .filter(|slot| !slot.dedicated)
                .min_by_key(|slot| slot.topics.len())
        };

        if let Some(slot) = shared {
            slot.topics.push(Arc::clone(topic));
            if let Some(runner) = &slot.runner {
                let _ = runner
                    .commands
                    .send(WorkerCommand::Subscribe(topic.pattern().clone()));
            }
            return Ok(slot.id);
        }

        if state.workers.len() >= self.max_workers {
            return Err(PoolError::CapacityExceeded {
                max: self.max_workers,
            });
        }

        let id = state.next_id;
        state.next_id += 1;

        let mut slot = WorkerSlot {
            id,
            topics: vec![Arc::clone(topic)],
            dedicated,
            runner: None,
        };
        if state.running {
            slot.runner = Some(self.spawn_runner(&slot));
        }
        state.workers.push(slot);
        Ok(id)
    }

    fn spawn_runner(
        &self,
        slot: &WorkerSlot,
    ) -> WorkerRunner {
        let (commands, rx) = mpsc::unbounded_channel();
        let initial = slot.topics.iter().map(|t| t.pattern().clone()).collect();
        let worker = Worker::new(
            slot.id,
            self.transport.subscriber(),
            rx,
            initial,
            self.ctx.clone(),
        );
        WorkerRunner {
            commands,
            handle: tokio::spawn(worker.run()),
        }
    }
}

impl WorkerSlot {
    fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            topics: self.topics.iter().map(|t| t.name().to_string()).collect(),
            dedicated: self.dedicated,
            running: self
                .runner
                .as_ref()
                .is_some_and(|runner| !runner.handle.is_finished()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
