use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{interval, Instant},
};

use crate::packet::Packet;

/// Отправленный пакет и время отправки.
#[derive(Debug, Clone)]
pub struct IdlePacket {
    pub packet: Packet,
    pub sent_at: Instant,
}

/// Набор отправленных пакетов, ещё не вышедших за окно хранения.
#[derive(Debug)]
pub struct IdleTracker {
    packets: DashMap<String, IdlePacket>,
    retention: Duration,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl IdleTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            packets: DashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Запоминает пакет с текущим временем.
    pub fn track(
        &self,
        packet: Packet,
    ) {
        self.packets.insert(
            packet.id().to_string(),
            IdlePacket {
                packet,
                sent_at: Instant::now(),
            },
        );
    }

    /// Отслеживается ли пакет. Запись старше окна хранения не считается,
    /// даже если очистка до неё ещё не дошла.
    pub fn is_idling(
        &self,
        packet_id: &str,
    ) -> bool {
        self.packets
            .get(packet_id)
            .is_some_and(|entry| entry.sent_at.elapsed() < self.retention)
    }

    pub fn get(
        &self,
        packet_id: &str,
    ) -> Option<IdlePacket> {
        self.packets.get(packet_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Удаляет записи, чей возраст достиг окна хранения. Возвращает число
    /// удалённых.
    pub fn purge_expired(
        &self,
        now: Instant,
    ) -> usize {
        let before = self.packets.len();
        self.packets
            .retain(|_, entry| now.saturating_duration_since(entry.sent_at) < self.retention);
        before.saturating_sub(self.packets.len())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Запускает фоновую очистку набора отправленных пакетов.
pub fn spawn_idle_cleanup(
    tracker: Arc<IdleTracker>,
    cleanup_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(cleanup_interval);

        loop {
            ticker.tick().await;

            let purged = tracker.purge_expired(Instant::now());
            if purged > 0 {
                tracing::debug!("Purged {} idling packets", purged);
            }
        }
    })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const RETENTION: Duration = Duration::from_secs(30);

    /// Тест проверяет, что пакет отслеживается сразу после записи и
    /// перестаёт после окна хранения.
    #[tokio::test]
    async fn test_idling_window() {
        tokio::time::pause();
        let tracker = IdleTracker::new(RETENTION);
        let packet = Packet::new("events-login");
        let id = packet.id().to_string();

        tracker.track(packet);
        assert!(tracker.is_idling(&id));
        assert!(!tracker.is_idling("unknown"));

        tokio::time::advance(RETENTION - Duration::from_secs(1)).await;
        assert!(tracker.is_idling(&id));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.is_idling(&id));
        // запись ещё лежит, пока её не удалит очистка
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        tokio::time::pause();
        let tracker = IdleTracker::new(RETENTION);
        tracker.track(Packet::new("a"));

        tokio::time::advance(Duration::from_secs(10)).await;
        let fresh = Packet::new("b");
        let fresh_id = fresh.id().to_string();
        tracker.track(fresh);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(tracker.purge_expired(Instant::now()), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&fresh_id).is_some());
    }

    /// Тест проверяет, что фоновая задача удаляет устаревшие записи.
    #[tokio::test]
    async fn test_cleanup_task() {
        tokio::time::pause();
        let tracker = Arc::new(IdleTracker::new(RETENTION));
        tracker.track(Packet::new("a"));

        let handle = spawn_idle_cleanup(Arc::clone(&tracker), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(25)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tracker.len(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(tracker.is_empty());

        handle.abort();
    }
}
