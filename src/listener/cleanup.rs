use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval, Instant},
};

use super::ListenerRegistry;

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Запускает фоновую задачу, которая периодически снимает слушателей с
/// истёкшим таймаутом и доставляет им пакет `TIMEOUT`.
///
/// Возвращает `JoinHandle`, который можно использовать для отмены задачи.
pub fn spawn_timeout_sweeper(
    registry: Arc<ListenerRegistry>,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);

        loop {
            ticker.tick().await;

            let fired = registry.sweep_expired(Instant::now());
            if fired > 0 {
                tracing::debug!("Timed out {} listeners", fired);
            }
        }
    })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
