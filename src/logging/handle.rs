use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Счётчики жизненного цикла логирования.
#[derive(Debug, Default)]
pub struct LoggingMetrics {
    pub flush_count: AtomicU64,
    pub shutdown_in_progress: AtomicBool,
}

/// Владеет guard-ом файлового writer-а. Пока handle жив, фоновый поток
/// записи работает.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    pub metrics: Arc<LoggingMetrics>,
    flush_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingStats {
    pub flush_count: u64,
    pub shutdown_in_progress: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingMetrics {
    pub fn record_flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    fn start_shutdown(&self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
    }
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            metrics: Arc::new(LoggingMetrics::default()),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Отмечает запрос на сброс. Сам буфер сбрасывается при drop guard-а.
    pub fn flush(&self) {
        self.metrics.record_flush();
        tracing::debug!(
            flush_count = self.metrics.flush_count.load(Ordering::Relaxed),
            "Logging flush requested"
        );
    }

    /// Сбрасывает файловый буфер и завершает фоновый поток записи.
    pub fn shutdown(mut self) {
        self.metrics.start_shutdown();
        tracing::info!(
            timeout_secs = self.flush_timeout.as_secs(),
            "Initiating logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();

        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Асинхронный вариант [`shutdown`](Self::shutdown): guard сбрасывается
    /// в блокирующем потоке с ограничением по времени.
    pub async fn shutdown_async(
        mut self,
        timeout: Duration,
    ) {
        self.metrics.start_shutdown();
        let file_guard = self.file_guard.take();

        match tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || drop(file_guard)),
        )
        .await
        {
            Ok(Ok(())) => tracing::info!("Logging shutdown completed"),
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                timeout.as_millis()
            ),
        }
    }

    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            flush_count: self.metrics.flush_count.load(Ordering::Relaxed),
            shutdown_in_progress: self.metrics.is_shutdown_in_progress(),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.metrics.is_shutdown_in_progress() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_and_shutdown_stats() {
        let handle = LoggingHandle::new(None).with_flush_timeout(Duration::from_secs(1));
        assert!(!handle.has_file_sink());

        handle.flush();
        handle.flush();
        let metrics = handle.metrics.clone();
        assert_eq!(handle.stats().flush_count, 2);
        assert!(!handle.stats().shutdown_in_progress);

        handle.shutdown();
        assert!(metrics.is_shutdown_in_progress());
    }

    /// Тест проверяет асинхронное завершение с файловым guard-ом.
    #[tokio::test]
    async fn test_shutdown_async_with_guard() {
        let dir = tempfile::tempdir().unwrap();
        let appender = tracing_appender::rolling::never(dir.path(), "guard.log");
        let (_writer, guard) = tracing_appender::non_blocking(appender);

        let handle = LoggingHandle::new(Some(guard));
        assert!(handle.has_file_sink());
        let metrics = handle.metrics.clone();

        handle.shutdown_async(Duration::from_secs(1)).await;
        assert!(metrics.is_shutdown_in_progress());
    }
}
