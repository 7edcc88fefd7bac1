use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{registry::LookupSpan, Layer};

use crate::logging::{
    formatter::{build_formatter, FormatOptions},
    LoggingConfig,
};

/// Слой записи в `logging.file.dir` с ежедневной ротацией.
///
/// Запись идёт через неблокирующий writer; возвращённый guard нужно держать
/// до завершения работы, иначе хвост буфера теряется.
pub fn layer_with_config<S>(config: &LoggingConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = rolling::daily(&config.file.dir, &config.file.filename);
    let (writer, guard) = non_blocking(appender);

    let options = FormatOptions {
        with_ansi: false,
        ..FormatOptions::from(&config.console)
    };
    let layer = build_formatter(config.file.format, writer, options);

    (layer, guard)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что после сброса guard событие оказывается в файле.
    #[test]
    fn test_file_layer_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LoggingConfig::default();
        config.file.enabled = true;
        config.file.dir = dir.path().to_path_buf();
        config.file.filename = "test.log".to_string();

        let (layer, guard) = layer_with_config::<Registry>(&config);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(topic = "orders", "written to file");
        });
        drop(guard);

        let contents: String = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("test.log"))
            .map(|e| fs::read_to_string(e.path()).unwrap())
            .collect();
        assert!(contents.contains("written to file"), "{contents}");
        assert!(contents.contains("orders"));
    }
}
