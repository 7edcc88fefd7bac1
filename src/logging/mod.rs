//! Логирование на `tracing`: консоль и файл с ежедневной ротацией,
//! фильтрация по уровням для отдельных модулей.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::{LoggingHandle, LoggingStats};

use hagrid_error::{ConfigError, HagridResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Устанавливает глобальный subscriber по настройкам.
///
/// Повторный вызов в том же процессе возвращает ошибку.
pub fn init_logging(mut config: LoggingConfig) -> HagridResult<LoggingHandle> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (layer, guard) = sinks::file::layer_with_config(&config);
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| ConfigError::Load {
            reason: format!("logging already initialized: {e}"),
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        console = config.console.enabled,
        file = config.file.enabled,
        log_dir = %config.file.dir.display(),
        "Logging initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
