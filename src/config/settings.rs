use std::{path::Path, time::Duration};

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use hagrid_error::ConfigError;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Префикс переменных окружения: `HAGRID_MAX_SUBSCRIBERS`,
/// `HAGRID_LOGGING__LEVEL` и т.д.
pub const ENV_PREFIX: &str = "HAGRID";
/// Имя необязательного файла конфигурации в рабочем каталоге (без
/// расширения).
pub const DEFAULT_CONFIG_FILE: &str = "hagrid";

/// Настройки сервиса.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HagridConfig {
    /// Максимум параллельных потребителей
    pub max_subscribers: usize,
    /// Таймаут ожидания ответа по умолчанию (0 означает без таймаута)
    pub listener_timeout_secs: u64,
    /// Период проверки таймаутов слушателей
    pub listener_cleanup_interval_secs: u64,
    /// Период очистки отправленных пакетов
    pub idle_cleanup_interval_secs: u64,
    /// Сколько отправленный пакет считается "простаивающим"
    pub idle_retention_secs: u64,
    /// Пауза между попытками переподключения
    pub reconnect_delay_secs: u64,
    /// Длительность одного опроса брокера
    pub poll_timeout_ms: u64,
    pub logging: LoggingConfig,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl HagridConfig {
    /// Значения по умолчанию, затем `hagrid.{toml,yaml,json}` (если есть),
    /// затем переменные окружения.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(environment());
        finish(builder)
    }

    /// То же, что [`load`](Self::load), но с обязательным файлом `path`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(environment());
        finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Self::default();
        Config::builder()
            .set_default("max_subscribers", defaults.max_subscribers as u64)
            .and_then(|b| b.set_default("listener_timeout_secs", defaults.listener_timeout_secs))
            .and_then(|b| {
                b.set_default(
                    "listener_cleanup_interval_secs",
                    defaults.listener_cleanup_interval_secs,
                )
            })
            .and_then(|b| {
                b.set_default("idle_cleanup_interval_secs", defaults.idle_cleanup_interval_secs)
            })
            .and_then(|b| b.set_default("idle_retention_secs", defaults.idle_retention_secs))
            .and_then(|b| b.set_default("reconnect_delay_secs", defaults.reconnect_delay_secs))
            .and_then(|b| b.set_default("poll_timeout_ms", defaults.poll_timeout_ms))
            .map_err(load_error)
    }

    /// Проверяет диапазоны значений.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_subscribers", self.max_subscribers as u64),
            (
                "listener_cleanup_interval_secs",
                self.listener_cleanup_interval_secs,
            ),
            ("idle_cleanup_interval_secs", self.idle_cleanup_interval_secs),
            ("idle_retention_secs", self.idle_retention_secs),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("poll_timeout_ms", self.poll_timeout_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.logging.validate()
    }

    /// `None`, если таймаут отключён.
    pub fn listener_timeout(&self) -> Option<Duration> {
        (self.listener_timeout_secs > 0).then(|| Duration::from_secs(self.listener_timeout_secs))
    }

    pub fn listener_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.listener_cleanup_interval_secs)
    }

    pub fn idle_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.idle_cleanup_interval_secs)
    }

    pub fn idle_retention(&self) -> Duration {
        Duration::from_secs(self.idle_retention_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for HagridConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 10,
            listener_timeout_secs: 10,
            listener_cleanup_interval_secs: 2,
            idle_cleanup_interval_secs: 5,
            idle_retention_secs: 30,
            reconnect_delay_secs: 10,
            poll_timeout_ms: 100,
            logging: LoggingConfig::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<HagridConfig, ConfigError> {
    let config: HagridConfig = builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(load_error)?;
    config.validate()?;
    Ok(config)
}

fn load_error(err: config::ConfigError) -> ConfigError {
    ConfigError::Load {
        reason: err.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;
    use tempfile::NamedTempFile;

    use super::*;

    fn clear_env() {
        for key in [
            "HAGRID_MAX_SUBSCRIBERS",
            "HAGRID_RECONNECT_DELAY_SECS",
            "HAGRID_LOGGING__LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    /// Тест проверяет значения по умолчанию.
    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let config = HagridConfig::load().unwrap();

        assert_eq!(config, HagridConfig::default());
        assert_eq!(config.max_subscribers, 10);
        assert_eq!(config.listener_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.listener_cleanup_interval(), Duration::from_secs(2));
        assert_eq!(config.idle_retention(), Duration::from_secs(30));
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
    }

    /// Тест проверяет переопределение через переменные окружения, в том
    /// числе вложенные ключи.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("HAGRID_MAX_SUBSCRIBERS", "3");
        env::set_var("HAGRID_RECONNECT_DELAY_SECS", "1");
        env::set_var("HAGRID_LOGGING__LEVEL", "debug");

        let config = HagridConfig::load().unwrap();
        clear_env();

        assert_eq!(config.max_subscribers, 3);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.logging.level, "debug");
    }

    /// Тест проверяет загрузку из TOML-файла.
    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "max_subscribers = 4\nlistener_timeout_secs = 0\n\n[logging]\nlevel = \"warn\""
        )
        .unwrap();

        let config = HagridConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_subscribers, 4);
        assert_eq!(config.listener_timeout(), None);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.idle_retention_secs, 30);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        clear_env();
        let err = HagridConfig::load_from("/nonexistent/hagrid.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }

    /// Тест проверяет отказ для нулевых интервалов.
    #[test]
    fn test_validate_rejects_zero() {
        let config = HagridConfig {
            max_subscribers: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "max_subscribers".to_string(),
                reason: "must be greater than zero".to_string(),
            }
        );

        let config = HagridConfig {
            poll_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
