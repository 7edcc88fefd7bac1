use std::{collections::BTreeMap, env, fmt, io, path::PathBuf, str::FromStr};

use hagrid_error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error`, `off`
    pub level: String,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    /// Уровни для отдельных целей, например `hagrid::downstream = "debug"`
    pub targets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Файловый вывод с ежедневной ротацией.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Префикс имени файла; к нему добавляется дата
    pub filename: String,
    pub format: LogFormat,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    /// `HAGRID_LOG` задаёт уровень, `HAGRID_LOG_FORMAT` формат консоли,
    /// `HAGRID_LOG_DIR` включает файловый вывод в указанный каталог.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("HAGRID_LOG") {
            self.level = level;
        }
        if let Some(format) = env::var("HAGRID_LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok())
        {
            self.console.format = format;
        }
        if let Ok(dir) = env::var("HAGRID_LOG_DIR") {
            self.file.enabled = true;
            self.file.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_level("logging.level", &self.level)?;
        for (target, level) in &self.targets {
            check_level(&format!("logging.targets.{target}"), level)?;
        }
        if self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "logging.file.filename".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file.enabled {
            std::fs::create_dir_all(&self.file.dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: `"info,hagrid::downstream=debug"`.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.clone();
        for (target, level) in &self.targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }
}

fn check_level(
    key: &str,
    level: &str,
) -> Result<(), ConfigError> {
    LevelFilter::from_str(level)
        .map(|_| ())
        .map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("unknown log level '{level}'"),
        })
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            filename: "hagrid.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(ConfigError::Invalid {
                key: "logging.console.format".to_string(),
                reason: format!("unknown format '{other}'"),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
