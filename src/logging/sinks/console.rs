use tracing_subscriber::{registry::LookupSpan, Layer};

use crate::logging::{
    formatter::{build_formatter, FormatOptions},
    LoggingConfig,
};

/// Слой вывода в stdout по настройкам `logging.console`.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    build_formatter(
        config.console.format,
        std::io::stdout,
        FormatOptions::from(&config.console),
    )
}
