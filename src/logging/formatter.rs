use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    registry::LookupSpan,
    Layer,
};

use super::{ConsoleConfig, LogFormat};

/// Общие флаги форматирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl From<&ConsoleConfig> for FormatOptions {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            with_ansi: config.with_ansi,
            with_target: config.with_target,
            with_thread_ids: config.with_thread_ids,
            with_line_numbers: config.with_line_numbers,
        }
    }
}

/// Собирает fmt-слой заданного формата поверх `writer`.
///
/// Конкретный тип формата стирается в boxed trait-объект.
pub fn build_formatter<S, W>(
    format: LogFormat,
    writer: W,
    options: FormatOptions,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(options.with_ansi)
        .with_target(options.with_target)
        .with_thread_names(options.with_thread_ids)
        .with_thread_ids(options.with_thread_ids)
        .with_line_number(options.with_line_numbers);

    match format {
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Pretty => layer.pretty().with_span_events(FmtSpan::CLOSE).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
