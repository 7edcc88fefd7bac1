use tracing_subscriber::EnvFilter;

use super::LoggingConfig;

/// `RUST_LOG`, если задан, иначе директива из настроек. Некорректная
/// директива заменяется на `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'info'");
        EnvFilter::new("info")
    })
}
