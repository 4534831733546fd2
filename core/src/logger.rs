use tracing::{
    debug,
    level_filters::{LevelFilter, ParseLevelFilterError},
};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

struct LoadTimer;

impl tracing_subscriber::fmt::time::FormatTime for LoadTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogSettings {
    pub level: LevelFilter,
    /// Prefix every line with the module that logged it.
    pub show_target: bool,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings { level: LevelFilter::INFO, show_target: false, ansi: true }
    }
}

/// Parses `error`, `warn`, `info`, `debug`, `trace` or `off`.
pub fn parse_log_level(value: &str) -> Result<LevelFilter, ParseLevelFilterError> {
    value.trim().parse()
}

/// `RUST_LOG` directives, when valid, plus the configured level.
pub fn build_env_filter(log_level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_default().add_directive(log_level.into())
}

pub fn setup_logger(settings: LogSettings) {
    let filter = build_env_filter(settings.level);

    let format = Format::default()
        .with_timer(LoadTimer)
        .with_level(true)
        .with_target(settings.show_target)
        .with_ansi(settings.ansi);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

pub fn setup_info_logger() {
    setup_logger(LogSettings::default());
}
