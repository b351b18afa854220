use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Held for the process lifetime so the file writer thread keeps flushing.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.to_rfc3339())
    }
}

/// Console logging plus optional daily-rolling file persistence. Safe to call
/// more than once; later calls are no-ops.
pub fn init_logger(log_dir: Option<&Path>) {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_level(true)
        .with_timer(LocalTimer);

    let registry = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "portico.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_timer(LocalTimer);
            if registry.with(file_layer).try_init().is_ok() {
                let _ = FILE_GUARD.set(guard);
            }
            // A failed init drops the guard, which shuts its worker down.
        }
        None => {
            let _ = registry.try_init();
        }
    }

    tracing::info!("Log system initialized");
}
