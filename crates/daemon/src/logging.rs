//! Logging setup
//!
//! `RANKFLOW_LOG_FORMAT=json|pretty` picks the console format; with
//! `RANKFLOW_LOG_DIR` set, JSON lines also go to a daily-rolling file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "rankflow=info";
const LOG_FILE_PREFIX: &str = "rankflow.log";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init() -> Option<WorkerGuard> {
    let format = std::env::var("RANKFLOW_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match std::env::var("RANKFLOW_LOG_DIR") {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match format.as_str() {
        "json" => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer().pretty()).init(),
    }

    guard
}
