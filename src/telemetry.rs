//! Optional JSON trace logging for debugging scheduling decisions.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const TRACE_LOG_ENV: &str = "ECHOTRAIL_TRACE_LOG";
const LOG_FILTER_ENV: &str = "ECHOTRAIL_LOG";
const DEFAULT_FILTER: &str = "echotrail=debug";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub fn tracing_log_path() -> PathBuf {
    env::var(TRACE_LOG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("echotrail_trace.jsonl"))
}

/// Directives from `ECHOTRAIL_LOG`, or engine debug output when unset or invalid.
fn trace_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_tracing_once(enabled: bool, once: &OnceLock<()>) {
    if !enabled {
        return;
    }

    let _ = once.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(trace_filter())
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Installs the global JSON subscriber once, only when `enabled`.
pub fn init_tracing(enabled: bool) {
    init_tracing_once(enabled, &TRACING_INIT);
}
