use std::env::var;
use std::io::stderr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing at `info`, honouring `RUST_LOG` when it is set.
pub fn init() {
    init_tracing(None);
}

/// Initialize tracing with an optional filter directive (e.g. `debug` or
/// `servprobe=trace,reqwest=warn`).
///
/// An explicit directive takes precedence over `RUST_LOG`. An invalid
/// directive falls back to the environment with a warning once the
/// subscriber is installed.
pub fn init_tracing(directive: Option<&str>) {
    let (env_filter, rejected) = match directive {
        Some(directive) => match EnvFilter::try_new(directive) {
            Ok(filter) => (filter, None),
            Err(error) => (default_filter(LevelFilter::INFO), Some((directive, error))),
        },
        None => (default_filter(LevelFilter::INFO), None),
    };

    // Logs go to stderr; stdout is reserved for command output.
    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(stderr)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if let Some((directive, error)) = rejected {
        warn!("Ignoring invalid log filter {directive:?}, falling back to RUST_LOG: {error}");
    }
}

fn default_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder().with_default_directive(level.into()).from_env_lossy()
}
