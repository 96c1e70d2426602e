//! Tracing subscriber setup shared by the Pulse binaries.

use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber at `info`, honouring `RUST_LOG` and `RUST_LOG_FORMAT`.
pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Install the global subscriber with `level` as the default directive.
///
/// `RUST_LOG` still takes precedence for individual targets. Set
/// `RUST_LOG_FORMAT=json` to emit one JSON object per line. Calling this
/// more than once is harmless; only the first call installs a subscriber.
pub fn init_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        warn!("tracing subscriber already installed, keeping the existing one");
    }
}
