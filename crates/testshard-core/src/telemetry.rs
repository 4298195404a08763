//! Tracing setup for testshard binaries.
//!
//! Call [`init_tracing`] once at startup. Filtering honours `RUST_LOG`
//! when set and falls back to the supplied level otherwise. The global
//! subscriber can only be installed once per process, so repeated calls
//! are ignored rather than an error.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// With `json` set, log lines come out as newline-delimited JSON for
/// aggregation; otherwise human-readable text.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
