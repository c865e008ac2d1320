//! Tracing setup for the `buildmend` binary.
//!
//! Logs always go to stderr; stdout is reserved for reports and command
//! output so `--json` results can be piped.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// HTTP client internals that are noisy below `warn`.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Default filter when `RUST_LOG` is unset.
fn default_filter(level: Level) -> EnvFilter {
    let mut directives = level.as_str().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push(',');
        directives.push_str(target);
    }
    EnvFilter::new(directives)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. With `json` set, each event is one JSON
/// line. Later calls are ignored once a subscriber is installed.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .json()
            .boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).with_target(false).boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}
