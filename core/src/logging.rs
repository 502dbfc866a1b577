//! Log subscriber setup driven by the `logLevel` configuration key.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{keys, Configuration};

/// The level named by `logLevel`, defaulting to `INFO` when the key is
/// missing or unrecognised.
pub fn level_from(config: &dyn Configuration) -> Level {
    config
        .get(keys::LOG_LEVEL)
        .and_then(|value| value.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level. Returns `false` if a subscriber was already installed.
pub fn init(config: &dyn Configuration) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level_from(config)).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
