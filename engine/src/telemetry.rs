//! Telemetry
//!
//! Sets up `tracing-subscriber` for the bot process. `RUST_LOG` wins over the
//! configured level. Debug builds print human-readable lines; release builds
//! emit JSON with the current span so the output can be shipped to a log
//! collector as is.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is not set.
///
/// Dependencies log at `warn` so reqwest and hyper stay quiet at `debug`.
pub fn default_filter(log_level: &str) -> String {
    format!(
        "warn,raiden_engine={level},raiden={level}",
        level = log_level
    )
}

/// Initialize the global subscriber. Calling it twice is a no-op.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}
