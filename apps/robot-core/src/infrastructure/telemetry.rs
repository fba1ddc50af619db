//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the configured default directive
//! applies. Output is human readable unless `observability.logging.format`
//! is `json`.
//!
//! ```ignore
//! use robot_core::infrastructure::telemetry;
//!
//! telemetry::init(&config.observability.logging);
//! tracing::info!("robot core starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Install the global subscriber. Later calls are ignored.
#[allow(clippy::expect_used)]
pub fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| {
            EnvFilter::new("info").add_directive(
                "robot_core=info"
                    .parse()
                    .expect("static directive 'robot_core=info' is valid"),
            )
        })
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
