//! Centralised tracing initialisation for toolwrap binaries.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and optional JSON formatting.
//!
//! Subsequent calls are ignored; the global subscriber can only be set once
//! per process.

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Log lines go to stderr so that a wrapper's stdout stays reserved for
/// tool output such as the version banner.
pub fn init_tracing(json: bool, level: Level) {
    build_subscriber(json, level, std::io::stderr).try_init().ok();
}

/// Subscriber writing formatted events to `writer`.
fn build_subscriber<W>(json: bool, level: Level, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        Box::new(registry.with(fmt::layer().with_target(false).with_writer(writer).json()))
    } else {
        Box::new(registry.with(fmt::layer().with_target(false).with_writer(writer)))
    }
}
