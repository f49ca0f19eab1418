use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

/// Installs the global tracing subscriber. `level` is a default directive;
/// `RUST_LOG` takes precedence when set. Safe to call more than once.
pub fn setup_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
	let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
	static INIT: Once = Once::new();
	let mut result = Ok(());
	INIT.call_once(|| {
		let registry = tracing_subscriber::registry().with(filter);
		result = match format {
			LogFormat::Text => registry
				.with(tracing_subscriber::fmt::layer().with_target(true))
				.try_init(),
			LogFormat::Json => registry
				.with(tracing_subscriber::fmt::layer().json().flatten_event(true))
				.try_init(),
		}
		.map_err(Into::into);
	});
	result
}

/// Best-effort logging for tests; repeated installs are ignored.
pub fn setup_test_logging() {
	let _ = tracing_subscriber::registry()
		.with(EnvFilter::new("debug"))
		.with(tracing_subscriber::fmt::layer().with_test_writer())
		.try_init();
}
