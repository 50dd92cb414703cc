use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// `RUST_LOG` overrides the default `info` filter; `json` switches the output format.
pub fn init(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let logger = tracing_subscriber::fmt::layer().json();
        Registry::default().with(env_filter).with(logger).try_init()
    } else {
        let logger = tracing_subscriber::fmt::layer().compact();
        Registry::default().with(env_filter).with(logger).try_init()
    }
}
