use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// HTTP stack crates that log every connection at `debug`/`trace`; the snapshot
/// download and thousands of point lookups would drown the pipeline's own lines.
const QUIET_DEPENDENCIES: [&str; 4] = ["hyper", "hyper_util", "reqwest", "h2"];

/// Filter used when `RUST_LOG` is unset: `default_level` for this crate, `warn`
/// for the HTTP stack.
pub fn fallback_directives(default_level: &str) -> String {
    let mut directives = vec![default_level.to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|krate| format!("{krate}=warn")));
    directives.join(",")
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) -> Result<(), anyhow::Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback_directives(default_level))
            .map_err(|e| anyhow::anyhow!("invalid log level {default_level:?}: {e}"))?,
    };

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
