use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "COSTSCOPE_LOG";

/// Installs the stderr subscriber. `COSTSCOPE_LOG` takes env-filter syntax and
/// wins over `default_level`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, repeated calls) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}
