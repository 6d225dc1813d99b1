use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber; `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    // already initialised (tests, embedding callers)
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    tracing::info!(target = "app", "tracing initialized");
}
