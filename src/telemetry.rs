use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber for the frontends. `RUST_LOG`
/// overrides the default filter; calling twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("theoremdex=info,tower_http=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
