use tracing_subscriber::{fmt, EnvFilter};

/// JSON logs filtered by `RUST_LOG`, defaulting to `info` for this crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keypair_provisioner=info,warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .try_init();
}
