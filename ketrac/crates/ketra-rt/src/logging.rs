//! Tracing setup shared by `ketrac` and `ketra`: a single `init_tracing`
//! call gated by `RUST_LOG`/a verbosity flag rather than a bespoke logger.

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber writing to stderr. `default_directive` is
/// used when `RUST_LOG` is unset, e.g. `"ketra=info"`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}
