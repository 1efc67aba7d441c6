//! Tracing setup.
//!
//! A JSON-file subscriber with named `event!` helpers is one common shape
//! for this kind of module, but most call sites that actually emit events
//! reach for `tracing::debug!`/`trace!` directly instead of going through a
//! helper. This module follows that more common pattern and keeps to the
//! one thing every binary or test harness actually needs: an
//! `EnvFilter`-driven subscriber that writes to stderr.

use tracing_subscriber::EnvFilter;

/// Installs a global tracing subscriber controlled by `RUST_LOG`, defaulting
/// to `info` if the environment variable isn't set. Harmless to call more
/// than once — later calls are no-ops, since
/// [`tracing::subscriber::set_global_default`] only ever succeeds the first
/// time.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
