//! Text logging for the status-collection engine crates.
//!
//! * `trace`: spammy things (per-tick sampling)
//! * `debug`: things that might be useful when debugging the scheduler or store
//! * `info`: lifecycle events (engine start/stop, device attach)
//! * `warn`: problems we can recover from (a rejected read, a dropped tick)
//! * `error`: problems that lead to loss of functionality or data (a failed persist)

pub use tracing::{debug, error, info, trace, warn};

pub use log_once::{debug_once, error_once, info_once, trace_once, warn_once};

mod multi_logger;
mod result_extensions;

#[cfg(feature = "setup")]
mod setup;

pub use log::{Level, LevelFilter};
pub use multi_logger::{add_boxed_logger, add_logger};
pub use result_extensions::ResultExt;

#[cfg(feature = "setup")]
pub use setup::setup_native_logging;

/// The `RUST_LOG`-style filter used when none is set in the environment.
pub fn default_log_filter() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned())
}
