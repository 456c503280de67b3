//! Helpers related to tracing, used by main entrypoints

use tracing_subscriber::prelude::*;

use crate::NAME;

/// Initialize tracing with the default configuration.
///
/// Log output goes to stderr, filtered by `RUST_LOG`; stdout is reserved
/// for command line output. When running as root, info and above is
/// also sent to the journal.
pub fn initialize_tracing() {
    let journald_layer = if rustix::process::getuid().is_root() {
        tracing_journald::layer()
            .ok()
            .map(|layer| layer.with_filter(tracing_subscriber::filter::LevelFilter::INFO))
    } else {
        None
    };

    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::from_default_env());

    // try_init: tests may have installed a subscriber already
    let registry = tracing_subscriber::registry().with(fmt_layer);
    let _ = match journald_layer {
        Some(journald) => registry.with(journald).try_init(),
        None => registry.try_init(),
    };
    tracing::trace!("Initialized tracing for {NAME}");
}
