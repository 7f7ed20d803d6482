//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter directive for the CLI verbosity flags.
pub fn default_directive(quiet: bool, verbosity: u8) -> &'static str {
    match (quiet, verbosity) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

/// Log to stderr. `RUST_LOG`, when set, wins over the flags.
pub fn init(quiet: bool, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbosity)));

    if let Err(e) = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
    {
        eprintln!("forkscribe: logging already initialized: {e}");
    }
}
