use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "yt_fetch=info,yt_fetch_lib=info";

/// Install the global subscriber. Logs go to stderr; stdout carries the
/// rendered job events.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            "yt_fetch=debug,yt_fetch_lib=debug".into()
        } else {
            DEFAULT_FILTER.into()
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
