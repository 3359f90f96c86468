use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Installs the global subscriber on stderr, keeping stdout for tables.
///
/// `RUST_LOG` wins when set. Otherwise logging is off unless `verbose`, which
/// turns on debug output. Only events from this crate are ever shown.
pub fn init_logging(verbose: bool) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("dcatrack=debug"),
        Err(_) => EnvFilter::new("off"),
    };
    let app_filter = Targets::new().with_target("dcatrack", LevelFilter::TRACE);

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time().with_writer(std::io::stderr))
        .with(app_filter)
        .with(env_filter)
        .init();
}
