/// Tracing subscriber setup for host applications
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a config log level to a filter, falling back to INFO
pub fn level_filter(level: &str) -> filter::LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "error" => filter::LevelFilter::ERROR,
        "warn" | "warning" => filter::LevelFilter::WARN,
        "debug" => filter::LevelFilter::DEBUG,
        "trace" => filter::LevelFilter::TRACE,
        "off" => filter::LevelFilter::OFF,
        _ => filter::LevelFilter::INFO,
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(level: &str) -> bool {
    let filter = filter::Targets::new()
        .with_target("playdeck", level_filter(level))
        .with_target("hyper", filter::LevelFilter::INFO)
        .with_target("reqwest", filter::LevelFilter::INFO)
        .with_target("rspotify", filter::LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
