use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Build the event filter for `config`: `RUST_LOG` wins when set, otherwise `log_level`.
/// Disabled logging filters everything out.
pub fn filter(config: &Config) -> EnvFilter {
    if !config.enable_logging {
        return EnvFilter::new("off");
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr subscriber for the process. Calling this more than once is a no-op after
/// the first successful initialization.
pub fn init(config: &Config) {
    let _ = fmt()
        .with_env_filter(filter(config))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::Uptime::default())
        .finish()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_logging_filters_everything() {
        let config = Config {
            enable_logging: false,
            ..Config::default()
        };
        assert_eq!(filter(&config).to_string(), "off");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = Config::default();
        init(&config);
        init(&config);
    }
}
