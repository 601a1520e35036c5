use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MARKTRACK_LOG";
const DEFAULT_FILTER: &str = "marktrack=info";

/// `MARKTRACK_LOG` wins over the configured filter; an unparsable directive
/// falls through to the next candidate.
pub fn build_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| match configured {
            Some(directives) => EnvFilter::try_new(directives),
            None => EnvFilter::try_new(DEFAULT_FILTER),
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber. Returns false if one was already set.
pub fn init(configured: Option<&str>) -> bool {
    let subscriber = tracing_subscriber::registry()
        .with(build_filter(configured))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        );
    subscriber.try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_filter_used_without_env() {
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }
        let filter = build_filter(Some("marktrack=trace"));
        assert_eq!(filter.to_string(), "marktrack=trace");
        let fallback = build_filter(None);
        assert_eq!(fallback.to_string(), DEFAULT_FILTER);
    }
}
