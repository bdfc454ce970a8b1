use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Safe to call more
/// than once: only the first call installs a subscriber, later calls return
/// `false`.
pub fn init(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if settings.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %settings.level, json = settings.json, "logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let settings = LoggingSettings::default();
        let _ = init(&settings);
        assert!(!init(&settings));
    }
}
