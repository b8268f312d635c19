//! Log and span output
//!
//! `RUST_LOG` wins over the configured filter; `--debug` raises netpilot's
//! own events to debug level. Output goes to stderr so answers on stdout
//! stay clean for piping.

use std::io::Write;
use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::TelemetryConfig;

static INIT: Once = Once::new();

/// Flushes buffered output when dropped
#[must_use = "output may be lost if the guard is dropped early"]
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Filter directive in effect for the given settings
pub fn filter_directive(config: &TelemetryConfig, debug: bool) -> String {
    if debug {
        format!("{},netpilot=debug", config.filter)
    } else {
        config.filter.clone()
    }
}

/// Install the global subscriber; later calls only return a guard
pub fn init(config: &TelemetryConfig, debug: bool) -> TelemetryGuard {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, debug)));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
    TelemetryGuard { _private: () }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_raises_own_level() {
        let config = TelemetryConfig::default();
        assert_eq!(filter_directive(&config, false), "netpilot=info");
        assert_eq!(
            filter_directive(&config, true),
            "netpilot=info,netpilot=debug"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig::default();
        let _first = init(&config, false);
        let _second = init(&config, true);
    }
}
