//! Process-wide subscriber installation
//!
//! Embedders call [`init`] once with the `[log]` section of their engine
//! configuration. Tests never call it; they use `init_test_capture()`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One human-readable line per event
    #[default]
    Pretty,
    /// One JSON object per event, field names from `enclave_core_types::schema`
    Json,
}

/// `[log]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "enclave_core=info,enclave_engine=info".to_string(),
        }
    }
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber described by `settings`
///
/// Returns `false` when a subscriber was already installed, by an earlier
/// call or by the embedding process; the existing one is left in place.
pub fn init(settings: &LogSettings) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .finish()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .flatten_event(true)
            .finish()
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        let settings = LogSettings::default();

        init(&settings);

        assert!(!init(&settings));
    }

    #[test]
    fn test_settings_parse_lowercase_format() {
        let settings: LogSettings =
            serde_json::from_str(r#"{"format": "json"}"#).unwrap();

        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.filter, LogSettings::default().filter);
    }
}
