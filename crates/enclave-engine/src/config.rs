//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! subnet = "172.23.0.0/16"
//! reserved_ips = ["172.23.0.1"]
//! partitioning_enabled = true
//! image_check_parallelism = 4
//! default_connection_packet_loss = 0.0
//!
//! [log]
//! format = "json"
//! filter = "enclave_engine=debug"
//! ```

use std::net::Ipv4Addr;

use enclave_core::logging_facility::LogSettings;
use enclave_core_types::TraceId;
use enclave_core::model::Connection;
use enclave_core::ops::{NetworkSettings, Subnet};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

const MIN_IMAGE_CHECK_PARALLELISM: usize = 1;
const MAX_IMAGE_CHECK_PARALLELISM: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enclave subnet in CIDR notation
    pub subnet: String,
    /// Addresses never handed to services (gateway and the like)
    pub reserved_ips: Vec<Ipv4Addr>,
    pub partitioning_enabled: bool,
    /// Concurrent image checks during validation, clamped to 1..=8
    pub image_check_parallelism: usize,
    /// Packet loss between partitions nobody configured a connection for
    pub default_connection_packet_loss: f32,
    pub log: LogSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subnet: "172.23.0.0/16".to_string(),
            reserved_ips: vec![Ipv4Addr::new(172, 23, 0, 1)],
            partitioning_enabled: true,
            image_check_parallelism: 4,
            default_connection_packet_loss: 0.0,
            log: LogSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// `EngineError::Config` when the document is not valid TOML or a field
    /// has the wrong type.
    pub fn from_toml_str(source: &str) -> Result<Self, EngineError> {
        toml::from_str(source).map_err(|e| EngineError::Config {
            message: e.to_string(),
        })
    }

    /// Install the process-wide subscriber from the `[log]` section
    ///
    /// Returns `false` when logging was already set up.
    pub fn init_logging(&self) -> bool {
        enclave_core::logging_facility::init(&self.log)
    }

    pub fn image_check_parallelism(&self) -> usize {
        self.image_check_parallelism
            .clamp(MIN_IMAGE_CHECK_PARALLELISM, MAX_IMAGE_CHECK_PARALLELISM)
    }

    /// Model settings derived from this configuration
    ///
    /// # Errors
    ///
    /// `EngineError::Config` for a malformed subnet, `EngineError::Network`
    /// for an out-of-range packet loss.
    pub fn network_settings(&self) -> Result<NetworkSettings, EngineError> {
        let subnet: Subnet = self.subnet.parse().map_err(|e| EngineError::Config {
            message: format!("subnet '{}': {}", self.subnet, e),
        })?;
        let default_connection = Connection::with_packet_loss(self.default_connection_packet_loss)?;
        Ok(NetworkSettings {
            subnet,
            reserved_ips: self.reserved_ips.clone(),
            partitioning_enabled: self.partitioning_enabled,
            default_connection,
        })
    }
}

/// Options for one plan run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Apply model mutations only; the backend is never called
    pub dry_run: bool,
    /// Caller's trace id, echoed in the run's logs and errors
    pub trace_id: Option<TraceId>,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_core::logging_facility::LogFormat;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.image_check_parallelism(), 4);
    }

    #[test]
    fn test_parallelism_is_clamped() {
        let high = EngineConfig::from_toml_str("image_check_parallelism = 64").unwrap();
        let low = EngineConfig::from_toml_str("image_check_parallelism = 0").unwrap();
        assert_eq!(high.image_check_parallelism(), 8);
        assert_eq!(low.image_check_parallelism(), 1);
    }

    #[test]
    fn test_network_settings_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            subnet = "10.5.0.0/24"
            reserved_ips = ["10.5.0.1"]
            partitioning_enabled = false
            default_connection_packet_loss = 100.0
            "#,
        )
        .unwrap();

        let settings = config.network_settings().unwrap();
        assert_eq!(settings.subnet.to_string(), "10.5.0.0/24");
        assert!(!settings.partitioning_enabled);
        assert!(settings.default_connection.is_blocked());
    }

    #[test]
    fn test_bad_subnet_is_config_error() {
        let config = EngineConfig {
            subnet: "not-a-subnet".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.network_settings(),
            Err(EngineError::Config { .. })
        ));
    }

    #[test]
    fn test_log_section() {
        let config = EngineConfig::from_toml_str(
            r#"
            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, LogSettings::default().filter);
    }

    #[test]
    fn test_wrong_field_type_is_config_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("partitioning_enabled = \"yes\""),
            Err(EngineError::Config { .. })
        ));
    }
}
