//! Open-time configuration
//!
//! ```toml
//! reset_on_open = true
//! serial = "CL12K1A00042"
//! max_packets = 20
//!
//! [network]
//! port = 5343
//! liveness_timeout_ms = 5000
//! ```

use serde::Deserialize;
use streamdeck_transport::NetworkConfig;

use crate::error::DeckError;

/// Settings applied when opening a deck
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Send the model's reset report after opening
    pub reset_on_open: bool,
    /// Only open the deck with this serial
    pub serial: Option<String>,
    /// Refuse images needing more packets than this
    pub max_packets: Option<usize>,
    pub network: NetworkConfig,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            reset_on_open: true,
            serial: None,
            max_packets: None,
            network: NetworkConfig::default(),
        }
    }
}

impl DeckConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, DeckError> {
        toml::from_str(s).map_err(|e| DeckError::Config(e.to_string()))
    }
}

/// Alias used by the open routines
pub type OpenOptions = DeckConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = DeckConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeckConfig::default());
        assert!(config.reset_on_open);
        assert_eq!(config.network.port, 5343);
        assert!(config.max_packets.is_none());
    }

    #[test]
    fn test_partial_network_section() {
        let config = DeckConfig::from_toml_str(
            r#"
            reset_on_open = false
            serial = "AB12"
            max_packets = 20

            [network]
            liveness_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert!(!config.reset_on_open);
        assert_eq!(config.serial.as_deref(), Some("AB12"));
        assert_eq!(config.max_packets, Some(20));
        assert_eq!(config.network.liveness_timeout().as_millis(), 2500);
        assert_eq!(config.network.poll_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = DeckConfig::from_toml_str("reset_on_open = \"yes\"").unwrap_err();
        assert!(matches!(err, DeckError::Config(_)));
    }
}
