//! Tool configuration (device selection), loadable from TOML.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::PHISON_VENDOR_ID;
use crate::transport::{NusbTransport, TransportError};

/// Which device to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID; any product of the vendor when unset.
    pub product_id: Option<u16>,
    /// SCSI logical unit.
    pub lun: u8,
    /// Timeout of each USB transfer, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            vendor_id: PHISON_VENDOR_ID,
            product_id: None,
            lun: 0,
            timeout_ms: 5000,
        }
    }
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Open the configured device.
    pub fn open(&self) -> Result<NusbTransport, TransportError> {
        NusbTransport::open_matching(self.vendor_id, self.product_id).map(|t| {
            t.with_lun(self.lun)
                .with_timeout(Duration::from_millis(self.timeout_ms))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.vendor_id, 0x13FE);
        assert_eq!(config.product_id, None);
    }

    #[test]
    fn test_partial_toml() {
        let config: ToolConfig = toml::from_str("product_id = 4096\n").unwrap();
        assert_eq!(config.vendor_id, PHISON_VENDOR_ID);
        assert_eq!(config.product_id, Some(0x1000));
        assert_eq!(config.lun, 0);
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("phison-config-{}.toml", std::process::id()));
        let config = ToolConfig {
            vendor_id: 0x1234,
            product_id: Some(0x5678),
            lun: 1,
            timeout_ms: 250,
        };
        config.save_to_file(&path).unwrap();
        let loaded = ToolConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
