use super::kv::KeyValueStore;
use crate::error::SessionError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Storage key for the configuration record
pub const CONFIGURATION_KEY: &str = "qrScannerConfig";

/// Where scanned text gets sent
///
/// `destination` is a phone number with country code or a group id. Empty
/// means the user picks the recipient inside WhatsApp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, alias = "phoneNumber")]
    pub destination: String,
}

impl Configuration {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

/// Loads and saves the configuration record
///
/// This is the only access path to the record; the session controller and
/// the configuration screen both receive it explicitly.
pub struct ConfigurationStore {
    storage: Box<dyn KeyValueStore>,
}

impl ConfigurationStore {
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Read the stored record, falling back to the default on any failure
    pub fn load(&self) -> Configuration {
        let raw = match self.storage.get(CONFIGURATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Configuration::default(),
            Err(e) => {
                tracing::warn!("Failed to read configuration, using default: {:#}", e);
                return Configuration::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                let error = SessionError::ConfigParseFailed(e.to_string());
                tracing::warn!("{}, using default", error);
                Configuration::default()
            }
        }
    }

    /// Replace the stored record
    pub fn save(&self, config: &Configuration) -> Result<()> {
        let raw = serde_json::to_string(config).context("Failed to serialize configuration")?;
        self.storage
            .set(CONFIGURATION_KEY, &raw)
            .context("Failed to save configuration")?;

        tracing::info!("Saved destination {:?}", config.destination);
        Ok(())
    }
}
