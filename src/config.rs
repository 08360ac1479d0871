//! Ledger configuration
use super::error::ConfigError;
use super::participant::DEFAULT_HRP;
use super::role::RoleSequence;
use super::utils;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the registry lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    /// Discarded when the ledger is dropped.
    Temporary,
    /// A sled database directory.
    Path(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: Storage,
    /// Route every new shipment travels. Existing shipments keep the route
    /// they were created with.
    pub route: RoleSequence,
    /// Flush to disk after every commit instead of relying on sled's
    /// background flusher.
    pub sync_on_commit: bool,
    /// Human readable prefix for provisioned participant addresses.
    pub address_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: Storage::Temporary,
            route: RoleSequence::default(),
            sync_on_commit: false,
            address_prefix: DEFAULT_HRP.to_owned(),
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = Storage::Path(path.into());
        self
    }
    pub fn set_route(mut self, route: RoleSequence) -> Self {
        self.route = route;
        self
    }
    pub fn set_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
    pub fn set_address_prefix(mut self, prefix: &str) -> Self {
        self.address_prefix = prefix.to_owned();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !utils::is_valid_hrp(&self.address_prefix) {
            return Err(ConfigError::AddressPrefix(self.address_prefix.clone()));
        }
        Ok(())
    }

    /// Parse a TOML document. Missing keys fall back to the defaults.
    pub fn from_toml(doc: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let doc = std::fs::read_to_string(path)?;
        Self::from_toml(&doc)
    }
}
