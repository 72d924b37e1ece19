use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::InventoryError;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Inventory runtime settings (capacities, concurrency, cycles)
// - The tenants to inventory
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Accounts to inventory
    pub tenants: Vec<TenantConfig>,

    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the runtime cannot honour.
    ///
    /// Tenant accounts must be unique: collector keys are namespaced by
    /// account and the organization registry treats a key collision as a bug.
    pub fn validate(&self) -> Result<(), InventoryError> {
        let inv = &self.inventory;
        if inv.root_channel_capacity == 0 || inv.tenant_channel_capacity == 0 {
            return Err(InventoryError::InvalidConfig(
                "channel capacities must be greater than zero".into(),
            ));
        }
        if inv.region_concurrency == 0 || inv.collector_concurrency == 0 {
            return Err(InventoryError::InvalidConfig(
                "concurrency limits must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            if tenant.account.trim().is_empty() {
                return Err(InventoryError::InvalidConfig(
                    "tenant account must not be empty".into(),
                ));
            }
            if !seen.insert(tenant.account.as_str()) {
                return Err(InventoryError::DuplicateTenant(tenant.account.clone()));
            }
        }
        Ok(())
    }

    pub fn debug_log(&self) -> bool {
        self.debug
            .as_ref()
            .is_some_and(|d| d.log.unwrap_or(false))
    }
}

// ------------------------------------------------------------
// Inventory runtime configuration
// ------------------------------------------------------------
//
// Every field has a default so the whole block may be omitted.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    /// Buffer of the shared root channel
    pub root_channel_capacity: usize,

    /// Buffer of each tenant channel
    pub tenant_channel_capacity: usize,

    /// Maximum regions listed at once by one aggregate collector
    pub region_concurrency: usize,

    /// Maximum collectors running at once within one cycle
    pub collector_concurrency: usize,

    /// Upper bound on a single collector fetch
    pub collector_timeout_secs: u64,

    /// Pause between two cycles
    pub cycle_interval_secs: u64,

    /// Number of cycles to run; `None` runs until interrupted
    pub cycles: Option<u64>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            root_channel_capacity: 256,
            tenant_channel_capacity: 64,
            region_concurrency: 8,
            collector_concurrency: 16,
            collector_timeout_secs: 60,
            cycle_interval_secs: 30,
            cycles: Some(1),
        }
    }
}

impl InventoryConfig {
    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

// ------------------------------------------------------------
// Tenant configuration
// ------------------------------------------------------------
//
// One independently authenticated account.
//
// NOTE:
// - Credentials are not part of this file; they are resolved by the
//   provider SDKs from the environment.
//
#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    /// Provider tag, e.g. "aws"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Account id
    pub account: String,

    /// Display alias; defaults to the account id
    pub alias: Option<String>,

    /// Regions to inventory
    #[serde(default)]
    pub regions: Vec<String>,

    /// Demo provider settings (only used by the bundled binary)
    #[serde(default)]
    pub demo: DemoConfig,
}

fn default_provider() -> String {
    "aws".to_string()
}

/// Synthetic data settings for the demo providers.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DemoConfig {
    /// Instances generated per region and cycle
    pub instances_per_region: usize,

    /// Regions whose listing always fails
    pub failing_regions: Vec<String>,
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Logs every forwarded resource as JSON
    pub log: Option<bool>,
}
