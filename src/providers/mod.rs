//! Provider access and tenant factory registry
//!
//! This module provides:
//! - The region-scoped provider APIs collectors are written against
//! - Identity resolution for tenants
//! - A factory function resolving a tenant collector factory by provider name
//!
//! All provider-specific logic must live in dedicated submodules.

pub mod demo;
pub mod identity;
pub mod rds;

use std::sync::Arc;

use crate::collector::TenantCollectorFactory;
use crate::config::InventoryConfig;

/// Returns the tenant collector factory for a provider tag.
///
/// RETURNS:
/// - `Some(factory)` if the provider is supported
/// - `None` otherwise
///
/// CONTRACT:
/// - `provider` matches `tenants[].provider` in config.json
pub fn get_factory(
    provider: &str,
    inventory: &InventoryConfig,
) -> Option<Arc<dyn TenantCollectorFactory>> {
    match provider {
        "aws" => Some(Arc::new(demo::DemoAwsFactory {
            region_concurrency: inventory.region_concurrency,
        })),
        _ => None,
    }
}
