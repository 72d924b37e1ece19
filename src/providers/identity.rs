use async_trait::async_trait;
use log::warn;

use crate::config::TenantConfig;
use crate::error::InventoryError;
use crate::schema::{Tenant, TenantIdentity};

/// Resolves who a tenant is before any of its collectors run.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self, config: &TenantConfig) -> Result<TenantIdentity, InventoryError>;
}

/// Takes the identity straight from the tenant configuration.
///
/// The alias falls back to the account id when unset.
pub struct ConfigIdentityProvider;

#[async_trait]
impl IdentityProvider for ConfigIdentityProvider {
    async fn identity(&self, config: &TenantConfig) -> Result<TenantIdentity, InventoryError> {
        let account = config.account.trim();
        if account.is_empty() {
            return Err(InventoryError::Identity {
                tenant: config.account.clone(),
                reason: "empty account id".into(),
            });
        }

        Ok(TenantIdentity {
            provider: config.provider.clone(),
            account: account.to_string(),
            account_alias: config
                .alias
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| account.to_string()),
        })
    }
}

/// Resolves every configured tenant.
///
/// A tenant whose identity cannot be resolved is logged and returned in
/// the failure list; the others are unaffected.
pub async fn resolve_tenants(
    provider: &dyn IdentityProvider,
    configs: &[TenantConfig],
) -> (Vec<Tenant>, Vec<(String, InventoryError)>) {
    let mut tenants = Vec::with_capacity(configs.len());
    let mut failures = Vec::new();

    for config in configs {
        match provider.identity(config).await {
            Ok(identity) => tenants.push(Tenant {
                identity,
                config: config.clone(),
            }),
            Err(e) => {
                warn!("Skipping tenant '{}': {}", config.account, e);
                failures.push((config.account.clone(), e));
            }
        }
    }

    (tenants, failures)
}
