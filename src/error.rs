use thiserror::Error;

/// Typed errors raised at the crate's boundaries.
///
/// Collector fetches and tenant factories propagate `anyhow::Error`;
/// these variants are what they wrap when the cause is one of ours.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Configuration that cannot be acted upon at all
    /// (zero capacities, zero concurrency, empty account ids).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two tenants share the same account id.
    #[error("duplicate tenant account '{0}'")]
    DuplicateTenant(String),

    /// A resource could not describe itself.
    #[error("resource metadata unavailable: {0}")]
    Metadata(String),

    /// Identity resolution failed for a tenant.
    #[error("unable to resolve identity for tenant '{tenant}': {reason}")]
    Identity { tenant: String, reason: String },
}
