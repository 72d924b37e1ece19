use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InventoryError;

/// Polymorphic view over one collected cloud resource.
///
/// Every resource type (DB instance, bucket, IAM user, ...) implements
/// this trait. The inventory pipeline treats resources opaquely and only
/// reads or rewrites the identity fields of their metadata.
///
/// CONTRACT:
/// - `metadata()` may fail; a failing resource is still forwarded and the
///   failure surfaces to whoever evaluates it
/// - implementations must be cheap to call repeatedly
pub trait Resource: Send + Sync + fmt::Debug {
    /// Raw provider payload.
    fn data(&self) -> Value;

    /// Identification and placement of the resource.
    fn metadata(&self) -> Result<ResourceMetadata, InventoryError>;

    /// Normalized event view consumed by downstream evaluation.
    fn normalized_view(&self) -> Value;
}

// ------------------------------------------------------------
// Resource metadata
// ------------------------------------------------------------
//
// `account_id` and `account_alias` are overwritten by the
// organization forwarder for every resource it passes on.
//
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub id: String,

    /// Resource category, e.g. "cloud-database"
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Provider-specific type, e.g. "aws-rds"
    pub sub_type: String,

    pub name: String,
    pub region: String,
    pub account_id: String,
    pub account_alias: String,
}

// ------------------------------------------------------------
// Cycle metadata
// ------------------------------------------------------------
//
// Identifies the collection pass a resource belongs to.
// Assigned by the caller and passed through unmodified.
//
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMetadata {
    pub sequence: i64,
}

/// Resource envelope: one resource paired with the cycle it was collected in.
///
/// Ownership moves collector → tenant channel → forwarder → root channel
/// → consumer.
#[derive(Debug)]
pub struct ResourceInfo {
    pub resource: Box<dyn Resource>,
    pub cycle: CycleMetadata,
}

impl ResourceInfo {
    pub fn new(resource: impl Resource + 'static, cycle: CycleMetadata) -> Self {
        Self {
            resource: Box::new(resource),
            cycle,
        }
    }

    /// Re-binds the envelope to `identity`.
    ///
    /// The account id and alias reported by the resource's metadata are
    /// replaced unconditionally, whatever the collector set.
    pub fn with_identity(self, identity: Arc<TenantIdentity>) -> Self {
        Self {
            resource: Box::new(TenantScopedResource {
                inner: self.resource,
                identity,
            }),
            cycle: self.cycle,
        }
    }
}

// ------------------------------------------------------------
// Tenant identity
// ------------------------------------------------------------
//
// Resolved once per tenant before any collector runs.
//
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantIdentity {
    /// Cloud provider tag, e.g. "aws", "gcp"
    pub provider: String,

    /// Account / subscription / project id
    pub account: String,

    /// Human readable account name
    pub account_alias: String,
}

impl fmt::Display for TenantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.provider, self.account, self.account_alias)
    }
}

/// One inventoried account: who it is and how to reach it.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub identity: TenantIdentity,
    pub config: crate::config::TenantConfig,
}

/// Decorator installed by the organization forwarder.
#[derive(Debug)]
struct TenantScopedResource {
    inner: Box<dyn Resource>,
    identity: Arc<TenantIdentity>,
}

impl Resource for TenantScopedResource {
    fn data(&self) -> Value {
        self.inner.data()
    }

    fn metadata(&self) -> Result<ResourceMetadata, InventoryError> {
        let mut metadata = self.inner.metadata()?;
        metadata.account_id = self.identity.account.clone();
        metadata.account_alias = self.identity.account_alias.clone();
        Ok(metadata)
    }

    fn normalized_view(&self) -> Value {
        self.inner.normalized_view()
    }
}
