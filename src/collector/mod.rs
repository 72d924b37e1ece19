/// Collector module
///
/// This module groups everything that turns one tenant into resources:
/// - the `Collector` capability and the per-tenant registry type
/// - the `TenantCollectorFactory` capability
/// - concrete collectors (`rds`)
/// - the cycle runner driving registered collectors
///
/// Provider-specific API access MUST NOT live here; collectors talk to
/// providers exclusively through the traits in `crate::providers`.
pub mod rds;
pub mod runner;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::schema::{CycleMetadata, ResourceInfo, Tenant};

/// Lists one category of cloud resource.
///
/// CONTRACT:
/// - every produced resource is sent to the collector's own output channel
/// - cancellation ends the fetch promptly and is NOT an error
/// - the returned error is reserved for conditions that prevented the
///   fetch from being attempted at all
///
/// THREAD SAFETY:
/// - Must be Send + Sync; instances are shared across cycles
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken, cycle: CycleMetadata) -> anyhow::Result<()>;
}

/// Registry entry for one collector.
#[derive(Clone)]
pub struct RegisteredCollector {
    pub collector: Arc<dyn Collector>,
}

impl RegisteredCollector {
    pub fn new(collector: impl Collector + 'static) -> Self {
        Self {
            collector: Arc::new(collector),
        }
    }
}

impl fmt::Debug for RegisteredCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCollector").finish_non_exhaustive()
    }
}

/// Collectors keyed by name.
pub type CollectorsMap = HashMap<String, RegisteredCollector>;

/// Builds the collectors of one tenant.
///
/// CONTRACT:
/// - synchronous: returns the named collector set immediately
/// - may start producing into `output` before or after returning
/// - producers stop writing once `cancel` fires
/// - the tenant channel closes when the last clone of `output` is dropped,
///   which therefore marks the natural end of production
///
/// Any matching closure is a factory; see [`factory_fn`].
pub trait TenantCollectorFactory: Send + Sync {
    fn build(
        &self,
        tenant: &Tenant,
        output: mpsc::Sender<ResourceInfo>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<CollectorsMap>;
}

impl<F> TenantCollectorFactory for F
where
    F: Fn(&Tenant, mpsc::Sender<ResourceInfo>, &CancellationToken) -> anyhow::Result<CollectorsMap>
        + Send
        + Sync,
{
    fn build(
        &self,
        tenant: &Tenant,
        output: mpsc::Sender<ResourceInfo>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<CollectorsMap> {
        self(tenant, output, cancel)
    }
}

/// Pins a closure to the factory signature so its argument types are inferred.
pub fn factory_fn<F>(f: F) -> F
where
    F: Fn(&Tenant, mpsc::Sender<ResourceInfo>, &CancellationToken) -> anyhow::Result<CollectorsMap>
        + Send
        + Sync,
{
    f
}
