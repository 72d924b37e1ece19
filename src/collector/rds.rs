use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use log::{debug, info, warn};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Collector;
use crate::error::InventoryError;
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::providers::rds::{DbInstance, RdsProvider};
use crate::schema::{CycleMetadata, Resource, ResourceInfo, ResourceMetadata};

const RESOURCE_TYPE: &str = "cloud-database";
const SUB_TYPE: &str = "aws-rds";

/// Multi-region RDS instance collector.
///
/// Fans out over every configured region, at most `concurrency` at a time.
///
/// GUARANTEES:
/// - a failing region is logged and skipped; it never fails the fetch
///   and never stops the other regions
/// - instances of one region are sent in the order the API listed them
/// - zero regions, or every region failing, is a successful empty fetch
pub struct RdsCollector {
    providers: HashMap<String, Arc<dyn RdsProvider>>,
    resource_tx: mpsc::Sender<ResourceInfo>,
    concurrency: usize,
}

/// How one region's listing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionOutcome {
    Listed(usize),
    Failed,
    Interrupted,
}

impl RdsCollector {
    pub fn new(
        providers: HashMap<String, Arc<dyn RdsProvider>>,
        resource_tx: mpsc::Sender<ResourceInfo>,
        concurrency: usize,
    ) -> Self {
        Self {
            providers,
            resource_tx,
            concurrency,
        }
    }

    async fn fetch_region(
        &self,
        cancel: &CancellationToken,
        region: &str,
        provider: &dyn RdsProvider,
        cycle: CycleMetadata,
    ) -> RegionOutcome {
        let instances = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RegionOutcome::Interrupted,
            listed = provider.describe_db_instances() => match listed {
                Ok(instances) => instances,
                Err(e) => {
                    warn!("Failed to describe DB instances in {}: {:#}", region, e);
                    RuntimeMetrics::incr(&METRICS.region_errors);
                    return RegionOutcome::Failed;
                }
            },
        };

        let count = instances.len();
        for instance in instances {
            let info = ResourceInfo::new(RdsResource::new(instance, region), cycle);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RegionOutcome::Interrupted,
                sent = self.resource_tx.send(info) => {
                    if sent.is_err() {
                        debug!("RDS output channel closed while sending {} results", region);
                        return RegionOutcome::Interrupted;
                    }
                }
            }
        }

        RegionOutcome::Listed(count)
    }
}

#[async_trait::async_trait]
impl Collector for RdsCollector {
    async fn fetch(&self, cancel: &CancellationToken, cycle: CycleMetadata) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            return Err(InventoryError::InvalidConfig(
                "RDS region concurrency must be greater than zero".into(),
            )
            .into());
        }

        debug!(
            "Starting RDS fetch over {} regions (cycle {})",
            self.providers.len(),
            cycle.sequence
        );

        let region_futures: Vec<_> = self
            .providers
            .iter()
            .map(|(region, provider)| self.fetch_region(cancel, region, provider.as_ref(), cycle))
            .collect();
        let outcomes: Vec<RegionOutcome> = stream::iter(region_futures)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let listed: usize = outcomes
            .iter()
            .map(|o| match o {
                RegionOutcome::Listed(n) => *n,
                _ => 0,
            })
            .sum();
        let failed = outcomes
            .iter()
            .filter(|o| **o == RegionOutcome::Failed)
            .count();

        if outcomes.contains(&RegionOutcome::Interrupted) {
            debug!("RDS fetch interrupted after {} instances", listed);
        } else {
            info!(
                "RDS fetch done: {} instances, {} of {} regions failed",
                listed,
                failed,
                outcomes.len()
            );
        }

        Ok(())
    }
}

/// An RDS instance bound to the region it was listed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdsResource {
    pub instance: DbInstance,
    pub region: String,
}

impl RdsResource {
    pub fn new(instance: DbInstance, region: impl Into<String>) -> Self {
        Self {
            instance,
            region: region.into(),
        }
    }
}

impl Resource for RdsResource {
    fn data(&self) -> Value {
        serde_json::to_value(&self.instance).unwrap_or_default()
    }

    fn metadata(&self) -> Result<ResourceMetadata, InventoryError> {
        if self.instance.arn.is_empty() {
            return Err(InventoryError::Metadata(format!(
                "RDS instance '{}' has no ARN",
                self.instance.identifier
            )));
        }

        Ok(ResourceMetadata {
            id: self.instance.arn.clone(),
            resource_type: RESOURCE_TYPE.to_string(),
            sub_type: SUB_TYPE.to_string(),
            name: self.instance.identifier.clone(),
            region: self.region.clone(),
            ..Default::default()
        })
    }

    fn normalized_view(&self) -> Value {
        json!({
            "cloud": {
                "provider": "aws",
                "region": self.region,
                "service": { "name": "AWS RDS" },
            },
            "resource": {
                "id": self.instance.arn,
                "name": self.instance.identifier,
            },
        })
    }
}
