use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::rds::{DbInstance, RdsProvider};
use crate::collector::rds::RdsCollector;
use crate::collector::{CollectorsMap, RegisteredCollector, TenantCollectorFactory};
use crate::error::InventoryError;
use crate::schema::{ResourceInfo, Tenant};

const ENGINES: [&str; 4] = ["postgres", "mysql", "mariadb", "aurora-postgresql"];

/// Synthetic RDS API for running without cloud credentials.
///
/// Each call sleeps a few milliseconds and returns `instances` random
/// instances, or fails when the region is configured as failing.
pub struct DemoRdsProvider {
    account: String,
    region: String,
    instances: usize,
    failing: bool,
}

impl DemoRdsProvider {
    pub fn new(account: &str, region: &str, instances: usize, failing: bool) -> Self {
        Self {
            account: account.to_string(),
            region: region.to_string(),
            instances,
            failing,
        }
    }

    fn generate(&self) -> Vec<DbInstance> {
        let mut rng = rand::rng();
        (0..self.instances)
            .map(|i| {
                let identifier = format!("db-{}-{}", self.region, i);
                DbInstance {
                    arn: format!(
                        "arn:aws:rds:{}:{}:db:{}",
                        self.region, self.account, identifier
                    ),
                    identifier,
                    engine: ENGINES[rng.random_range(0..ENGINES.len())].to_string(),
                    storage_encrypted: rng.random_bool(0.7),
                    auto_minor_version_upgrade: rng.random_bool(0.5),
                    publicly_accessible: rng.random_bool(0.1),
                    created_at: Some(Utc::now() - ChronoDuration::days(rng.random_range(0..720))),
                }
            })
            .collect()
    }
}

#[async_trait]
impl RdsProvider for DemoRdsProvider {
    async fn describe_db_instances(&self) -> anyhow::Result<Vec<DbInstance>> {
        sleep(Duration::from_millis(rand::random_range(5..50))).await;

        if self.failing {
            return Err(anyhow!(
                "AccessDenied: not authorized to perform rds:DescribeDBInstances in {}",
                self.region
            ));
        }
        Ok(self.generate())
    }
}

/// Builds an `rds` collector per AWS tenant backed by demo providers.
pub struct DemoAwsFactory {
    pub region_concurrency: usize,
}

impl TenantCollectorFactory for DemoAwsFactory {
    fn build(
        &self,
        tenant: &Tenant,
        output: mpsc::Sender<ResourceInfo>,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<CollectorsMap> {
        let cfg = &tenant.config;
        if cfg.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(InventoryError::InvalidConfig(format!(
                "tenant '{}' lists a blank region",
                tenant.identity.account
            ))
            .into());
        }

        let providers: HashMap<String, Arc<dyn RdsProvider>> = cfg
            .regions
            .iter()
            .map(|region| {
                let provider = DemoRdsProvider::new(
                    &tenant.identity.account,
                    region,
                    cfg.demo.instances_per_region,
                    cfg.demo.failing_regions.contains(region),
                );
                (region.clone(), Arc::new(provider) as Arc<dyn RdsProvider>)
            })
            .collect();

        let rds = RdsCollector::new(providers, output, self.region_concurrency);
        Ok(CollectorsMap::from([(
            "rds".to_string(),
            RegisteredCollector::new(rds),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoConfig, TenantConfig};
    use crate::schema::TenantIdentity;

    fn tenant(regions: &[&str], failing: &[&str]) -> Tenant {
        Tenant {
            identity: TenantIdentity {
                provider: "aws".into(),
                account: "555".into(),
                account_alias: "demo".into(),
            },
            config: TenantConfig {
                provider: "aws".into(),
                account: "555".into(),
                alias: None,
                regions: regions.iter().map(|r| r.to_string()).collect(),
                demo: DemoConfig {
                    instances_per_region: 3,
                    failing_regions: failing.iter().map(|r| r.to_string()).collect(),
                },
            },
        }
    }

    #[tokio::test]
    async fn provider_generates_configured_count() {
        let provider = DemoRdsProvider::new("555", "us-east-1", 4, false);
        let instances = provider.describe_db_instances().await.unwrap();
        assert_eq!(instances.len(), 4);
        assert!(instances[0].arn.starts_with("arn:aws:rds:us-east-1:555:db:"));
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let provider = DemoRdsProvider::new("555", "us-east-1", 4, true);
        assert!(provider.describe_db_instances().await.is_err());
    }

    #[test]
    fn factory_rejects_blank_region() {
        let factory = DemoAwsFactory { region_concurrency: 2 };
        let (tx, _rx) = mpsc::channel(1);
        let err = factory
            .build(&tenant(&["us-east-1", " "], &[]), tx, &CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("blank region"));
    }

    #[tokio::test]
    async fn tenant_without_regions_gets_empty_collector() {
        let factory = DemoAwsFactory { region_concurrency: 2 };
        let (tx, mut rx) = mpsc::channel(1);
        let collectors = factory
            .build(&tenant(&[], &[]), tx, &CancellationToken::new())
            .unwrap();

        collectors["rds"]
            .collector
            .fetch(&CancellationToken::new(), Default::default())
            .await
            .unwrap();
        drop(collectors);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn factory_collector_skips_failing_region() {
        let factory = DemoAwsFactory { region_concurrency: 2 };
        let (tx, mut rx) = mpsc::channel(16);
        let collectors = factory
            .build(
                &tenant(&["us-east-1", "eu-west-1"], &["eu-west-1"]),
                tx,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(collectors.len(), 1);
        collectors["rds"]
            .collector
            .fetch(&CancellationToken::new(), Default::default())
            .await
            .unwrap();
        drop(collectors);

        let mut regions = Vec::new();
        while let Some(info) = rx.recv().await {
            regions.push(info.resource.metadata().unwrap().region);
        }
        assert_eq!(regions, vec!["us-east-1"; 3]);
    }
}
