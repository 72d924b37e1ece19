//! Integration tests for the multi-tenant fan-in.
//!
//! These tests verify registry sizing, identity stamping and that no
//! forwarder or producer task survives shutdown.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tenant_inventory::config::{DemoConfig, TenantConfig};
use tenant_inventory::{
    Collector, CollectorsMap, CycleMetadata, ForwarderExit, InventoryError, OrganizationCollectors,
    RegisteredCollector, Resource, ResourceInfo, ResourceMetadata, Tenant, TenantIdentity,
    factory_fn,
};

const N_ACCOUNTS: usize = 5;
const N_COLLECTORS: usize = 33;
const RESOURCES_PER_ACCOUNT: usize = 111;

/// Resource whose collector filled in the wrong identity.
#[derive(Debug)]
struct MockResource;

impl Resource for MockResource {
    fn data(&self) -> Value {
        json!({})
    }

    fn metadata(&self) -> Result<ResourceMetadata, InventoryError> {
        Ok(ResourceMetadata {
            region: "some-region".into(),
            account_id: "some-id".into(),
            account_alias: "some-alias".into(),
            ..Default::default()
        })
    }

    fn normalized_view(&self) -> Value {
        json!({})
    }
}

struct NoopCollector;

#[async_trait::async_trait]
impl Collector for NoopCollector {
    async fn fetch(&self, _: &CancellationToken, _: CycleMetadata) -> anyhow::Result<()> {
        Ok(())
    }
}

fn tenant(account: &str, alias: &str) -> Tenant {
    Tenant {
        identity: TenantIdentity {
            provider: "aws".into(),
            account: account.into(),
            account_alias: alias.into(),
        },
        config: TenantConfig {
            provider: "aws".into(),
            account: account.into(),
            alias: Some(alias.into()),
            regions: vec![],
            demo: DemoConfig::default(),
        },
    }
}

fn tenants(n: usize) -> Vec<Tenant> {
    (0..n)
        .map(|i| tenant(&format!("account-{i}"), &format!("alias-{i}")))
        .collect()
}

fn noop_collectors(n: usize) -> CollectorsMap {
    (0..n)
        .map(|i| (format!("collector-{i}"), RegisteredCollector::new(NoopCollector)))
        .collect()
}

/// Sends `count` resources, stopping early on cancellation or a closed channel.
async fn produce(tx: mpsc::Sender<ResourceInfo>, cancel: CancellationToken, count: usize) {
    for i in 0..count {
        let info = ResourceInfo::new(MockResource, CycleMetadata { sequence: i as i64 });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(info) => if sent.is_err() { return },
        }
    }
}

async fn collect_with_timeout(
    rx: &mut mpsc::Receiver<ResourceInfo>,
    expected: usize,
    limit: Duration,
) -> Vec<ResourceInfo> {
    let mut out = Vec::with_capacity(expected);
    let _ = timeout(limit, async {
        while out.len() < expected {
            match rx.recv().await {
                Some(info) => out.push(info),
                None => break,
            }
        }
    })
    .await;
    out
}

async fn assert_no_leaks(org_forwarding: &tenant_inventory::ForwardingHandle, producers: &TaskTracker) {
    producers.close();
    timeout(Duration::from_secs(1), producers.wait())
        .await
        .expect("producer tasks leaked");
    timeout(Duration::from_secs(1), org_forwarding.wait())
        .await
        .expect("forwarding tasks leaked");
    assert_eq!(org_forwarding.outstanding(), 0);
    assert_eq!(producers.len(), 0);
}

async fn organization_subtest(drain: bool) {
    let cancel = CancellationToken::new();
    let producers = TaskTracker::new();
    let (root_tx, mut root_rx) = mpsc::channel(1);

    let factory = {
        let producers = producers.clone();
        factory_fn(move |_: &Tenant, tx, cancel: &CancellationToken| {
            if drain {
                producers.spawn(produce(tx, cancel.clone(), RESOURCES_PER_ACCOUNT));
            }
            Ok(noop_collectors(N_COLLECTORS))
        })
    };

    let org = OrganizationCollectors::build(&cancel, &root_tx, &tenants(N_ACCOUNTS), &factory, 8);
    drop(root_tx);

    assert_eq!(org.collectors.len(), N_ACCOUNTS * N_COLLECTORS);
    assert!(org.setup_errors.is_empty());

    if drain {
        let expected = N_ACCOUNTS * RESOURCES_PER_ACCOUNT;
        let resources = collect_with_timeout(&mut root_rx, expected, Duration::from_secs(1)).await;
        assert_eq!(resources.len(), expected, "Correct amount of resources fetched");

        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for info in &resources {
            assert_eq!(info.resource.data(), json!({}));
            assert_eq!(info.resource.normalized_view(), json!({}));
            let meta = info.resource.metadata().unwrap();
            assert_eq!(meta.region, "some-region");
            assert_ne!(meta.account_id, "some-id");
            assert_ne!(meta.account_alias, "some-alias");
            *name_counts.entry(meta.account_id).or_default() += 1;
            *name_counts.entry(meta.account_alias).or_default() += 1;
        }
        assert_eq!(name_counts.len(), 2 * N_ACCOUNTS);
        assert!(name_counts.values().all(|v| *v == RESOURCES_PER_ACCOUNT));

        // every producer is done, so the root channel ends instead of hanging
        drop(org.collectors);
        let next = timeout(Duration::from_secs(1), root_rx.recv()).await;
        assert!(matches!(next, Ok(None)), "Channel not drained");
    }

    cancel.cancel();
    assert_no_leaks(&org.forwarding, &producers).await;
}

#[tokio::test]
async fn organization_leak_drain() {
    organization_subtest(true).await;
}

#[tokio::test]
async fn organization_leak_no_drain() {
    organization_subtest(false).await;
}

#[tokio::test]
async fn cancellation_releases_blocked_forwarder() {
    let cancel = CancellationToken::new();
    // nobody reads the root channel: the second send blocks
    let (root_tx, _root_rx) = mpsc::channel(1);

    let factory = factory_fn(|_: &Tenant, tx: mpsc::Sender<ResourceInfo>, _: &CancellationToken| {
        for sequence in 0..2 {
            tx.try_send(ResourceInfo::new(MockResource, CycleMetadata { sequence }))?;
        }
        Ok(CollectorsMap::from([(
            "collector".to_string(),
            RegisteredCollector::new(NoopCollector),
        )]))
    });

    let org = OrganizationCollectors::build(&cancel, &root_tx, &[tenant("1", "account")], &factory, 4);
    assert_eq!(org.collectors.len(), 1);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(org.forwarding.outstanding(), 1);

    cancel.cancel();
    let exits = timeout(Duration::from_secs(1), org.forwarding.join())
        .await
        .expect("forwarder must observe cancellation mid-send");
    assert_eq!(exits["1"], ForwarderExit::Cancelled);
}

#[tokio::test]
async fn closed_tenant_channel_ends_forwarder() {
    let (root_tx, mut root_rx) = mpsc::channel(1);

    let factory = factory_fn(|_: &Tenant, tx: mpsc::Sender<ResourceInfo>, _: &CancellationToken| {
        drop(tx);
        Ok(CollectorsMap::from([(
            "collector".to_string(),
            RegisteredCollector::new(NoopCollector),
        )]))
    });

    let org = OrganizationCollectors::build(
        &CancellationToken::new(),
        &root_tx,
        &[tenant("1", "account")],
        &factory,
        4,
    );

    let exits = timeout(Duration::from_secs(1), org.forwarding.join())
        .await
        .expect("forwarder must end when its tenant channel closes");
    assert_eq!(exits["1"], ForwarderExit::Drained);
    assert!(root_rx.try_recv().is_err());
}

#[tokio::test]
async fn consumer_abandonment_stops_everything() {
    let producers = TaskTracker::new();
    let (root_tx, mut root_rx) = mpsc::channel(1);

    let factory = {
        let producers = producers.clone();
        factory_fn(move |_: &Tenant, tx, cancel: &CancellationToken| {
            producers.spawn(produce(tx, cancel.clone(), usize::MAX));
            Ok(noop_collectors(1))
        })
    };

    let cancel = CancellationToken::new();
    let org = OrganizationCollectors::build(&cancel, &root_tx, &tenants(3), &factory, 2);
    drop(root_tx);

    let first = collect_with_timeout(&mut root_rx, 10, Duration::from_secs(1)).await;
    assert_eq!(first.len(), 10);
    drop(root_rx);

    let exits = timeout(Duration::from_secs(1), org.forwarding.join())
        .await
        .expect("forwarders must stop once the consumer is gone");
    assert_eq!(exits.len(), 3);
    assert!(exits.values().all(|e| *e == ForwarderExit::RootClosed));

    producers.close();
    timeout(Duration::from_secs(1), producers.wait())
        .await
        .expect("producers must stop once their tenant channel is refused");
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn cancel_before_drain_truncates_output() {
    let cancel = CancellationToken::new();
    let producers = TaskTracker::new();
    let (root_tx, mut root_rx) = mpsc::channel(4);

    let factory = {
        let producers = producers.clone();
        factory_fn(move |_: &Tenant, tx, cancel: &CancellationToken| {
            producers.spawn(produce(tx, cancel.clone(), RESOURCES_PER_ACCOUNT));
            Ok(noop_collectors(2))
        })
    };

    let org = OrganizationCollectors::build(&cancel, &root_tx, &tenants(N_ACCOUNTS), &factory, 2);
    cancel.cancel();
    assert_no_leaks(&org.forwarding, &producers).await;

    let mut received = 0;
    while root_rx.try_recv().is_ok() {
        received += 1;
    }
    assert!(received < N_ACCOUNTS * RESOURCES_PER_ACCOUNT);
}
