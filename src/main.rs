use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tenant_inventory::collector::runner::{CycleOptions, run_cycle};
use tenant_inventory::config::Config;
use tenant_inventory::metrics::METRICS;
use tenant_inventory::providers::{self, identity};
use tenant_inventory::{CycleMetadata, OrganizationCollectors, ResourceInfo, Tenant};

const DRAIN_GRACE: Duration = Duration::from_secs(10);

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize logging
// - Load configuration
// - Resolve tenant identities
// - Build one organization per provider, all feeding one root channel
// - Run collection cycles until the budget is spent or Ctrl-C
// - Shut down without leaving tasks behind
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = env::var("INVENTORY_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::load(&path)?;
    let inventory = config.inventory.clone();

    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();

    // --------------------------------------------------------
    // Background helpers: Ctrl-C watcher and metrics reporter
    // --------------------------------------------------------
    tasks.spawn(watch_ctrl_c(cancel.clone()));
    tasks.spawn(report_metrics(cancel.clone()));

    let (tenants, failures) =
        identity::resolve_tenants(&identity::ConfigIdentityProvider, &config.tenants).await;
    if !failures.is_empty() {
        warn!("{} tenants skipped during identity resolution", failures.len());
    }

    // --------------------------------------------------------
    // Root channel: owned here, fed by every forwarder
    // --------------------------------------------------------
    let (root_tx, root_rx) = mpsc::channel(inventory.root_channel_capacity);
    let consumer = tasks.spawn(consume(root_rx, config.debug_log()));

    let mut organizations = Vec::new();
    for (provider, tenants) in group_by_provider(tenants) {
        let Some(factory) = providers::get_factory(&provider, &inventory) else {
            error!("Provider '{}' is not supported; skipping {} tenants", provider, tenants.len());
            continue;
        };

        info!("Starting {} organization with {} tenants", provider, tenants.len());
        let org = OrganizationCollectors::build(
            &cancel,
            &root_tx,
            &tenants,
            factory.as_ref(),
            inventory.tenant_channel_capacity,
        );
        for (account, e) in &org.setup_errors {
            warn!("Tenant {} excluded: {:#}", account, e);
        }
        organizations.push(org);
    }

    // the root channel closes once the last forwarder is gone
    drop(root_tx);

    // --------------------------------------------------------
    // Collection cycles
    // --------------------------------------------------------
    let options = CycleOptions {
        concurrency: inventory.collector_concurrency,
        timeout: inventory.collector_timeout(),
    };
    let mut sequence = 0i64;
    loop {
        for org in &organizations {
            run_cycle(&cancel, &org.collectors, CycleMetadata { sequence }, options).await;
        }
        sequence += 1;

        if cancel.is_cancelled() || inventory.cycles.is_some_and(|n| sequence as u64 >= n) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(inventory.cycle_interval()) => {}
        }
    }

    // --------------------------------------------------------
    // Shutdown
    //
    // Dropping the collectors releases every tenant sender, so the
    // forwarders drain and close. Whatever is still running after the
    // grace period is cancelled.
    // --------------------------------------------------------
    let forwarding: Vec<_> = organizations.into_iter().map(|org| org.forwarding).collect();
    let drained = timeout(DRAIN_GRACE, async {
        for handle in &forwarding {
            handle.wait().await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Forwarders still busy after {:?}; cancelling", DRAIN_GRACE);
    }

    cancel.cancel();
    for handle in forwarding {
        let exits = handle.join().await;
        debug!("Forwarder exits: {:?}", exits);
    }

    tasks.close();
    tasks.wait().await;

    let consumed = consumer.await.unwrap_or_default();
    info!("Inventory finished: {} resources consumed over {} cycles", consumed, sequence);
    info!("[METRICS] {}", **METRICS);

    Ok(())
}

/// Groups tenants by provider tag, preserving configuration order per group.
fn group_by_provider(tenants: Vec<Tenant>) -> BTreeMap<String, Vec<Tenant>> {
    let mut groups: BTreeMap<String, Vec<Tenant>> = BTreeMap::new();
    for tenant in tenants {
        groups
            .entry(tenant.identity.provider.clone())
            .or_default()
            .push(tenant);
    }
    groups
}

/// Reads the root channel until every forwarder has dropped its sender.
async fn consume(mut root_rx: mpsc::Receiver<ResourceInfo>, debug_log: bool) -> usize {
    let mut consumed = 0;
    while let Some(info) = root_rx.recv().await {
        consumed += 1;
        if !debug_log {
            continue;
        }

        match info.resource.metadata() {
            Ok(metadata) => info!(
                "{}",
                json!({
                    "cycle": info.cycle.sequence,
                    "metadata": metadata,
                    "event": info.resource.normalized_view(),
                })
            ),
            Err(e) => warn!("Resource without metadata in cycle {}: {}", info.cycle.sequence, e),
        }
    }
    consumed
}

async fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Interrupted; shutting down");
                cancel.cancel();
            }
            Err(e) => {
                error!("Unable to listen for Ctrl-C: {}", e);
                cancel.cancelled().await;
            }
        },
    }
}

/// Periodic, low-noise metrics line.
async fn report_metrics(cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(Duration::from_secs(10)) => info!("[METRICS] {}", **METRICS),
        }
    }
}
