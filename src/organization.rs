use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collector::{CollectorsMap, TenantCollectorFactory};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{ResourceInfo, Tenant, TenantIdentity};

/// ============================================================
/// OrganizationCollectors
/// ============================================================
///
/// Turns "N tenants × one factory" into:
/// - one registry holding every tenant's collectors under
///   `"{account}-{name}"` keys
/// - one forwarding task per tenant pushing that tenant's resources,
///   stamped with the tenant's identity, into the shared root channel
///
/// OWNERSHIP:
/// - the root channel belongs to the caller; forwarders only hold
///   clones of its sender and never close it
/// - each tenant channel is read by exactly one forwarder
///
/// ADMISSION:
/// - a forwarder is spawned before its tenant's factory runs but forwards
///   nothing until the factory has succeeded
/// - if the factory fails, the forwarder discards whatever the factory
///   already produced and ends as `Excluded`
///
/// SHUTDOWN:
/// - every forwarder ends on tenant channel close, on cancellation or
///   when the root receiver is gone
/// - `forwarding.wait()` resolves once all of them have ended
pub struct OrganizationCollectors {
    pub collectors: CollectorsMap,

    /// Factory failures keyed by tenant account
    pub setup_errors: BTreeMap<String, anyhow::Error>,

    pub forwarding: ForwardingHandle,
}

impl OrganizationCollectors {
    /// Builds every tenant's collectors and starts forwarding.
    ///
    /// Returns as soon as all factories have returned; forwarding carries
    /// on in the background. Must be called from within a Tokio runtime.
    ///
    /// PANICS:
    /// - if two collectors end up under the same qualified key, which
    ///   requires two tenants sharing an account id
    pub fn build(
        cancel: &CancellationToken,
        root: &mpsc::Sender<ResourceInfo>,
        tenants: &[Tenant],
        factory: &dyn TenantCollectorFactory,
        tenant_capacity: usize,
    ) -> Self {
        let tracker = TaskTracker::new();
        let mut forwarders = Vec::with_capacity(tenants.len());
        let mut collectors = CollectorsMap::new();
        let mut setup_errors = BTreeMap::new();

        for tenant in tenants {
            let identity = Arc::new(tenant.identity.clone());
            let (tenant_tx, tenant_rx) = mpsc::channel(tenant_capacity.max(1));

            // Started before the factory runs: a factory may produce
            // synchronously before returning.
            let (admit_tx, admit_rx) = oneshot::channel();
            let (state_tx, state_rx) = watch::channel(ForwarderState::Pending);
            let forwarder = Forwarder::new(
                identity.clone(),
                tenant_rx,
                root.clone(),
                cancel.clone(),
                state_tx,
            );
            forwarders.push(TrackedForwarder {
                account: identity.account.clone(),
                state: state_rx,
                join: tracker.spawn(forwarder.run(admit_rx)),
            });

            match factory.build(tenant, tenant_tx, cancel) {
                Ok(tenant_collectors) => {
                    info!(
                        "Tenant {} registered {} collectors",
                        identity,
                        tenant_collectors.len()
                    );
                    RuntimeMetrics::incr(&METRICS.tenants_registered);

                    for (name, registered) in tenant_collectors {
                        let key = format!("{}-{}", identity.account, name);
                        let previous = collectors.insert(key.clone(), registered);
                        assert!(
                            previous.is_none(),
                            "collector key '{key}' registered twice"
                        );
                    }
                    // fails only if the forwarder already saw cancellation
                    let _ = admit_tx.send(());
                }
                Err(e) => {
                    drop(admit_tx);
                    warn!("Failed to build collectors for tenant {}: {:#}", identity, e);
                    RuntimeMetrics::incr(&METRICS.tenant_setup_errors);
                    setup_errors.insert(identity.account.clone(), e);
                }
            }
        }

        tracker.close();

        Self {
            collectors,
            setup_errors,
            forwarding: ForwardingHandle { tracker, forwarders },
        }
    }
}

/// Join point for an organization's forwarding tasks.
pub struct ForwardingHandle {
    tracker: TaskTracker,
    forwarders: Vec<TrackedForwarder>,
}

struct TrackedForwarder {
    account: String,
    state: watch::Receiver<ForwarderState>,
    join: JoinHandle<ForwarderExit>,
}

impl ForwardingHandle {
    /// Number of forwarders that have not reached `Closed` yet.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Resolves once every forwarder has reached `Closed`.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Current state of a tenant's forwarder, `None` for unknown accounts.
    pub fn state(&self, account: &str) -> Option<ForwarderState> {
        self.forwarders
            .iter()
            .find(|f| f.account == account)
            .map(|f| *f.state.borrow())
    }

    /// Waits for every forwarder and reports how each one ended, by account.
    pub async fn join(self) -> HashMap<String, ForwarderExit> {
        let mut exits = HashMap::with_capacity(self.forwarders.len());
        for TrackedForwarder { account, join, .. } in self.forwarders {
            match join.await {
                Ok(exit) => {
                    exits.insert(account, exit);
                }
                Err(e) => warn!("Forwarder for tenant {} did not finish cleanly: {}", account, e),
            }
        }
        exits
    }
}

/// Lifecycle of a forwarder.
///
/// `Pending → Running → Closed` on drain, with a detour through
/// `Terminating` on cancellation, root closure or a failed factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    /// Waiting for the tenant's factory to succeed
    Pending,
    Running,
    Terminating,
    Closed,
}

/// Why a forwarder reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderExit {
    /// Every tenant producer finished and the channel was drained
    Drained,
    /// The shared cancellation token fired
    Cancelled,
    /// The root receiver was dropped
    RootClosed,
    /// The tenant's factory failed; nothing was forwarded
    Excluded,
}

/// Moves one tenant's resources into the root channel.
struct Forwarder {
    identity: Arc<TenantIdentity>,
    tenant_rx: mpsc::Receiver<ResourceInfo>,
    root_tx: mpsc::Sender<ResourceInfo>,
    cancel: CancellationToken,
    state: watch::Sender<ForwarderState>,
}

impl Forwarder {
    fn new(
        identity: Arc<TenantIdentity>,
        tenant_rx: mpsc::Receiver<ResourceInfo>,
        root_tx: mpsc::Sender<ResourceInfo>,
        cancel: CancellationToken,
        state: watch::Sender<ForwarderState>,
    ) -> Self {
        Self {
            identity,
            tenant_rx,
            root_tx,
            cancel,
            state,
        }
    }

    async fn run(mut self, admission: oneshot::Receiver<()>) -> ForwarderExit {
        RuntimeMetrics::incr(&METRICS.forwarders_running);

        let exit = match self.admit(admission).await {
            Ok(()) => {
                self.state.send_replace(ForwarderState::Running);
                self.forward().await
            }
            Err(exit) => exit,
        };

        if exit != ForwarderExit::Drained {
            self.terminate();
        }
        self.state.send_replace(ForwarderState::Closed);
        RuntimeMetrics::decr(&METRICS.forwarders_running);
        debug!("Forwarder for {} closed ({:?})", self.identity, exit);
        exit
    }

    /// Resolves once the factory outcome is known. A dropped admission
    /// sender means the factory failed.
    async fn admit(&self, admission: oneshot::Receiver<()>) -> Result<(), ForwarderExit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ForwarderExit::Cancelled),
            admitted = admission => admitted.map_err(|_| ForwarderExit::Excluded),
        }
    }

    /// Every wait (receive or send) is raced against cancellation,
    /// which is polled first.
    async fn forward(&mut self) -> ForwarderExit {
        loop {
            let info = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break ForwarderExit::Cancelled,
                next = self.tenant_rx.recv() => match next {
                    Some(info) => info,
                    None => break ForwarderExit::Drained,
                },
            };
            RuntimeMetrics::incr(&METRICS.resources_received);

            let info = info.with_identity(self.identity.clone());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    RuntimeMetrics::incr(&METRICS.resources_abandoned);
                    break ForwarderExit::Cancelled;
                }
                sent = self.root_tx.send(info) => {
                    if sent.is_err() {
                        RuntimeMetrics::incr(&METRICS.resources_abandoned);
                        break ForwarderExit::RootClosed;
                    }
                    RuntimeMetrics::incr(&METRICS.resources_forwarded);
                }
            }
        }
    }

    /// Refuses further tenant writes and discards whatever is buffered.
    fn terminate(&mut self) {
        self.state.send_replace(ForwarderState::Terminating);
        self.tenant_rx.close();

        let mut abandoned = 0usize;
        while self.tenant_rx.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            METRICS
                .resources_abandoned
                .fetch_add(abandoned, std::sync::atomic::Ordering::Relaxed);
            debug!("Forwarder for {} abandoned {} buffered resources", self.identity, abandoned);
        }
    }
}
