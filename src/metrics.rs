use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Global runtime metrics for the inventory.
///
/// Lock-free counters, safe to bump from any task.
#[derive(Default)]
pub struct RuntimeMetrics {
    // Organization level
    pub tenants_registered: AtomicUsize,
    pub tenant_setup_errors: AtomicUsize,
    pub forwarders_running: AtomicUsize,

    // Throughput
    pub resources_received: AtomicUsize,
    pub resources_forwarded: AtomicUsize,
    pub resources_abandoned: AtomicUsize,

    // Collectors
    pub region_errors: AtomicUsize,
    pub collector_errors: AtomicUsize,
    pub collector_timeouts: AtomicUsize,
    pub cycles_completed: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }
}

impl fmt::Display for RuntimeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        write!(
            f,
            "registered={} setup_err={} fwd={} recv={} sent={} abandoned={} region_err={} collector_err={} timeouts={} cycles={}",
            get(&self.tenants_registered),
            get(&self.tenant_setup_errors),
            get(&self.forwarders_running),
            get(&self.resources_received),
            get(&self.resources_forwarded),
            get(&self.resources_abandoned),
            get(&self.region_errors),
            get(&self.collector_errors),
            get(&self.collector_timeouts),
            get(&self.cycles_completed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
