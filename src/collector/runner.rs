use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::{CollectorsMap, RegisteredCollector};
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::CycleMetadata;

/// Limits applied to one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    /// Maximum collectors fetching at once
    pub concurrency: usize,

    /// Upper bound on a single fetch
    pub timeout: Duration,
}

/// Tally of one cycle, by collector outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// Runs every registered collector once for `cycle`.
///
/// BEHAVIOR:
/// - at most `options.concurrency` fetches in flight
/// - a failing or slow collector is logged and counted, never fatal
/// - cancellation stops waiting collectors and interrupts running ones
///
/// All fetches run inside this future; nothing outlives the call.
pub async fn run_cycle(
    cancel: &CancellationToken,
    collectors: &CollectorsMap,
    cycle: CycleMetadata,
    options: CycleOptions,
) -> CycleReport {
    let semaphore = Semaphore::new(options.concurrency.max(1));

    let fetches = collectors.iter().map(|(name, registered)| {
        run_one(cancel, &semaphore, name, registered, cycle, options.timeout)
    });
    let outcomes = join_all(fetches).await;

    let mut report = CycleReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Succeeded => report.succeeded += 1,
            Outcome::Failed => report.failed += 1,
            Outcome::TimedOut => report.timed_out += 1,
            Outcome::Cancelled => report.cancelled += 1,
        }
    }

    if report.cancelled == 0 {
        RuntimeMetrics::incr(&METRICS.cycles_completed);
    }
    info!(
        "Cycle {} finished: ok={} failed={} timed_out={} cancelled={}",
        cycle.sequence, report.succeeded, report.failed, report.timed_out, report.cancelled
    );
    report
}

async fn run_one(
    cancel: &CancellationToken,
    semaphore: &Semaphore,
    name: &str,
    registered: &RegisteredCollector,
    cycle: CycleMetadata,
    limit: Duration,
) -> Outcome {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Cancelled,
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return Outcome::Cancelled,
        },
    };

    debug!("Running collector {} (cycle {})", name, cycle.sequence);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        result = timeout(limit, registered.collector.fetch(cancel, cycle)) => match result {
            Ok(Ok(())) => Outcome::Succeeded,
            Ok(Err(e)) => {
                warn!("Collector {} failed: {:#}", name, e);
                RuntimeMetrics::incr(&METRICS.collector_errors);
                Outcome::Failed
            }
            Err(_) => {
                warn!("Collector {} timed out after {:?}", name, limit);
                RuntimeMetrics::incr(&METRICS.collector_timeouts);
                Outcome::TimedOut
            }
        },
    }
}
