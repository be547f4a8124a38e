//! Consume loop.
//!
//! Polls a [`MessageSource`] and spawns a task per message to forward it.
//! Polling never waits on forwarding; outcomes are logged by the forwarder
//! and otherwise dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::forward::{ForwardOutcome, Forwarder};
use crate::queue::MessageSource;

/// Tuning for one consume loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Pause after a failed or empty fetch
    pub backoff: Duration,
    /// How long in-flight forwards may run after the stop signal
    pub shutdown_grace: Duration,
    /// Optional cap on concurrent forwards; `None` means unbounded
    pub max_in_flight: Option<usize>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(8),
            shutdown_grace: Duration::from_secs(10),
            max_in_flight: None,
        }
    }
}

/// Counters reported when a consume loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches: u64,
    pub dispatched: u64,
    pub fetch_failures: u64,
    pub delivered: u64,
    /// Messages of the last batch left undispatched because a stop arrived
    pub skipped: u64,
    /// Forwards still running when the shutdown grace window ran out
    pub abandoned: usize,
}

impl ConsumerStats {
    fn record(&mut self, joined: Result<ForwardOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) if outcome.is_delivered() => self.delivered += 1,
            Ok(_) => {}
            Err(e) if e.is_panic() => error!(error = %e, "forward_task_panicked"),
            Err(_) => {}
        }
    }
}

/// Resolve once the stop flag is `true` or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Wait out `duration`, returning early with `true` if a stop was requested.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stopped(shutdown) => true,
    }
}

/// Run the consume loop until `shutdown` flips to `true` (or its sender is dropped).
///
/// Fetch failures are logged and retried after `backoff`; they never end
/// the loop. On stop, no new fetch is issued and in-flight forwards get up
/// to `shutdown_grace` to finish before they are left to run detached.
pub async fn run_consumer<S: MessageSource>(
    mut source: S,
    forwarder: Arc<Forwarder>,
    settings: ConsumerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> ConsumerStats {
    let limiter = settings.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
    let mut in_flight: JoinSet<ForwardOutcome> = JoinSet::new();
    let mut stats = ConsumerStats::default();

    info!(
        backoff_ms = settings.backoff.as_millis() as u64,
        max_in_flight = ?settings.max_in_flight,
        "consumer_started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            fetched = source.fetch() => fetched,
        };

        match fetched {
            Ok(batch) if batch.is_empty() => {
                debug!("queue_batch_empty");
                if pause(settings.backoff, &mut shutdown).await {
                    break;
                }
            }
            Ok(batch) => {
                stats.batches += 1;
                let batch_size = batch.len() as u64;
                debug!(batch_size, "queue_batch_received");

                let mut dispatched = 0;
                for message in batch {
                    // Waiting for a permit must not outlive a stop request.
                    let permit = match &limiter {
                        Some(limiter) => tokio::select! {
                            biased;
                            _ = stopped(&mut shutdown) => break,
                            permit = Arc::clone(limiter).acquire_owned() => permit.ok(),
                        },
                        None => None,
                    };
                    let forwarder = Arc::clone(&forwarder);

                    in_flight.spawn(async move {
                        let _permit = permit;
                        forwarder.forward(message).await
                    });
                    dispatched += 1;
                }
                stats.dispatched += dispatched;

                if let Err(e) = source.commit().await {
                    warn!(error = %e, "queue_commit_failed");
                }

                if dispatched < batch_size {
                    stats.skipped = batch_size - dispatched;
                    warn!(skipped = stats.skipped, "consumer_batch_cut_short");
                    break;
                }
            }
            Err(e) => {
                stats.fetch_failures += 1;
                warn!(
                    error = %e,
                    backoff_ms = settings.backoff.as_millis() as u64,
                    "queue_fetch_failed"
                );
                if pause(settings.backoff, &mut shutdown).await {
                    break;
                }
            }
        }

        while let Some(joined) = in_flight.try_join_next() {
            stats.record(joined);
        }
    }

    info!(in_flight = in_flight.len(), "consumer_stopping");

    let drain = async {
        while let Some(joined) = in_flight.join_next().await {
            stats.record(joined);
        }
    };
    if tokio::time::timeout(settings.shutdown_grace, drain).await.is_err() {
        stats.abandoned = in_flight.len();
        warn!(abandoned = stats.abandoned, "consumer_forwards_abandoned");
        in_flight.detach_all();
    }

    source.close().await;

    info!(
        batches = stats.batches,
        dispatched = stats.dispatched,
        delivered = stats.delivered,
        skipped = stats.skipped,
        fetch_failures = stats.fetch_failures,
        "consumer_stopped"
    );

    stats
}
