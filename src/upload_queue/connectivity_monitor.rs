//! Background reachability monitor.
//!
//! Probes the backend on a fixed interval and publishes the result through a
//! watch channel. Transitions are logged to the store, and a transition to
//! online wakes the upload workers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::{ConnectivityEvent, MonitorState};
use super::queue_store::UploadQueueStore;
use super::transport::{ConnectivityProbe, ProbeOutcome};
use super::unix_now;
use super::wake::WakeSignal;

pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    store: Arc<dyn UploadQueueStore>,
    wake: WakeSignal,
    state: watch::Sender<MonitorState>,
    check_interval: Duration,
    probe_timeout: Duration,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn UploadQueueStore>,
        wake: WakeSignal,
        check_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let (state, _rx) = watch::channel(MonitorState::Unknown);
        Self {
            probe,
            store,
            wake,
            state,
            check_interval,
            probe_timeout,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == MonitorState::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Probe once and publish the result.
    ///
    /// One probe is enough in both directions: a reachable probe declares
    /// online, a failed or erroring probe declares offline.
    pub async fn check_now(&self) -> MonitorState {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.probe_timeout, self.probe.probe()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ProbeOutcome::unreachable(started.elapsed(), format!("{:#}", e)),
            Err(_) => ProbeOutcome::unreachable(
                started.elapsed(),
                format!("probe timed out after {:?}", self.probe_timeout),
            ),
        };

        let new_state = if outcome.reachable {
            MonitorState::Online
        } else {
            MonitorState::Offline
        };
        let previous = self.state.send_replace(new_state);

        if previous != new_state {
            self.record_transition(new_state, &outcome);
            if new_state == MonitorState::Online {
                self.wake.notify();
            }
        } else {
            debug!(
                "Connectivity unchanged: {} ({} ms)",
                new_state.as_db_str(),
                outcome.latency.as_millis()
            );
        }
        new_state
    }

    fn record_transition(&self, state: MonitorState, outcome: &ProbeOutcome) {
        let latency_ms = outcome.latency.as_millis() as u64;
        match state {
            MonitorState::Online => info!("Backend reachable ({} ms)", latency_ms),
            _ => warn!(
                "Backend unreachable: {}",
                outcome.error.as_deref().unwrap_or("no detail")
            ),
        }

        let event = ConnectivityEvent {
            timestamp: unix_now(),
            status: state,
            latency_ms: outcome.reachable.then_some(latency_ms),
            error: outcome.error.clone(),
        };
        if let Err(e) = self.store.append_connectivity_event(&event) {
            error!("Failed to record connectivity event: {:#}", e);
        }
    }

    /// Main loop - call from a spawned task.
    ///
    /// Probes immediately, then once per check interval until `shutdown`.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Connectivity monitor starting (interval={}s)",
            self.check_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = self.check_now() => {}
                _ = shutdown.cancelled() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Connectivity monitor stopped");
    }
}
