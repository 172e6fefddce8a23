//! Lifecycle owner of the detect-then-broadcast loop.
//!
//! A [`SniperSession`] is constructed explicitly and shared by cloning; every
//! clone drives the same state. Public operations only touch in-memory state
//! and spawn or cancel tasks, so they never wait on the network.

use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use sniper_domain::{
    config::SniperSettings,
    model::{BroadcastResult, Payload, QuickCheckOutcome, SessionStatus},
};

use crate::{
    broadcaster::Broadcaster,
    cancel::{CancelSource, CancelToken},
    detector::{matching_tx_ids, SeenTransactions},
    poller::EndpointPoller,
    rate_limit::TxRateLimiter,
    rpc::NodeClient,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("sniper service already running")]
    AlreadyRunning,
    #[error("sniper service not running")]
    NotRunning,
    #[error("sniper service has been shut down")]
    ShutDown,
}

#[derive(Clone)]
pub struct SniperSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    settings: SniperSettings,
    poller: EndpointPoller,
    broadcaster: Broadcaster,
    state: Mutex<SessionState>,
    shutdown: CancelSource,
    // Number of supervised background tasks still running.
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight count when a supervised task ends, including
/// when it is aborted or panics.
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[derive(Default)]
struct SessionState {
    running: bool,
    target_address: String,
    payload: Payload,
    seen: SeenTransactions,
    broadcast_log: Vec<BroadcastResult>,
    last_check_time: Option<DateTime<Utc>>,
    // Bumped on every start; work tagged with an older value is discarded.
    generation: u64,
    run: Option<ActiveRun>,
}

impl SessionState {
    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }
}

struct ActiveRun {
    cancel: CancelSource,
    task: JoinHandle<()>,
}

impl SniperSession {
    /// Builds a session whose poller and broadcaster share one rate limiter
    /// and talk to the nodes through `client`.
    pub fn new(settings: SniperSettings, client: Arc<dyn NodeClient>) -> Self {
        let limiter = Arc::new(TxRateLimiter::new(
            settings.rate_limit_per_second(),
            settings.rate_limit_burst(),
        ));
        let poller = EndpointPoller::new(
            Arc::clone(&client),
            settings.query_endpoints().to_vec(),
            Arc::clone(&limiter),
        );
        let broadcaster = Broadcaster::new(
            client,
            settings.broadcast_endpoints().to_vec(),
            limiter,
            settings.broadcast_timeout(),
        );

        Self {
            inner: Arc::new(SessionInner {
                settings,
                poller,
                broadcaster,
                state: Mutex::new(SessionState::default()),
                shutdown: CancelSource::new(),
                in_flight: Arc::new(watch::channel(0).0),
            }),
        }
    }

    pub fn settings(&self) -> &SniperSettings {
        &self.inner.settings
    }

    /// Idle → Running. Resets detections and the broadcast log, then spawns
    /// the periodic detect loop. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        target_address: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<(), SessionError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SessionError::ShutDown);
        }

        let target_address = target_address.into();
        let payload = payload.into();
        let payload_bytes = payload.len();
        {
            let mut state = self.inner.state.lock();
            if state.running {
                return Err(SessionError::AlreadyRunning);
            }

            state.running = true;
            state.target_address = target_address.clone();
            state.payload = payload;
            state.seen.clear();
            state.broadcast_log.clear();
            state.generation += 1;

            let cancel = CancelSource::new();
            let task = tokio::spawn(run_loop(
                Arc::downgrade(&self.inner),
                state.generation,
                cancel.token(),
            ));
            state.run = Some(ActiveRun { cancel, task });
        }

        counter!("sniper_session_transitions_total", "state" => "running").increment(1);
        gauge!("sniper_session_running").set(1.0);
        info!(
            address = %target_address,
            payload_bytes,
            interval_ms = self.inner.settings.poll_interval().as_millis() as u64,
            "sniper monitoring started"
        );
        Ok(())
    }

    /// Running → Idle. Cancels the loop without waiting for it; a cycle that
    /// is already polling finishes but claims nothing.
    pub fn stop(&self) -> Result<(), SessionError> {
        let run = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return Err(SessionError::NotRunning);
            }
            state.running = false;
            state.run.take()
        };

        if let Some(run) = run {
            run.cancel.cancel();
            self.inner.spawn_supervised(async move {
                if let Err(err) = run.task.await {
                    warn!(?err, "detect loop failed");
                }
            });
        }

        counter!("sniper_session_transitions_total", "state" => "idle").increment(1);
        gauge!("sniper_session_running").set(0.0);
        info!("sniper monitoring stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.inner.state.lock();
        SessionStatus {
            is_running: state.running,
            target_address: state.target_address.clone(),
            detected_count: state.seen.len(),
            detected_tx_ids: state.seen.ids().to_vec(),
            broadcast_count: state.broadcast_log.len(),
            last_check_time: state.last_check_time,
        }
    }

    pub fn broadcast_results(&self) -> Vec<BroadcastResult> {
        self.inner.state.lock().broadcast_log.clone()
    }

    /// Forgets detections and broadcast results; `running` is untouched.
    pub fn clear_results(&self) {
        let mut state = self.inner.state.lock();
        state.seen.clear();
        state.broadcast_log.clear();
        debug!("detections and broadcast results cleared");
    }

    /// One bounded poll outside the periodic loop. Reports every matching
    /// transaction observed in this poll and launches a broadcast for each one
    /// the session has not acted on yet, without waiting for it.
    pub async fn quick_check(
        &self,
        target_address: &str,
        payload: impl Into<Payload>,
        timeout: Duration,
    ) -> QuickCheckOutcome {
        let (outcome, _launched) = self
            .check_and_launch(target_address, payload.into(), timeout)
            .await;
        outcome
    }

    /// Quick check that also waits for the broadcasts this call launched, and
    /// only those, before returning.
    pub async fn snipe(
        &self,
        target_address: &str,
        payload: impl Into<Payload>,
        timeout: Duration,
    ) -> QuickCheckOutcome {
        let (outcome, launched) = self
            .check_and_launch(target_address, payload.into(), timeout)
            .await;
        // A closed channel also means the broadcast task is over.
        join_all(launched).await;
        outcome
    }

    async fn check_and_launch(
        &self,
        target_address: &str,
        payload: Payload,
        timeout: Duration,
    ) -> (QuickCheckOutcome, Vec<oneshot::Receiver<()>>) {
        let shutdown = self.inner.shutdown.token();
        let records = self.inner.poller.poll_all(timeout, &shutdown).await;
        let tx_ids = matching_tx_ids(target_address, &records);

        let (fresh, generation) = {
            let mut state = self.inner.state.lock();
            (
                state.seen.claim_new(target_address, &records),
                state.generation,
            )
        };

        let mut launched = Vec::with_capacity(fresh.len());
        for tx_id in fresh {
            let (done, finished) = oneshot::channel();
            let inner = Arc::clone(&self.inner);
            let payload = payload.clone();
            self.inner.spawn_supervised(async move {
                let shutdown = inner.shutdown.token();
                let results = inner.broadcaster.broadcast(&payload, &shutdown).await;
                debug!(%tx_id, results = results.len(), "quick check broadcast finished");
                inner.record_results(generation, results);
                let _ = done.send(());
            });
            launched.push(finished);
        }

        debug!(
            address = target_address,
            detected = tx_ids.len(),
            "quick check finished"
        );
        (QuickCheckOutcome::from_tx_ids(tx_ids), launched)
    }

    /// Resolves once every supervised background task has finished: quick
    /// check broadcasts and loops that were stopped. Tasks launched while
    /// waiting are waited for too.
    pub async fn wait_for_background(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        // The sender lives as long as `self`, so this never errors.
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    /// Explicit teardown: stops the loop, cancels pending broadcasts and waits
    /// for every task to unwind. Later `start` calls are rejected.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        if self.stop().is_err() {
            debug!("shutdown requested while idle");
        }
        self.wait_for_background().await;
        info!("sniper session shut down");
    }
}

impl SessionInner {
    fn spawn_supervised<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.send_modify(|count| *count += 1);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    fn record_results(&self, generation: u64, results: Vec<BroadcastResult>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                dropped = results.len(),
                "discarding broadcast results of a previous run"
            );
            return;
        }
        state.broadcast_log.extend(results);
    }

    async fn run_cycle(&self, generation: u64, cancel: &CancelToken) {
        let target = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                return;
            }
            state.last_check_time = Some(Utc::now());
            state.target_address.clone()
        };

        let records = self
            .poller
            .poll_all(self.settings.request_timeout(), cancel)
            .await;

        let (fresh, payload) = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                debug!(generation, "run stopped mid-cycle, ignoring poll results");
                return;
            }
            (state.seen.claim_new(&target, &records), state.payload.clone())
        };
        if fresh.is_empty() {
            return;
        }

        let payload = &payload;
        let rounds = fresh.iter().map(|tx_id| async move {
            let results = self.broadcaster.broadcast(payload, cancel).await;
            debug!(%tx_id, results = results.len(), "broadcast round recorded");
            self.record_results(generation, results);
        });
        join_all(rounds).await;
    }
}

async fn run_loop(inner: Weak<SessionInner>, generation: u64, cancel: CancelToken) {
    let period = match inner.upgrade() {
        Some(inner) => inner.settings.poll_interval().max(Duration::from_millis(1)),
        None => return,
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // The loop never keeps a dropped session alive.
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.run_cycle(generation, &cancel).await;
    }

    debug!(generation, "detect loop exited");
}
