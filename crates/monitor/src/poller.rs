//! Concurrent, best-effort mempool polling across redundant query endpoints.

use std::{collections::HashMap, sync::Arc, time::Duration};

use metrics::{counter, histogram};
use tokio::{task::JoinSet, time::Instant};
use tracing::{debug, warn};

use sniper_domain::model::PendingTxRecord;

use crate::{cancel::CancelToken, rate_limit::TxRateLimiter, rpc::NodeClient};

pub struct EndpointPoller {
    client: Arc<dyn NodeClient>,
    endpoints: Arc<[String]>,
    limiter: Arc<TxRateLimiter>,
}

impl EndpointPoller {
    pub fn new(
        client: Arc<dyn NodeClient>,
        endpoints: impl Into<Arc<[String]>>,
        limiter: Arc<TxRateLimiter>,
    ) -> Self {
        Self {
            client,
            endpoints: endpoints.into(),
            limiter,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Queries every endpoint once, concurrently, and returns the union of
    /// what arrived before `timeout` elapsed, deduplicated by `tx_id`.
    ///
    /// A failing or hanging endpoint only loses its own contribution: each
    /// endpoint runs as its own task, results are merged as tasks finish and
    /// stragglers are aborted at the deadline.
    pub async fn poll_all(&self, timeout: Duration, cancel: &CancelToken) -> Vec<PendingTxRecord> {
        let started = Instant::now();
        let deadline = started + timeout;

        let mut tasks = JoinSet::new();
        for endpoint in self.endpoints.iter().cloned() {
            tasks.spawn(poll_endpoint(
                Arc::clone(&self.client),
                Arc::clone(&self.limiter),
                endpoint,
                timeout,
                cancel.clone(),
            ));
        }

        let mut merged: HashMap<String, PendingTxRecord> = HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(records))) => {
                    for record in records {
                        merged.entry(record.tx_id.clone()).or_insert(record);
                    }
                }
                Ok(Some(Err(err))) => warn!(?err, "poll task failed to complete"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = tasks.len(),
                        timeout_ms = timeout.as_millis() as u64,
                        "poll deadline elapsed, abandoning slow endpoints"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        histogram!("sniper_poll_cycle_seconds").record(started.elapsed().as_secs_f64());
        merged.into_values().collect()
    }
}

async fn poll_endpoint(
    client: Arc<dyn NodeClient>,
    limiter: Arc<TxRateLimiter>,
    endpoint: String,
    timeout: Duration,
    cancel: CancelToken,
) -> Vec<PendingTxRecord> {
    if !limiter.acquire(&cancel, "poll").await.is_granted() {
        return Vec::new();
    }

    let fetch = tokio::time::timeout(timeout, client.fetch_pending(&endpoint, timeout));
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            counter!("sniper_poll_requests_total", "result" => "cancelled").increment(1);
            return Vec::new();
        }
        outcome = fetch => outcome,
    };

    match outcome {
        Ok(Ok(records)) => {
            counter!("sniper_poll_requests_total", "result" => "ok").increment(1);
            debug!(%endpoint, count = records.len(), "mempool page received");
            records
        }
        Ok(Err(err)) => {
            counter!("sniper_poll_requests_total", "result" => err.kind()).increment(1);
            debug!(%endpoint, %err, "mempool query failed");
            Vec::new()
        }
        Err(_) => {
            counter!("sniper_poll_requests_total", "result" => "timeout").increment(1);
            debug!(%endpoint, "mempool query timed out");
            Vec::new()
        }
    }
}
