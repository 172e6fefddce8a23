//! Fan-out submission of the pre-signed payload to every broadcast node.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{info, warn};

use sniper_domain::model::{BroadcastResult, Payload};

use crate::{
    cancel::CancelToken,
    rate_limit::TxRateLimiter,
    rpc::{NodeClient, NodeClientError, SubmitResponse},
};

/// Status codes a node uses to accept a transaction.
const ACCEPTED_STATUSES: [u16; 2] = [200, 201];

pub struct Broadcaster {
    client: Arc<dyn NodeClient>,
    endpoints: Arc<[String]>,
    limiter: Arc<TxRateLimiter>,
    timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        client: Arc<dyn NodeClient>,
        endpoints: impl Into<Arc<[String]>>,
        limiter: Arc<TxRateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoints: endpoints.into(),
            limiter,
            timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Submits `payload` to every endpoint at once and waits for all of them.
    /// Returns one result per endpoint that got past the rate limiter;
    /// endpoints skipped because of cancellation contribute nothing.
    pub async fn broadcast(&self, payload: &Payload, cancel: &CancelToken) -> Vec<BroadcastResult> {
        let mut tasks = JoinSet::new();
        for endpoint in self.endpoints.iter().cloned() {
            tasks.spawn(submit_to_node(
                Arc::clone(&self.client),
                Arc::clone(&self.limiter),
                endpoint,
                payload.clone(),
                self.timeout,
                cancel.clone(),
            ));
        }

        let mut results = Vec::with_capacity(self.endpoints.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => warn!(?err, "broadcast task failed to complete"),
            }
        }

        let accepted = results.iter().filter(|result| result.success).count();
        info!(
            accepted,
            attempted = results.len(),
            "broadcast round finished"
        );
        results
    }
}

async fn submit_to_node(
    client: Arc<dyn NodeClient>,
    limiter: Arc<TxRateLimiter>,
    endpoint: String,
    payload: Payload,
    timeout: Duration,
    cancel: CancelToken,
) -> Option<BroadcastResult> {
    if !limiter.acquire(&cancel, "broadcast").await.is_granted() {
        return None;
    }

    let outcome = match tokio::time::timeout(
        timeout,
        client.submit(&endpoint, payload.to_bytes(), timeout),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(NodeClientError::Timeout),
    };

    let result = classify(endpoint, outcome);
    let label = if result.success { "accepted" } else { "rejected" };
    counter!("sniper_broadcasts_total", "result" => label).increment(1);
    if !result.success {
        warn!(
            node = %result.node_url,
            error = result.error.as_deref().unwrap_or_default(),
            "broadcast rejected"
        );
    }
    Some(result)
}

fn classify(endpoint: String, outcome: Result<SubmitResponse, NodeClientError>) -> BroadcastResult {
    match outcome {
        Ok(response) if ACCEPTED_STATUSES.contains(&response.status) => {
            let tx_id = String::from_utf8_lossy(&response.body).into_owned();
            BroadcastResult::accepted(endpoint, tx_id)
        }
        Ok(response) => {
            BroadcastResult::failed(endpoint, NodeClientError::Status(response.status).to_string())
        }
        Err(err) => BroadcastResult::failed(endpoint, err.to_string()),
    }
}
