//! Scripted `NodeClient` used by the unit tests of this crate.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use sniper_domain::model::PendingTxRecord;

use crate::rpc::{NodeClient, NodeClientError, SubmitResponse};

#[derive(Debug, Clone)]
pub enum FetchScript {
    Records(Vec<PendingTxRecord>),
    Delayed(Duration, Vec<PendingTxRecord>),
    Fail(NodeClientError),
    Hang,
}

#[derive(Debug, Clone)]
pub enum SubmitScript {
    Reply(u16, &'static str),
    Fail(NodeClientError),
    Hang,
}

#[derive(Default)]
pub struct ScriptedClient {
    fetch: Mutex<HashMap<String, FetchScript>>,
    submit: Mutex<HashMap<String, SubmitScript>>,
    fetch_calls: AtomicUsize,
    submissions: Mutex<Vec<(String, Bytes)>>,
}

impl ScriptedClient {
    pub fn script_fetch(&self, endpoint: &str, script: FetchScript) {
        self.fetch.lock().insert(endpoint.to_string(), script);
    }

    pub fn script_submit(&self, endpoint: &str, script: SubmitScript) {
        self.submit.lock().insert(endpoint.to_string(), script);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(String, Bytes)> {
        self.submissions.lock().clone()
    }
}

pub fn record(tx_id: &str, sender: &str) -> PendingTxRecord {
    PendingTxRecord::new(tx_id, sender)
}

#[async_trait]
impl NodeClient for ScriptedClient {
    async fn fetch_pending(
        &self,
        endpoint: &str,
        _timeout: Duration,
    ) -> Result<Vec<PendingTxRecord>, NodeClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.fetch.lock().get(endpoint).cloned();
        match script {
            None => Ok(Vec::new()),
            Some(FetchScript::Records(records)) => Ok(records),
            Some(FetchScript::Delayed(delay, records)) => {
                tokio::time::sleep(delay).await;
                Ok(records)
            }
            Some(FetchScript::Fail(err)) => Err(err),
            Some(FetchScript::Hang) => std::future::pending().await,
        }
    }

    async fn submit(
        &self,
        endpoint: &str,
        payload: Bytes,
        _timeout: Duration,
    ) -> Result<SubmitResponse, NodeClientError> {
        self.submissions.lock().push((endpoint.to_string(), payload));
        let script = self.submit.lock().get(endpoint).cloned();
        match script {
            None => Ok(SubmitResponse::new(200, Bytes::from_static(b"0xrelayed"))),
            Some(SubmitScript::Reply(status, body)) => {
                Ok(SubmitResponse::new(status, Bytes::from_static(body.as_bytes())))
            }
            Some(SubmitScript::Fail(err)) => Err(err),
            Some(SubmitScript::Hang) => std::future::pending().await,
        }
    }
}
