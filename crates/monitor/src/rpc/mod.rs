use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, StatusCode};

use sniper_domain::model::{PendingTxPage, PendingTxRecord};

mod types;

pub use types::{NodeClientError, SubmitResponse};

/// Seam between the core and the remote node APIs, so tests can script hangs
/// and failures without a network.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetches the current mempool page from `endpoint`.
    async fn fetch_pending(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Vec<PendingTxRecord>, NodeClientError>;

    /// Posts the raw payload to `endpoint`. Any HTTP status is returned as a
    /// response; only transport failures are errors.
    async fn submit(
        &self,
        endpoint: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<SubmitResponse, NodeClientError>;
}

/// reqwest-backed client talking to Stacks node APIs.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    http: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Client with keep-alive pooling suited to short polling intervals.
    /// Per-request timeouts are applied by the callers.
    pub fn build() -> Result<Self, NodeClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mempool-sniper/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn fetch_pending(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Vec<PendingTxRecord>, NodeClientError> {
        let response = self.http.get(endpoint).timeout(timeout).send().await?;
        if response.status() != StatusCode::OK {
            return Err(NodeClientError::Status(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        let page: PendingTxPage = serde_json::from_slice(&body)
            .map_err(|err| NodeClientError::Decode(err.to_string()))?;
        Ok(page.results)
    }

    async fn submit(
        &self,
        endpoint: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<SubmitResponse, NodeClientError> {
        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(SubmitResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{dev::ServerHandle, web, App, HttpResponse, HttpServer};

    async fn mempool() -> HttpResponse {
        HttpResponse::Ok().content_type("application/json").body(
            r#"{"limit":20,"offset":0,"total":1,"results":[
                {"tx_id":"0xaa","sender_address":"SP1","tx_status":"pending","receipt_time":1}
            ]}"#,
        )
    }

    async fn partial() -> HttpResponse {
        HttpResponse::Ok().content_type("application/json").body(
            r#"{"results":[
                {"tx_id":"0xbb","tx_status":"pending"},
                {"tx_id":"0xtarget","sender_address":"ADDR1"}
            ]}"#,
        )
    }

    async fn broken() -> HttpResponse {
        HttpResponse::ServiceUnavailable().finish()
    }

    async fn garbage() -> HttpResponse {
        HttpResponse::Ok().body("not json")
    }

    async fn relay(req: actix_web::HttpRequest, body: web::Bytes) -> HttpResponse {
        let octet = req
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            == Some("application/octet-stream");
        if octet && &body[..] == b"\x00\x01" {
            HttpResponse::Ok().body("\"0xaa\"")
        } else {
            HttpResponse::BadRequest().body("rejected")
        }
    }

    fn spawn_node() -> (String, ServerHandle) {
        let server = HttpServer::new(|| {
            App::new()
                .route("/mempool", web::get().to(mempool))
                .route("/partial", web::get().to(partial))
                .route("/broken", web::get().to(broken))
                .route("/garbage", web::get().to(garbage))
                .route("/v2/transactions", web::post().to(relay))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind test node");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{addr}"), handle)
    }

    #[actix_web::test]
    async fn fetches_and_decodes_mempool_page() {
        let (base, handle) = spawn_node();
        let client = HttpNodeClient::build().unwrap();

        let records = client
            .fetch_pending(&format!("{base}/mempool"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tx_id, "0xaa");
        assert_eq!(records[0].sender_address, "SP1");

        let partial = client
            .fetch_pending(&format!("{base}/partial"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0].sender_address, "");
        assert_eq!(partial[1].tx_id, "0xtarget");
        assert_eq!(partial[1].sender_address, "ADDR1");

        let status = client
            .fetch_pending(&format!("{base}/broken"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(status, NodeClientError::Status(503));

        let decode = client
            .fetch_pending(&format!("{base}/garbage"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(decode.kind(), "decode");

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn submit_posts_raw_bytes_and_returns_any_status() {
        let (base, handle) = spawn_node();
        let client = HttpNodeClient::build().unwrap();
        let url = format!("{base}/v2/transactions");

        let accepted = client
            .submit(&url, Bytes::from_static(b"\x00\x01"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(accepted.status, 200);
        assert_eq!(&accepted.body[..], b"\"0xaa\"");

        let rejected = client
            .submit(&url, Bytes::from_static(b"nope"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(rejected.status, 400);

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn unreachable_node_is_a_transport_error() {
        let client = HttpNodeClient::build().unwrap();
        let err = client
            .fetch_pending("http://127.0.0.1:9/mempool", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeClientError::Transport(_) | NodeClientError::Timeout
        ));
    }
}
