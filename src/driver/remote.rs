//! Driver backend talking to a running server over its admin API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::backend::{BackendError, DriverBackend, Result};
use crate::api::models::{RecordBatchRequest, StartRequest};
use crate::ledger::RunControl;
use crate::reporting::QueueStats;
use crate::worker::BatchOutcome;

pub struct RemoteBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl RemoteBackend {
    /// `request_timeout` bounds every call, including a full batch invocation
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("docmirror-driver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let response = check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("invalid response body: {e}")))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!(path, "POST");
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        self.send(self.request(Method::GET, path)).await
    }
}

async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized,
        StatusCode::FORBIDDEN => BackendError::Forbidden,
        StatusCode::CONFLICT => BackendError::AlreadyRunning,
        _ => BackendError::Server {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        },
    })
}

#[async_trait]
impl DriverBackend for RemoteBackend {
    async fn start(&self, actor: &str) -> Result<RunControl> {
        let body = StartRequest {
            actor: Some(actor.to_string()),
        };
        self.post("/admin/control/start", &body).await
    }

    async fn stop(&self) -> Result<RunControl> {
        self.post("/admin/control/stop", &serde_json::json!({})).await
    }

    async fn is_running(&self) -> Result<bool> {
        let control: RunControl = self.get("/admin/control").await?;
        Ok(control.is_running)
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.stats().await?.counts.pending)
    }

    async fn invoke_batch(&self) -> Result<BatchOutcome> {
        self.post("/functions/process-queue", &serde_json::json!({})).await
    }

    async fn record_batch(&self, processed: u64) -> Result<RunControl> {
        self.post("/admin/control/batches", &RecordBatchRequest { processed })
            .await
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.get("/admin/queue/stats").await
    }
}
