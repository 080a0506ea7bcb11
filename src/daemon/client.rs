//! aria2 JSON-RPC client

use super::response::{Envelope, decode_status_batch};
use super::{DownloadDaemon, JobStatus, STATUS_FIELDS, StatusEntry};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::types::JobId;
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// [`DownloadDaemon`] backed by an aria2 RPC endpoint
#[derive(Clone, Debug)]
pub struct Aria2Client {
    http: reqwest::Client,
    rpc_url: String,
    secret: Option<String>,
    metadata_stop_timeout: Duration,
    transfer_stop_timeout: Duration,
}

impl Aria2Client {
    /// Create a client for the configured endpoint. No request is made here.
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: config.rpc_url.clone(),
            secret: config.rpc_secret.clone(),
            metadata_stop_timeout: config.metadata_stop_timeout,
            transfer_stop_timeout: config.transfer_stop_timeout,
        }
    }

    /// RPC endpoint this client posts to
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn request(&self, id: &str, method: &str, mut params: Vec<Value>) -> Value {
        if let Some(secret) = &self.secret {
            params.insert(0, Value::String(format!("token:{secret}")));
        }
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
    }

    async fn post(&self, body: &Value) -> Result<(reqwest::StatusCode, Vec<u8>)> {
        let response = self.http.post(&self.rpc_url).json(body).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let id = Uuid::new_v4().to_string();
        let request = self.request(&id, method, params);
        let (status, body) = self.post(&request).await?;

        // aria2 answers RPC errors with a 4xx status and a regular error envelope
        let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
            DaemonError::MalformedResponse(format!("{method} (HTTP {status}): {e}"))
        })?;
        Ok(envelope.into_result()?)
    }
}

fn absolute_dir(dir: &Path) -> Result<String> {
    let dir = std::path::absolute(dir)?;
    Ok(dir.to_string_lossy().into_owned())
}

#[async_trait]
impl DownloadDaemon for Aria2Client {
    async fn version(&self) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct Version {
            version: String,
        }

        let version: Version = self.call("aria2.getVersion", Vec::new()).await?;
        Ok(version.version)
    }

    async fn add_metadata(&self, locator: &str, dir: &Path) -> Result<JobId> {
        let options = json!({
            "dir": absolute_dir(dir)?,
            "bt-metadata-only": "true",
            "bt-save-metadata": "true",
            "bt-stop-timeout": self.metadata_stop_timeout.as_secs().to_string(),
        });
        let gid: String = self
            .call("aria2.addUri", vec![json!([locator]), options])
            .await?;
        tracing::debug!(job_id = %gid, "metadata job submitted");
        Ok(JobId::from(gid))
    }

    async fn add_artifact(&self, artifact: &[u8], dir: &Path) -> Result<JobId> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(artifact);
        let options = json!({
            "dir": absolute_dir(dir)?,
            "check-integrity": "true",
            "continue": "true",
            "bt-stop-timeout": self.transfer_stop_timeout.as_secs().to_string(),
        });
        let gid: String = self
            .call("aria2.addTorrent", vec![json!(encoded), json!([]), options])
            .await?;
        tracing::debug!(job_id = %gid, "bulk transfer job submitted");
        Ok(JobId::from(gid))
    }

    async fn remove(&self, job_id: &JobId) -> Result<()> {
        let _: JobId = self.call("aria2.remove", vec![json!(job_id)]).await?;
        Ok(())
    }

    async fn tell_active(&self) -> Result<Vec<JobStatus>> {
        self.call("aria2.tellActive", vec![json!(STATUS_FIELDS)])
            .await
    }

    async fn tell_status_batch(&self, job_ids: &[JobId]) -> Result<Vec<StatusEntry>> {
        // the call id carries the job id so failed entries can be attributed
        let calls: Vec<Value> = job_ids
            .iter()
            .map(|job_id| {
                self.request(
                    job_id.as_str(),
                    "aria2.tellStatus",
                    vec![json!(job_id), json!(STATUS_FIELDS)],
                )
            })
            .collect();

        let (_, body) = self.post(&Value::Array(calls)).await?;
        Ok(decode_status_batch(&body)?)
    }
}
