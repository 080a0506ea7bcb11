//! Download daemon control interface
//!
//! The orchestrator talks to the daemon only through [`DownloadDaemon`], so the
//! lifecycle can be driven against a scripted daemon in tests. [`Aria2Client`]
//! is the production implementation over aria2's JSON-RPC interface.

mod client;
mod response;

pub use client::Aria2Client;
pub use response::decode_status_batch;

use crate::error::Result;
use crate::types::{DaemonStatus, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Fields requested for every status query
pub const STATUS_FIELDS: [&str; 7] = [
    "gid",
    "infoHash",
    "status",
    "errorMessage",
    "completedLength",
    "totalLength",
    "bittorrent",
];

/// Control calls the orchestrator needs from a download daemon
#[async_trait]
pub trait DownloadDaemon: Send + Sync {
    /// Daemon version, used as a connectivity check
    async fn version(&self) -> Result<String>;

    /// Submit a locator as a metadata-only job saving its artifact to `dir`
    async fn add_metadata(&self, locator: &str, dir: &Path) -> Result<JobId>;

    /// Submit a metadata artifact for the bulk transfer into `dir`
    async fn add_artifact(&self, artifact: &[u8], dir: &Path) -> Result<JobId>;

    /// Ask the daemon to remove a job
    async fn remove(&self, job_id: &JobId) -> Result<()>;

    /// Currently active jobs
    async fn tell_active(&self) -> Result<Vec<JobStatus>>;

    /// Status of every job in `job_ids`, in one request.
    ///
    /// An `Err` means the whole batch failed. Jobs the daemon could not resolve
    /// come back as [`StatusEntry::Failed`].
    async fn tell_status_batch(&self, job_ids: &[JobId]) -> Result<Vec<StatusEntry>>;
}

/// One result of a batched status query
#[derive(Clone, Debug, PartialEq)]
pub enum StatusEntry {
    /// The daemon reported the job
    Reported(JobStatus),
    /// The daemon answered this call with an error (unknown job id and similar)
    Failed {
        /// Job the failed call was about
        job_id: JobId,
        /// Daemon error message
        message: String,
    },
}

/// Status fields of one daemon job
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Daemon job id
    pub gid: JobId,
    /// Info hash of the torrent
    #[serde(default, alias = "infohash")]
    pub info_hash: String,
    /// Job status
    #[serde(default)]
    pub status: DaemonStatus,
    /// Error detail for failed jobs
    #[serde(default)]
    pub error_message: String,
    /// Bytes transferred so far
    #[serde(default, deserialize_with = "lenient_u64")]
    pub completed_length: u64,
    /// Total size in bytes
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_length: u64,
    /// Torrent metadata, present for BitTorrent jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bittorrent: Option<BitTorrentMeta>,
}

/// `bittorrent` section of a status report
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BitTorrentMeta {
    /// `info` dictionary, absent until metadata is known
    #[serde(default)]
    pub info: Option<BitTorrentInfo>,
}

/// `bittorrent.info` section of a status report
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BitTorrentInfo {
    /// Content name
    #[serde(default)]
    pub name: String,
}

impl JobStatus {
    /// Empty status for `gid`
    pub fn new(gid: JobId) -> Self {
        Self {
            gid,
            ..Default::default()
        }
    }

    /// Content name reported by the daemon, empty while unknown
    pub fn name(&self) -> &str {
        self.bittorrent
            .as_ref()
            .and_then(|bt| bt.info.as_ref())
            .map(|info| info.name.as_str())
            .unwrap_or("")
    }

    /// Set the reported content name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.bittorrent = Some(BitTorrentMeta {
            info: Some(BitTorrentInfo { name: name.into() }),
        });
    }
}

// aria2 reports numbers as decimal strings
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
