//! Core types for aria-pilot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier of the principal a job was submitted for.
///
/// Persistence and notifications are partitioned by this key.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

/// Daemon-issued job identifier (aria2 GID).
///
/// Changes when a download is re-submitted to enter its next stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

/// Stable identifier of one logical download across daemon job re-keying
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(OwnerId);
string_id!(JobId);

impl TaskId {
    /// Generate a fresh random task identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a logical download. Progression is ordered and never regresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Collecting the torrent metadata artifact from a magnet locator
    MetadataFetch,
    /// Downloading the payload described by the metadata artifact
    BulkTransfer,
    /// Payload complete, daemon keeps seeding until its stop timeout
    Seeding,
}

impl Stage {
    /// Lowercase name used in logs and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::MetadataFetch => "metadata_fetch",
            Stage::BulkTransfer => "bulk_transfer",
            Stage::Seeding => "seeding",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content category, decides the destination root of the bulk transfer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Not resolved yet
    #[default]
    Unknown,
    /// TV series
    Series,
    /// Movies
    Movies,
    /// Anything else
    General,
}

impl Category {
    /// Categories an owner can pick from when classification is inconclusive
    pub const CHOICES: [Category; 3] = [Category::Series, Category::Movies, Category::General];

    /// Parse a category name, accepting the common aliases.
    ///
    /// Unrecognized names resolve to [`Category::Unknown`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "series" | "tv" | "show" | "categorya" => Category::Series,
            "movies" | "film" | "kino" | "categoryb" => Category::Movies,
            "common" | "general" | "all" | "categoryc" => Category::General,
            _ => Category::Unknown,
        }
    }

    /// Lowercase category name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unknown => "unknown",
            Category::Series => "series",
            Category::Movies => "movies",
            Category::General => "general",
        }
    }

    /// Whether the category has been resolved
    pub fn is_resolved(&self) -> bool {
        *self != Category::Unknown
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one logical download, keyed by its current [`JobId`]
/// inside the owner's [`TaskMap`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable logical identifier, survives re-keying to a new job id
    pub task_id: TaskId,
    /// Current lifecycle stage
    pub stage: Stage,
    /// Info hash from the locator, names the cached metadata artifact
    pub content_hash: String,
    /// Destination subdirectory relative to the category root
    #[serde(default)]
    pub target_subdir: String,
    /// Classification outcome
    #[serde(default)]
    pub category: Category,
    /// Best-known human readable name
    #[serde(default)]
    pub display_name: String,
    /// When the logical download was submitted
    pub created_at: DateTime<Utc>,
    /// Last time the record was rewritten
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a record for a freshly submitted metadata job
    pub fn new(
        content_hash: impl Into<String>,
        target_subdir: impl Into<String>,
        category: Category,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            stage: Stage::MetadataFetch,
            content_hash: content_hash.into(),
            target_subdir: target_subdir.into(),
            category,
            display_name: display_name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Name to show the owner: display name, falling back to the content hash
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.content_hash
        } else {
            &self.display_name
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One owner's task records, keyed by current daemon job id
pub type TaskMap = BTreeMap<JobId, TaskRecord>;

/// Job status as reported by the download daemon
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    /// Transferring
    Active,
    /// Queued in the daemon
    Waiting,
    /// Paused in the daemon
    Paused,
    /// Failed
    Error,
    /// Finished (for torrents: seeding stopped)
    Complete,
    /// Removed by request
    Removed,
    /// Any status this crate does not know about
    #[default]
    #[serde(other)]
    Unknown,
}

impl DaemonStatus {
    /// Statuses after which the daemon will never report progress for the job again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DaemonStatus::Error | DaemonStatus::Complete | DaemonStatus::Removed
        )
    }
}

/// One poll result for one watched job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Owner the job was registered for
    pub owner_id: OwnerId,
    /// Daemon job id
    pub job_id: JobId,
    /// Info hash reported by the daemon
    pub infohash: String,
    /// Daemon status
    pub status: DaemonStatus,
    /// Error detail for failed jobs
    pub error_message: String,
    /// Bytes transferred so far
    pub completed_bytes: u64,
    /// Total bytes of the job
    pub total_bytes: u64,
    /// Content name from the torrent metadata, empty while unknown
    pub reported_name: String,
    /// The poller dropped the job from its watch set after this event
    pub unwatched: bool,
}

impl StatusEvent {
    /// Completion as either the explicit status or a full, non-empty byte count.
    ///
    /// The byte comparison catches daemon states that report completion before
    /// the status field changes. A zero-length job never counts as complete here.
    pub fn is_complete(&self) -> bool {
        self.status == DaemonStatus::Complete || sizes_complete(self.completed_bytes, self.total_bytes)
    }
}

pub(crate) fn sizes_complete(completed: u64, total: u64) -> bool {
    completed != 0 && completed == total
}

/// Why a task record was deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    /// Download and seeding finished
    Completed,
    /// Daemon reported the job as failed
    Errored,
    /// Daemon reported the job as removed
    Removed,
}

/// Lifecycle events broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A locator was submitted and its metadata job persisted
    TaskCreated {
        /// Owner of the task
        owner_id: OwnerId,
        /// Metadata job id
        job_id: JobId,
        /// Logical task id
        task_id: TaskId,
    },
    /// A record moved to a later stage
    StageChanged {
        /// Owner of the task
        owner_id: OwnerId,
        /// Job id the record is now keyed by
        job_id: JobId,
        /// Logical task id
        task_id: TaskId,
        /// The new stage
        stage: Stage,
    },
    /// The daemon reported a better name for the content
    DisplayNameUpdated {
        /// Owner of the task
        owner_id: OwnerId,
        /// Job id
        job_id: JobId,
        /// New display name
        name: String,
    },
    /// Classification was inconclusive, waiting for the owner's choice
    AwaitingCategory {
        /// Owner of the task
        owner_id: OwnerId,
        /// Metadata job id
        job_id: JobId,
    },
    /// The record was deleted
    TaskRetired {
        /// Owner of the task
        owner_id: OwnerId,
        /// Job id
        job_id: JobId,
        /// Logical task id
        task_id: TaskId,
        /// Why it was deleted
        reason: RetireReason,
    },
    /// A stage advance was attempted and failed, the record is unchanged
    AdvanceFailed {
        /// Owner of the task
        owner_id: OwnerId,
        /// Job id of the unchanged record
        job_id: JobId,
        /// Failure description
        error: String,
    },
    /// A notification could not be delivered and was dropped
    NotificationDropped {
        /// Recipient
        owner_id: OwnerId,
        /// Delivery failure description
        error: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: DaemonStatus, completed: u64, total: u64) -> StatusEvent {
        StatusEvent {
            owner_id: OwnerId::from("u1"),
            job_id: JobId::from("gid"),
            infohash: String::new(),
            status,
            error_message: String::new(),
            completed_bytes: completed,
            total_bytes: total,
            reported_name: String::new(),
            unwatched: false,
        }
    }

    #[test]
    fn completion_by_status_or_full_size() {
        assert!(event(DaemonStatus::Complete, 0, 0).is_complete());
        assert!(event(DaemonStatus::Active, 100, 100).is_complete());
        assert!(!event(DaemonStatus::Active, 50, 100).is_complete());
        assert!(!event(DaemonStatus::Active, 0, 0).is_complete());
    }

    #[test]
    fn category_aliases() {
        assert_eq!(Category::parse("TV"), Category::Series);
        assert_eq!(Category::parse("kino"), Category::Movies);
        assert_eq!(Category::parse("CategoryB"), Category::Movies);
        assert_eq!(Category::parse(" all "), Category::General);
        assert_eq!(Category::parse("music"), Category::Unknown);
    }

    #[test]
    fn stage_order_is_progression() {
        assert!(Stage::MetadataFetch < Stage::BulkTransfer);
        assert!(Stage::BulkTransfer < Stage::Seeding);
    }

    #[test]
    fn unknown_daemon_status_deserializes() {
        let status: DaemonStatus = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(status, DaemonStatus::Unknown);
        let status: DaemonStatus = serde_json::from_str("\"complete\"").unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn record_label_falls_back_to_hash() {
        let mut record = TaskRecord::new("abcdef", "", Category::Unknown, "");
        assert_eq!(record.label(), "abcdef");
        record.display_name = "Some.Show.S01".into();
        assert_eq!(record.label(), "Some.Show.S01");
    }

    #[test]
    fn task_map_serializes_as_object_keyed_by_job() {
        let mut tasks = TaskMap::new();
        tasks.insert(
            JobId::from("2089b05ecca3d829"),
            TaskRecord::new("hash", "sub", Category::Movies, "Name"),
        );
        let json = serde_json::to_value(&tasks).unwrap();
        assert_eq!(json["2089b05ecca3d829"]["stage"], "metadata_fetch");
        assert_eq!(json["2089b05ecca3d829"]["category"], "movies");
    }
}
