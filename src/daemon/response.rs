//! Tolerant decoding of daemon JSON-RPC responses
//!
//! A batch request (an array of calls) is answered with an array of
//! envelopes, one per call. Some daemon builds answer with a single envelope
//! whose `result` is itself the array of statuses. Both shapes are accepted
//! here so call sites never branch on the format.

use super::{JobStatus, StatusEntry};
use crate::error::DaemonError;
use crate::types::JobId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl From<RpcError> for DaemonError {
    fn from(e: RpcError) -> Self {
        DaemonError::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

impl Envelope {
    /// Typed `result` of a single call, or the daemon's error
    pub(crate) fn into_result<T: DeserializeOwned>(self) -> Result<T, DaemonError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        let result = self.result.ok_or(DaemonError::MissingResult)?;
        serde_json::from_value(result).map_err(|e| DaemonError::MalformedResponse(e.to_string()))
    }
}

/// Decode the response to a batched status query.
///
/// Tries the array-of-envelopes shape first, then the single envelope with an
/// array result. A body matching neither shape, or a single envelope carrying
/// an error, fails the whole batch. Individual entries that cannot be decoded
/// are skipped.
pub fn decode_status_batch(body: &[u8]) -> Result<Vec<StatusEntry>, DaemonError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| DaemonError::MalformedResponse(e.to_string()))?;

    if let Value::Array(items) = value {
        return Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Envelope>(item) {
                Ok(envelope) => decode_envelope(envelope),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed envelope in batch, skipped");
                    None
                }
            })
            .collect());
    }

    if let Ok(envelope) = serde_json::from_value::<Envelope>(value) {
        if let Some(error) = envelope.error {
            return Err(error.into());
        }
        return match envelope.result {
            Some(Value::Array(items)) => Ok(items.into_iter().filter_map(decode_status).collect()),
            Some(other) => Ok(decode_status(other).into_iter().collect()),
            None => Err(DaemonError::MissingResult),
        };
    }

    Err(DaemonError::MalformedResponse(
        "expected an envelope or an array of envelopes".to_string(),
    ))
}

fn decode_envelope(envelope: Envelope) -> Option<StatusEntry> {
    if let Some(error) = envelope.error {
        let Some(id) = envelope.id.as_str() else {
            tracing::warn!(id = %envelope.id, error = %error.message, "error entry without a job id, skipped");
            return None;
        };
        return Some(StatusEntry::Failed {
            job_id: JobId::from(id),
            message: error.message,
        });
    }

    match envelope.result {
        Some(result) => decode_status(result),
        None => {
            tracing::warn!(id = %envelope.id, "entry without result or error, skipped");
            None
        }
    }
}

fn decode_status(value: Value) -> Option<StatusEntry> {
    // multicall style wraps each status in a one-element array
    let value = match value {
        Value::Array(mut inner) if inner.len() == 1 => inner.remove(0),
        other => other,
    };

    match serde_json::from_value::<JobStatus>(value) {
        Ok(status) => Some(StatusEntry::Reported(status)),
        Err(e) => {
            tracing::warn!(error = %e, "malformed status entry, skipped");
            None
        }
    }
}
