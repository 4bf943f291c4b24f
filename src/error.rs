//! Error taxonomy for the acquisition engine.
//!
//! Every failure the engine can observe maps onto one variant of
//! [`IngestError`]. Callers decide per variant whether it is fatal:
//!
//! | Variant | Raised by | Treatment |
//! |---------|-----------|-----------|
//! | [`IngestError::QuotaExhausted`] | backoff controller | fails the current page/group only |
//! | [`IngestError::Remote`] | backoff controller | ends the batch loop early, reported |
//! | [`IngestError::Transport`] | HTTP adapters | like `Remote` for batch, `Connection` for feeds |
//! | [`IngestError::Decode`] | HTTP adapters | like `Remote` |
//! | [`IngestError::Item`] | stream tailer | logged, stream continues |
//! | [`IngestError::Connection`] | feeds | fatal to the current run |
//! | [`IngestError::Persistence`] | partition sink | always propagated |
//! | [`IngestError::Config`] | startup | fatal |

use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("rate limited by remote; gave up after {attempts} attempts")]
    QuotaExhausted { attempts: u32, payload: Value },

    #[error("remote returned status {status}")]
    Remote { status: u16, payload: Value },

    #[error("http transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("item {id} could not be processed: {reason}")]
    Item { id: String, reason: String },

    #[error("feed connection lost: {0}")]
    Connection(String),

    #[error("write to {} failed: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// Body the remote sent with a failed response, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            IngestError::QuotaExhausted { payload, .. } | IngestError::Remote { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Persistence {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_only_for_remote_variants() {
        let quota = IngestError::QuotaExhausted {
            attempts: 3,
            payload: json!({"code": "rateLimited"}),
        };
        assert_eq!(quota.payload(), Some(&json!({"code": "rateLimited"})));

        let item = IngestError::Item {
            id: "abc".into(),
            reason: "missing created_utc".into(),
        };
        assert!(item.payload().is_none());
    }

    #[test]
    fn test_persistence_message_names_path() {
        let err = IngestError::persistence(
            "/data/2024-05-01/reddit_stream.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/2024-05-01/reddit_stream.jsonl"));
        assert!(msg.contains("denied"));
    }
}
