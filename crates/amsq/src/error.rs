//! 💀 Errors — the five ways a cycle can go sideways, each with its own name tag.
//!
//! 🧠 Knowledge graph:
//! - `ConfigError`: fatal at startup. The process refuses to begin. Good.
//! - `FetchError`: absorbed by the pipeline, swapped for the fallback snapshot, flagged.
//! - `TransformError` + `DeliveryError`: absorbed by the pipeline, flagged as an ingestion failure.
//! - `MessageError`: fatal for one invocation. The worker shrugs and takes the next message.
//!
//! anyhow still rules the process boundary (CLI, config loading, joins). These enums exist so the
//! pipeline can `match` on outcomes instead of hoping nothing unwinds. 🦆

use thiserror::Error;

/// 🔧 Startup-time problems. If you see one of these, nothing was shipped. Nothing will be.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("💀 shared secret is missing; set `shared_secret` (or the legacy `laws_shared_key`)")]
    MissingSharedSecret,
    #[error("💀 shared secret is not valid base64: {0}")]
    InvalidSharedSecret(#[from] base64::DecodeError),
    #[error("💀 fallback snapshot '{path}' could not be read: {source}")]
    FallbackUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("💀 fallback snapshot '{path}' is not a {{cols, results}} document: {source}")]
    FallbackMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("💀 invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    #[error("💀 the HTTP client refused to be born: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// 📡 The remote snapshot did not arrive in one piece.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,
    #[error("fetch failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("fetch returned HTTP {0}")]
    Status(u16),
    #[error("fetched document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("scripted fetch failure")]
    Scripted,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

/// 🚰 The ingestion endpoint said no, or said nothing at all.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("ingestion endpoint rejected the payload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("ingestion request timed out")]
    Timeout,
    #[error("ingestion request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("records could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Transport(err)
        }
    }
}

/// 🔄 The matrix was not a matrix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("row {row} has {actual} values but the column index has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// 📨 The invocation message could not be trusted with a cycle.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invocation message is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("invocation message is missing or mistyped `{0}`")]
    MissingField(&'static str),
}
