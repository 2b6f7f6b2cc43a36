//! 🔒 The SharedKey handshake — how the ingestion endpoint knows it's really us.
//!
//! 🎬 *[a canonical string is assembled, one newline at a time]*
//! *[a secret is decoded. an HMAC is struck. a digest is base64'd.]*
//! *[the secret itself never leaves the building.]*
//!
//! 🧠 Knowledge graph:
//! - `ShippingCredentials`: workspace id + decoded key. Built ONCE at startup, shared read-only.
//! - `RequestSignatureInputs`: built fresh for EVERY POST. The timestamp and content length are
//!   inside the signed string, so a reused signature is a wrong signature.
//! - `authorization()`: pure. Same inputs, same header. No clock, no I/O, no drama.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// 📡 The only method, content type and resource the ingestion API is ever called with.
pub const LAWS_METHOD: &str = "POST";
pub const LAWS_CONTENT_TYPE: &str = "application/json";
pub const LAWS_RESOURCE: &str = "/api/logs";

/// 🔑 Workspace id + the decoded shared key, pre-loaded into an HMAC.
///
/// Immutable after construction. The keyed MAC is cloned per signature, so concurrent cycles can
/// sign in parallel off one `Arc<ShippingCredentials>` without a lock in sight.
#[derive(Clone)]
pub struct ShippingCredentials {
    workspace_id: String,
    keyed_mac: HmacSha256,
}

// 🙈 manual Debug so the key never lands in a log line. Not even a tiny bit.
impl std::fmt::Debug for ShippingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingCredentials")
            .field("workspace_id", &self.workspace_id)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

impl ShippingCredentials {
    /// 🚀 Decode the base64 shared secret and key the HMAC with it.
    ///
    /// A missing, blank or non-base64 secret is a `ConfigError` right here, at startup. We do NOT
    /// want to find out about it forty cycles later as a stream of 403s.
    pub fn new(workspace_id: impl Into<String>, shared_secret: Option<&str>) -> Result<Self, ConfigError> {
        let secret = shared_secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSharedSecret)?;
        let key = BASE64.decode(secret)?;
        // -- HMAC takes keys of any length, the error arm is here to keep the compiler honest
        let keyed_mac = HmacSha256::new_from_slice(&key).map_err(|_| ConfigError::MissingSharedSecret)?;
        Ok(Self {
            workspace_id: workspace_id.into(),
            keyed_mac,
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// ✍️ `SharedKey <workspace-id>:<base64(hmac_sha256(key, canonical))>`
    pub fn authorization(&self, inputs: &RequestSignatureInputs) -> String {
        let mut mac = self.keyed_mac.clone();
        mac.update(inputs.canonical_string().as_bytes());
        let encoded_hash = BASE64.encode(mac.finalize().into_bytes());
        format!("SharedKey {}:{}", self.workspace_id, encoded_hash)
    }
}

/// 📝 Everything that goes into one signature. One per request. Never recycled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignatureInputs {
    pub timestamp: String,
    pub content_length: usize,
    pub method: String,
    pub content_type: String,
    pub resource: String,
}

impl RequestSignatureInputs {
    /// 🏗️ Inputs for an ingestion POST of `content_length` bytes stamped at `timestamp`.
    pub fn for_ingestion(timestamp: String, content_length: usize) -> Self {
        Self {
            timestamp,
            content_length,
            method: LAWS_METHOD.to_string(),
            content_type: LAWS_CONTENT_TYPE.to_string(),
            resource: LAWS_RESOURCE.to_string(),
        }
    }

    /// 🧵 METHOD \n LENGTH \n TYPE \n x-ms-date:DATE \n RESOURCE, in exactly that order.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}\n{}\n{}\nx-ms-date:{}\n{}",
            self.method, self.content_length, self.content_type, self.timestamp, self.resource
        )
    }
}

/// 🕰️ RFC-1123, the date format that time forgot but HTTP never did.
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
