//! # 📡 THE LOG ANALYTICS BACKEND
//!
//! 🎬 COLD OPEN — INT. INGESTION ENDPOINT — SOMEWHERE IN A REGION
//!
//! A POST arrives. It carries a date, a length, a log type, and a signature that only makes sense
//! if all of those are exactly what the sender says they are. The endpoint checks. The endpoint
//! answers. Anything outside 200..=299 is a no, and we take no for an answer: no retries here.
//!
//! ⚠️ The endpoint host is a template, not a constant. Sovereign clouds live at other hosts, and
//! they deserve logs too.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::backends::Sink;
use crate::error::{ConfigError, DeliveryError};
use crate::signature::{LAWS_CONTENT_TYPE, LAWS_RESOURCE, RequestSignatureInputs, ShippingCredentials, rfc1123};

/// 🌍 Public-cloud Data Collector endpoint. `{workspace_id}` and `{resource}` get substituted.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{workspace_id}.ods.opinsights.azure.com{resource}?api-version=2016-04-01";

/// 🧩 Fill in the endpoint template.
pub fn render_endpoint(template: &str, workspace_id: &str) -> String {
    template
        .replace("{workspace_id}", workspace_id)
        .replace("{resource}", LAWS_RESOURCE)
}

/// 📡 The signed ingestion client.
///
/// Internally holds:
/// - `client`: the HTTP muscle 💪, reused across requests
/// - `credentials`: workspace id + keyed HMAC, shared read-only
/// - `endpoint`: the rendered URL, computed once
/// - `timeout`: hard ceiling for a single POST
#[derive(Debug, Clone)]
pub struct LawsClient {
    client: reqwest::Client,
    credentials: Arc<ShippingCredentials>,
    endpoint: String,
    timeout: Duration,
}

impl LawsClient {
    /// 🚀 Render the endpoint and make sure it's a URL before anybody tries to POST to it.
    pub fn new(
        client: reqwest::Client,
        credentials: Arc<ShippingCredentials>,
        endpoint_template: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let endpoint = render_endpoint(endpoint_template, credentials.workspace_id());
        reqwest::Url::parse(&endpoint).map_err(|err| ConfigError::InvalidSetting {
            key: "ingestion.endpoint_template",
            reason: format!("'{endpoint}' is not a URL: {err}"),
        })?;
        Ok(Self {
            client,
            credentials,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for LawsClient {
    /// 📡 One signed POST. Fresh timestamp, fresh signature, every single time.
    async fn send(&self, log_type: &str, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let inputs = RequestSignatureInputs::for_ingestion(rfc1123(Utc::now()), payload.len());
        let authorization = self.credentials.authorization(&inputs);

        let started = Instant::now();
        let sent = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("content-type", LAWS_CONTENT_TYPE)
            .header("Authorization", authorization)
            .header("Log-Type", log_type)
            .header("x-ms-date", inputs.timestamp.as_str())
            .body(payload)
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let err = DeliveryError::from(err);
                error!("💀 unable to write '{}' to log analytics: {}", log_type, err);
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        if !(200..=299).contains(&status) {
            // -- the status is the verdict; the body is only there to explain it
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => format!("<response body unreadable: {err}>"),
            };
            error!("💀 unable to write '{}': code {} message {}", log_type, status, body);
            return Err(DeliveryError::Rejected { status, body });
        }

        debug!(
            "✅ total time taken to push data to log analytics workspace: {:.3}s",
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
