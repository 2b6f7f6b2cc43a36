//! 📡 BlobSource — one HTTP GET, one JSON snapshot, two seconds of patience.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::backends::Source;
use crate::common::SourceSnapshot;
use crate::error::FetchError;

/// 📡 Fetches the `{cols, results}` document from a URL.
///
/// The reqwest client is shared (it's an `Arc` on the inside), the timeout is per request.
#[derive(Debug, Clone)]
pub struct BlobSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl BlobSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Source for BlobSource {
    async fn fetch(&self) -> Result<SourceSnapshot, FetchError> {
        debug!("📡 fetching snapshot from {}", self.url);
        let response = self.client.get(&self.url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        let snapshot = SourceSnapshot::from_slice(&body)?;
        debug!(
            "✅ snapshot fetched: {} columns, {} rows",
            snapshot.cols.len(),
            snapshot.results.len()
        );
        Ok(snapshot)
    }
}
