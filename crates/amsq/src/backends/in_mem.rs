//! # Previously, on amsq...
//!
//! 🎬 The blob was down. The workspace was far away. Someone had to pretend to be both.
//!
//! `in_mem` provides a scripted [`Source`] and a recording [`Sink`] for tests and dry runs.
//! The source hands back a fixed snapshot (or a scripted failure) after an optional delay; the
//! sink remembers every payload it was handed and can be told to answer with any status. The
//! dry-run flavour logs each payload and forgets it, so a long feed can't grow the heap.
//!
//! ⚠️ No network calls. No disk I/O. Just vibes and heap memory.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::backends::{Sink, Source};
use crate::common::SourceSnapshot;
use crate::error::{DeliveryError, FetchError};

/// 📦 Returns the same snapshot every time, or fails every time. Consistency is its only virtue.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    snapshot: Option<SourceSnapshot>,
    delay: Duration,
}

impl InMemorySource {
    pub fn new(snapshot: SourceSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            delay: Duration::ZERO,
        }
    }

    /// 💀 A source that always fails. The fallback's favourite test partner.
    pub fn failing() -> Self {
        Self::default()
    }

    /// ⏳ Pretend the fetch takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn fetch(&self) -> Result<SourceSnapshot, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.snapshot.clone().ok_or(FetchError::Scripted)
    }
}

/// 📬 One shipment, as the sink saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Shipment {
    pub log_type: String,
    pub payload: Vec<u8>,
}

/// 🗳️ Records every payload. Answers with `status` (200 unless told otherwise).
///
/// Clones share the same ledger, so a test can keep one handle and give the other to a pipeline.
#[derive(Debug, Clone)]
pub struct InMemorySink {
    shipments: Arc<Mutex<Vec<Shipment>>>,
    recording: bool,
    status: u16,
    delay: Duration,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self {
            shipments: Arc::default(),
            recording: true,
            status: 200,
            delay: Duration::ZERO,
        }
    }
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🧪 Accept and log every payload, keep none of them. What `dry_run` ships into.
    pub fn discarding() -> Self {
        Self {
            recording: false,
            ..Self::default()
        }
    }

    /// 🚫 Answer every send with `status`. Non-2xx becomes a `DeliveryError::Rejected`.
    pub fn answering(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 📋 Everything received so far, oldest first. Rejected payloads are recorded too.
    pub fn shipments(&self) -> Vec<Shipment> {
        self.shipments
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&self, log_type: &str, payload: Vec<u8>) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.recording {
            debug!("🗳️ in-memory sink got {} bytes for '{}'", payload.len(), log_type);
            let shipment = Shipment {
                log_type: log_type.to_string(),
                payload,
            };
            match self.shipments.lock() {
                Ok(mut guard) => guard.push(shipment),
                Err(poisoned) => poisoned.into_inner().push(shipment),
            }
        } else {
            info!(
                "🧪 dry run for '{}' ({} bytes): {}",
                log_type,
                payload.len(),
                String::from_utf8_lossy(&payload)
            );
        }
        if (200..=299).contains(&self.status) {
            Ok(())
        } else {
            error!("💀 in-memory sink answering HTTP {} for '{}'", self.status, log_type);
            Err(DeliveryError::Rejected {
                status: self.status,
                body: String::new(),
            })
        }
    }
}
