//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Source backends pour the snapshot, Sink backends ship the records.
//! And in between, the pipeline decides what counts as a bad day.
//!
//! 🎭 Same casting agency as always: one trait per end of the pipe, one enum per trait, and the
//! enum dispatches so the pipeline never learns whether it's talking to Azure or to a `Vec`.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use async_trait::async_trait;

use crate::common::SourceSnapshot;
use crate::error::{DeliveryError, FetchError};

pub mod blob;
pub mod file;
pub mod in_mem;
pub mod laws;

pub use blob::BlobSource;
pub use file::load_fallback_snapshot;
pub use in_mem::{InMemorySink, InMemorySource};
pub use laws::LawsClient;

// ===== Source Trait and Backend Enum =====

/// 🚰 A source that produces one snapshot per call.
///
/// # Contract 📜
/// - `fetch` makes at most one attempt. Retrying is not its job; falling back is not its job.
/// - `&self`, not `&mut self`: one source is shared by every concurrent cycle, read-only.
/// - Every failure mode comes back as a `FetchError`. The pipeline turns that into a flag.
#[async_trait]
pub trait Source: std::fmt::Debug + Send + Sync {
    async fn fetch(&self) -> Result<SourceSnapshot, FetchError>;
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub enum SourceBackend {
    Blob(BlobSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn fetch(&self) -> Result<SourceSnapshot, FetchError> {
        match self {
            SourceBackend::Blob(blob) => blob.fetch().await,
            SourceBackend::InMemory(mem) => mem.fetch().await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 🕳️ A sink that ships one serialized payload to one log type.
///
/// # Contract 📜
/// - `send` makes exactly one delivery attempt. No retry. No queue. No second chances.
/// - `Ok(())` means the destination acknowledged it with a 2xx (or the moral equivalent).
/// - The payload is already serialized; sinks do not look inside it.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send + Sync {
    async fn send(&self, log_type: &str, payload: Vec<u8>) -> Result<(), DeliveryError>;
}

/// 🎭 The many faces of a Sink.
#[derive(Debug)]
pub enum SinkBackend {
    Laws(LawsClient),
    InMemory(InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&self, log_type: &str, payload: Vec<u8>) -> Result<(), DeliveryError> {
        match self {
            SinkBackend::Laws(client) => client.send(log_type, payload).await,
            SinkBackend::InMemory(sink) => sink.send(log_type, payload).await,
        }
    }
}
