//! 🧵 Workers: the ones who actually run the cycles while the Supervisor takes the credit.
//!
//! 🗑️ A CycleWorker drains the message channel. Parse, run, report, repeat. When the channel
//! closes it hands back everything it did and clocks out.

use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::CycleReport;
use crate::pipeline::CollectionPipeline;
use crate::queue::QueueMessage;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    type Output: Send + 'static;

    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 🔄 Runs one cycle per message until the channel runs dry.
#[derive(Debug)]
pub(crate) struct CycleWorker {
    id: usize,
    rx: Receiver<Vec<u8>>,
    pipeline: Arc<CollectionPipeline>,
}

impl CycleWorker {
    pub(crate) fn new(id: usize, rx: Receiver<Vec<u8>>, pipeline: Arc<CollectionPipeline>) -> Self {
        Self { id, rx, pipeline }
    }
}

impl Worker for CycleWorker {
    type Output = Vec<CycleReport>;

    fn start(self) -> JoinHandle<Result<Self::Output>> {
        tokio::spawn(async move {
            debug!("📥 CycleWorker {} started draining the queue", self.id);
            let mut reports = Vec::new();
            // -- Err from recv means empty AND closed
            while let Ok(raw) = self.rx.recv().await {
                match QueueMessage::parse(&raw) {
                    Ok(message) => {
                        let telemetry = self.pipeline.run_cycle(&message).await;
                        reports.push(CycleReport::Completed(telemetry));
                    }
                    Err(err) => {
                        // -- malformed is fatal for this invocation only
                        error!("💀 CycleWorker {} rejected a message: {}", self.id, err);
                        reports.push(CycleReport::Rejected {
                            message: String::from_utf8_lossy(raw.trim_ascii_end()).into_owned(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            debug!("🏁 CycleWorker {}: channel closed after {} messages", self.id, reports.len());
            Ok(reports)
        })
    }
}
