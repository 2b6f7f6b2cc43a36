//! 🎬 *[camera pans across a queue]*
//! 🎬 "In a world where messages arrive faster than ten seconds apart..."
//! 🎬 "One supervisor dared to run them side by side."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — the local stand-in for the queue trigger. It reads one message per
//! line, drops them into a bounded channel, and lets `queue_parallelism` cycle workers drain it.
//! Each message gets its own cycle. Cycles share the pipeline and nothing else.
//!
//! ⚠️ Workers stay private. Like Fight Club, but for async tasks.

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::app_config::RuntimeConfig;
use crate::pipeline::CollectionPipeline;
use crate::telemetry::CycleTelemetry;
use workers::{CycleWorker, Worker};

/// 📋 What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// ✅ A cycle ran (its flags may still say it had a rough time).
    Completed(CycleTelemetry),
    /// 💀 The message was malformed; no stage ran.
    Rejected { message: String, reason: String },
}

/// 📦 The Supervisor: hands out messages, waits for everyone to finish, collects the paperwork.
#[derive(Debug)]
pub struct Supervisor {
    pipeline: Arc<CollectionPipeline>,
    runtime: RuntimeConfig,
}

impl Supervisor {
    pub fn new(pipeline: Arc<CollectionPipeline>, runtime: RuntimeConfig) -> Self {
        Self { pipeline, runtime }
    }

    /// 🧵 Drain the feed through the workers. Returns one report per non-blank line.
    ///
    /// Order of reports follows completion, not arrival. Concurrency is like that.
    pub async fn run<R>(&self, mut feed: R) -> Result<Vec<CycleReport>>
    where
        R: AsyncBufRead + Unpin,
    {
        let (tx, rx) = async_channel::bounded::<Vec<u8>>(self.runtime.queue_capacity.max(1));
        let workers = self.runtime.queue_parallelism.max(1);
        info!("🧵 starting {} cycle workers", workers);

        let handles: Vec<_> = (0..workers)
            .map(|id| CycleWorker::new(id, rx.clone(), Arc::clone(&self.pipeline)).start())
            .collect();
        drop(rx);

        // -- raw bytes: a line that isn't UTF-8 is one bad message, not a broken feed
        let mut dispatched = 0usize;
        loop {
            let mut line = Vec::new();
            let read = feed
                .read_until(b'\n', &mut line)
                .await
                .context("💀 Failed to read the next message from the feed")?;
            if read == 0 {
                break;
            }
            if line.trim_ascii().is_empty() {
                continue;
            }
            tx.send(line)
                .await
                .context("💀 Every cycle worker has left the building; nobody is taking messages")?;
            dispatched += 1;
        }
        // -- closing the channel is how workers learn it's home time
        drop(tx);
        debug!("📨 feed drained after {} messages, waiting on workers", dispatched);

        let finished = futures::future::try_join_all(handles)
            .await
            .context("💀 A cycle worker panicked")?;
        let mut reports = Vec::with_capacity(dispatched);
        for worker_reports in finished {
            reports.extend(worker_reports.context("💀 A cycle worker gave up")?);
        }
        Ok(reports)
    }
}
