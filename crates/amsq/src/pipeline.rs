//! 🎬 *[a message lands. a clock starts. ten seconds, no more, no less. unless it's more.]*
//!
//! 🔄 The Collection Pipeline — one cycle per invocation, five stages, no going back:
//!
//! ```text
//!   Fetch ──▶ Transform ──▶ Submit ──▶ Pace ──▶ Report
//!    │  fail? use the fallback, raise a flag
//!                 │  fail? raise a flag, keep going
//!                             │  fail? same flag, still keep going
//!                                       │  sleep(max(0, target − elapsed))
//!                                                 │  one JSON line, then we're done
//! ```
//!
//! 🧠 Knowledge graph:
//! - Fetch and Submit return explicit `Result`s; the pipeline `match`es them into flags. Nothing in
//!   here can make Pace or Report not happen.
//! - The pipeline is `&self` all the way down. Concurrent cycles share one `Arc<CollectionPipeline>`
//!   and none of them can change anything the others can see.
//! - Which table gets the records is an injected `TableChooser`. Random in prod, fixed in tests.
//!
//! 🦆 The duck stays for the whole cycle. Including the nap at the end.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::backends::{Sink, SinkBackend, Source, SourceBackend};
use crate::common::{LogRecord, SourceSnapshot};
use crate::error::{DeliveryError, TransformError};
use crate::queue::QueueMessage;
use crate::telemetry::{CycleTelemetry, FailureFlag, wall_clock};
use crate::transforms::RecordTransformer;

// ===== Table selection =====

/// 🎲 Picks which of the `pool_size` tables gets this cycle's records. Returns `1..=pool_size`.
pub trait TableChooser: std::fmt::Debug + Send + Sync {
    fn choose(&self, pool_size: usize) -> usize;
}

/// 🎲 Uniform over the pool. Spreads write load across tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTableChooser;

impl TableChooser for RandomTableChooser {
    fn choose(&self, pool_size: usize) -> usize {
        fastrand::usize(1..=pool_size.max(1))
    }
}

/// 📌 Always the same table. Tests love it. Load balancers do not.
#[derive(Debug, Clone, Copy)]
pub struct FixedTableChooser(pub usize);

impl TableChooser for FixedTableChooser {
    fn choose(&self, pool_size: usize) -> usize {
        self.0.clamp(1, pool_size.max(1))
    }
}

/// 🏷️ `Table1` … `Table10`, or whatever prefix/size the config says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTypePool {
    pub prefix: String,
    pub size: usize,
}

impl Default for LogTypePool {
    fn default() -> Self {
        Self {
            prefix: "Table".to_string(),
            size: 10,
        }
    }
}

impl LogTypePool {
    pub fn pick(&self, chooser: &dyn TableChooser) -> String {
        format!("{}{}", self.prefix, chooser.choose(self.size))
    }
}

// ===== Pacing =====

/// ⏱️ How long to nap so the cycle lasts `target`. Overran? No nap, no penalty, no catch-up.
pub fn pacing_delay(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

// ===== Submit outcome =====

/// 💀 Why a batch didn't make it. Both roads lead to the same flag.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

// ===== The pipeline =====

/// 🔄 The per-cycle orchestrator. Build once, share behind an `Arc`, call `run_cycle` per message.
#[derive(Debug)]
pub struct CollectionPipeline {
    source: SourceBackend,
    fallback: Arc<SourceSnapshot>,
    transformer: RecordTransformer,
    sink: SinkBackend,
    tables: LogTypePool,
    chooser: Arc<dyn TableChooser>,
    target_interval: Duration,
    provider_version: String,
}

impl CollectionPipeline {
    /// 🏗️ The essentials. Defaults: random chooser over `Table1..=Table10`, 10 s cycles.
    pub fn new(
        source: SourceBackend,
        fallback: Arc<SourceSnapshot>,
        transformer: RecordTransformer,
        sink: SinkBackend,
        provider_version: impl Into<String>,
    ) -> Self {
        Self {
            source,
            fallback,
            transformer,
            sink,
            tables: LogTypePool::default(),
            chooser: Arc::new(RandomTableChooser),
            target_interval: Duration::from_secs(10),
            provider_version: provider_version.into(),
        }
    }

    pub fn with_tables(mut self, tables: LogTypePool) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_table_chooser(mut self, chooser: Arc<dyn TableChooser>) -> Self {
        self.chooser = chooser;
        self
    }

    pub fn with_target_interval(mut self, target_interval: Duration) -> Self {
        self.target_interval = target_interval;
        self
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// 🚀 One full cycle. Infallible by construction: every failure ends up as a flag.
    pub async fn run_cycle(&self, message: &QueueMessage) -> CycleTelemetry {
        let started = Instant::now();
        let started_wall = Utc::now();
        let start_time_from_queue_push = started_wall.timestamp().saturating_sub(message.epoch_time);
        let mut read_blob_failure_count = FailureFlag::default();
        let mut laws_insertion_failure_count = FailureFlag::default();
        debug!("🚀 cycle started for invocation '{}'", message.invocation_id);

        // -- 1. Fetch
        let snapshot = self.fetch_or_fallback(&mut read_blob_failure_count).await;
        let fetched = Instant::now();

        // -- 2. Transform + 3. Submit
        let log_type = self.tables.pick(self.chooser.as_ref());
        let (record_count, submitted) = self.transform_and_submit(&snapshot, &log_type).await;
        if let Err(err) = submitted {
            error!("💀 failed to push data to '{}': {}", log_type, err);
            laws_insertion_failure_count.raise();
        }
        let submitted_at = Instant::now();

        // -- 4. Pace
        let sleep_for = pacing_delay(self.target_interval, started.elapsed());
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }

        // -- 5. Report
        let finished_wall = Utc::now();
        let telemetry = CycleTelemetry {
            msg: message.raw.clone(),
            parent_invocation_id: message.invocation_id.clone(),
            start_time_from_queue_push,
            read_blob_time: (fetched - started).as_secs_f64(),
            laws_finish_time: (submitted_at - fetched).as_secs_f64(),
            ams_code_execution_time: (submitted_at - started).as_secs_f64(),
            ams_code_sleep_time: sleep_for.as_secs_f64(),
            queue_sleep_time: self.target_interval.as_secs_f64(),
            time_used_by_ams: started.elapsed().as_secs_f64(),
            ams_control_start_time_epoch: wall_clock(started_wall),
            ams_control_end_time_epoch: wall_clock(finished_wall),
            finish_time_from_queue_push: finished_wall.timestamp().saturating_sub(message.epoch_time),
            provider_version: self.provider_version.clone(),
            log_type,
            record_count,
            read_blob_failure_count,
            laws_insertion_failure_count,
        };
        telemetry.emit();
        telemetry
    }

    /// 📡 Remote first. Anything goes wrong: fallback snapshot, flag raised, no questions asked.
    async fn fetch_or_fallback(&self, failure: &mut FailureFlag) -> Arc<SourceSnapshot> {
        match self.source.fetch().await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                warn!("⚠️ failed to get blob data, using the local snapshot: {}", err);
                failure.raise();
                Arc::clone(&self.fallback)
            }
        }
    }

    /// 🔄📡 Transform, serialize as one JSON array, send. Returns how many records were built.
    async fn transform_and_submit(&self, snapshot: &SourceSnapshot, log_type: &str) -> (usize, Result<(), SubmitError>) {
        let records = match self.transformer.transform(&snapshot.cols, &snapshot.results) {
            Ok(records) => records,
            Err(err) => return (0, Err(err.into())),
        };
        let sent = self.submit(log_type, &records).await;
        (records.len(), sent.map_err(SubmitError::from))
    }

    async fn submit(&self, log_type: &str, records: &[LogRecord]) -> Result<(), DeliveryError> {
        let payload = serde_json::to_vec(records)?;
        debug!("📦 shipping {} records ({} bytes) to '{}'", records.len(), payload.len(), log_type);
        self.sink.send(log_type, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BlobSource, InMemorySink, InMemorySource, LawsClient};
    use crate::signature::ShippingCredentials;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote_snapshot() -> SourceSnapshot {
        SourceSnapshot {
            cols: vec!["_internal".into(), "A".into(), "DUMMY".into(), "B".into()],
            results: vec![vec![json!(9), json!("x"), json!("ignored"), json!("y")]],
        }
    }

    fn fallback_snapshot() -> Arc<SourceSnapshot> {
        Arc::new(SourceSnapshot {
            cols: vec!["LOCAL".into()],
            results: vec![vec![json!("from-disk")], vec![json!("also-from-disk")]],
        })
    }

    fn message() -> QueueMessage {
        QueueMessage::parse(format!(r#"{{"invocation_id":"abc","epoch_time":{}}}"#, Utc::now().timestamp()).as_bytes())
            .unwrap()
    }

    fn pipeline(source: InMemorySource, sink: InMemorySink, interval: Duration) -> CollectionPipeline {
        CollectionPipeline::new(
            SourceBackend::InMemory(source),
            fallback_snapshot(),
            RecordTransformer::new("8.1", "foobar", json!({})),
            SinkBackend::InMemory(sink),
            "8.1",
        )
        .with_table_chooser(Arc::new(FixedTableChooser(3)))
        .with_target_interval(interval)
    }

    fn shipped_records(sink: &InMemorySink) -> Vec<Value> {
        let shipments = sink.shipments();
        assert_eq!(shipments.len(), 1, "exactly one delivery attempt per cycle");
        serde_json::from_slice(&shipments[0].payload).unwrap()
    }

    #[test]
    fn the_one_where_the_nap_fills_the_gap() {
        assert_eq!(pacing_delay(Duration::from_secs(10), Duration::from_secs(3)), Duration::from_secs(7));
        assert_eq!(pacing_delay(Duration::from_secs(10), Duration::from_secs(15)), Duration::ZERO);
        assert_eq!(pacing_delay(Duration::from_secs(10), Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn the_one_where_the_pool_names_tables() {
        let pool = LogTypePool::default();
        assert_eq!(pool.pick(&FixedTableChooser(3)), "Table3");
        assert_eq!(pool.pick(&FixedTableChooser(99)), "Table10");
        for _ in 0..100 {
            let n = RandomTableChooser.choose(10);
            assert!((1..=10).contains(&n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_fast_work_still_takes_the_full_interval() {
        let sink = InMemorySink::new().with_delay(Duration::from_secs(3));
        let pipe = pipeline(InMemorySource::new(remote_snapshot()), sink.clone(), Duration::from_secs(10));

        let clock = Instant::now();
        let telemetry = pipe.run_cycle(&message()).await;

        assert!(clock.elapsed() >= Duration::from_secs(10));
        assert!((telemetry.ams_code_sleep_time - 7.0).abs() < 0.01, "slept {}", telemetry.ams_code_sleep_time);
        assert!(telemetry.time_used_by_ams >= 9.99);
        assert_eq!(telemetry.queue_sleep_time, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_slow_work_gets_no_nap() {
        let sink = InMemorySink::new().with_delay(Duration::from_secs(15));
        let pipe = pipeline(InMemorySource::new(remote_snapshot()), sink, Duration::from_secs(10));

        let clock = Instant::now();
        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.ams_code_sleep_time, 0.0);
        // -- no extra delay beyond the work itself
        assert!(clock.elapsed() < Duration::from_secs(16));
        assert!(telemetry.time_used_by_ams >= 14.99);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_blob_is_down_and_the_disk_saves_the_day() {
        let sink = InMemorySink::new();
        let pipe = pipeline(InMemorySource::failing(), sink.clone(), Duration::from_secs(10));

        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.read_blob_failure_count.count(), 1);
        assert_eq!(telemetry.laws_insertion_failure_count.count(), 0);
        assert_eq!(telemetry.record_count, 2);
        let records = shipped_records(&sink);
        assert_eq!(records[0]["LOCAL"], json!("from-disk"));
        assert_eq!(records[1]["LOCAL"], json!("also-from-disk"));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_everything_fails_and_the_cycle_still_finishes() {
        let sink = InMemorySink::answering(500);
        let pipe = pipeline(InMemorySource::failing(), sink.clone(), Duration::from_secs(10));

        let clock = Instant::now();
        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.read_blob_failure_count.count(), 1);
        assert_eq!(telemetry.laws_insertion_failure_count.count(), 1);
        assert_eq!(sink.shipments().len(), 1, "no retry within a cycle");
        assert!(clock.elapsed() >= Duration::from_secs(10), "pacing still happens");
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_ragged_matrix_counts_as_one_ingestion_failure() {
        let ragged = SourceSnapshot {
            cols: vec!["A".into(), "B".into()],
            results: vec![vec![json!(1)], vec![json!(2)]],
        };
        let sink = InMemorySink::new();
        let pipe = pipeline(InMemorySource::new(ragged), sink.clone(), Duration::from_secs(1));

        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.laws_insertion_failure_count.count(), 1);
        assert_eq!(telemetry.record_count, 0);
        assert!(sink.shipments().is_empty(), "nothing half-aligned gets shipped");
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_epoch_time_is_from_the_edge_of_time() {
        let pipe = pipeline(InMemorySource::new(remote_snapshot()), InMemorySink::new(), Duration::from_secs(1));

        for epoch in [i64::MIN, i64::MAX] {
            let message =
                QueueMessage::parse(format!(r#"{{"invocation_id":"edge","epoch_time":{epoch}}}"#).as_bytes()).unwrap();
            let telemetry = pipe.run_cycle(&message).await;
            assert_eq!(telemetry.parent_invocation_id, "edge");
            assert_eq!(telemetry.read_blob_failure_count.count(), 0);
        }
        let message = QueueMessage::parse(format!(r#"{{"invocation_id":"old","epoch_time":{}}}"#, i64::MIN).as_bytes())
            .unwrap();
        assert_eq!(pipe.run_cycle(&message).await.start_time_from_queue_push, i64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_records_come_out_right() {
        let sink = InMemorySink::new();
        let pipe = pipeline(InMemorySource::new(remote_snapshot()), sink.clone(), Duration::from_secs(1));

        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.log_type, "Table3");
        assert_eq!(sink.shipments()[0].log_type, "Table3");
        let records = shipped_records(&sink);
        let record = records[0].as_object().unwrap();
        assert_eq!(record["A"], json!("x"));
        assert_eq!(record["B"], json!("y"));
        assert!(!record.contains_key("_internal"));
        assert!(!record.contains_key("DUMMY"));
        for reserved in ["SAPMON_VERSION", "PROVIDER_INSTANCE", "METADATA", "Time_Generated"] {
            assert!(record.contains_key(reserved), "missing {reserved}");
        }
    }

    #[tokio::test]
    async fn the_one_where_the_whole_thing_works_over_real_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock_data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cols": ["_internal", "A", "DUMMY", "B"],
                "results": [[9, "x", "ignored", "y"]]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/logs"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let credentials = Arc::new(
            ShippingCredentials::new("abc-workspace", Some("YW1zcS10ZXN0LXNoYXJlZC1rZXktMDEyMzQ1Njc4OQ==")).unwrap(),
        );
        let laws = LawsClient::new(
            http.clone(),
            credentials,
            &format!("{}{{resource}}", server.uri()),
            Duration::from_secs(3),
        )
        .unwrap();
        let blob = BlobSource::new(http, format!("{}/mock_data.json", server.uri()), Duration::from_secs(2));
        let pipe = CollectionPipeline::new(
            SourceBackend::Blob(blob),
            fallback_snapshot(),
            RecordTransformer::new("8.1", "foobar", json!({})),
            SinkBackend::Laws(laws),
            "8.1",
        )
        .with_target_interval(Duration::ZERO);

        let telemetry = pipe.run_cycle(&message()).await;

        assert_eq!(telemetry.read_blob_failure_count.count(), 0);
        assert_eq!(telemetry.laws_insertion_failure_count.count(), 0);
        assert!(telemetry.finish_time_from_queue_push >= telemetry.start_time_from_queue_push);
        assert_eq!(telemetry.parent_invocation_id, "abc");
        assert_eq!(telemetry.record_count, 1);
        assert_eq!(telemetry.provider_version, "8.1");
        assert!(telemetry.log_type.starts_with("Table"));
    }
}
