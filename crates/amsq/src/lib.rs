//! 📡 amsq — fetch a metrics snapshot, turn it into log records, ship it signed, nap until the
//! cycle's up, and say one JSON line about it. Once per queue message. Forever.

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod signature;
pub mod supervisors;
pub mod telemetry;
pub mod transforms;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncBufRead;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::{BlobSource, InMemorySink, LawsClient, SinkBackend, SourceBackend, load_fallback_snapshot};
use crate::error::ConfigError;
use crate::pipeline::{CollectionPipeline, LogTypePool};
use crate::signature::ShippingCredentials;
use crate::supervisors::{CycleReport, Supervisor};
use crate::transforms::RecordTransformer;

/// 🏗️ Wire every backend from config. Everything that can be wrong with the setup is wrong HERE,
/// before the first message is read: bad secret, missing fallback, broken endpoint template.
pub fn build_pipeline(app_config: &AppConfig) -> Result<CollectionPipeline, ConfigError> {
    app_config.validate()?;

    let credentials = Arc::new(ShippingCredentials::new(
        app_config.workspace_id.clone(),
        app_config.shared_secret.as_deref(),
    )?);
    let fallback = Arc::new(load_fallback_snapshot(&app_config.source.fallback_path)?);

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(app_config.ingestion.timeout_ms.max(app_config.source.timeout_ms)))
        .build()
        .map_err(ConfigError::HttpClient)?;

    let source = SourceBackend::Blob(BlobSource::new(
        http.clone(),
        app_config.source.blob_url.clone(),
        Duration::from_millis(app_config.source.timeout_ms),
    ));

    let laws = LawsClient::new(
        http,
        credentials,
        &app_config.ingestion.endpoint_template,
        Duration::from_millis(app_config.ingestion.timeout_ms),
    )?;
    let sink = if app_config.ingestion.dry_run {
        info!("🧪 dry run: records for {} will stay in memory", laws.endpoint());
        SinkBackend::InMemory(InMemorySink::discarding())
    } else {
        SinkBackend::Laws(laws)
    };

    let transformer = RecordTransformer::new(
        app_config.provider_version.clone(),
        app_config.provider_instance.clone(),
        app_config.provider_metadata.clone(),
    );

    Ok(CollectionPipeline::new(source, fallback, transformer, sink, app_config.provider_version.clone())
        .with_tables(LogTypePool {
            prefix: app_config.ingestion.log_type_prefix.clone(),
            size: app_config.ingestion.log_type_pool_size,
        })
        .with_target_interval(app_config.target_interval()?))
}

/// 🚀 Build the pipeline, then run one cycle per line of `feed`.
pub async fn run<R>(app_config: AppConfig, feed: R) -> Result<Vec<CycleReport>>
where
    R: AsyncBufRead + Unpin,
{
    let pipeline = build_pipeline(&app_config).context("💀 Could not wire the pipeline from the configuration")?;
    info!(
        "🚀 pipeline ready: {}s cycles, {} workers",
        pipeline.target_interval().as_secs_f64(),
        app_config.runtime.queue_parallelism
    );
    Supervisor::new(Arc::new(pipeline), app_config.runtime.clone())
        .run(feed)
        .await
        .context("💀 The supervisor could not finish draining the feed")
}
