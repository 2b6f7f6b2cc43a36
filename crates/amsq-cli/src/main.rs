//! 🚀 amsq-cli — the front door of the queue handler.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, feeds messages to the pipeline, prints the scoreboard.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use amsq::supervisors::CycleReport;

/// 📡 Ship metrics snapshots to Log Analytics, one paced cycle per queue message.
#[derive(Debug, Parser)]
#[command(name = "amsq", version, about)]
struct Cli {
    /// 🔧 TOML config layered over the environment. Defaults to ./amsq.toml when it exists.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 📨 Newline-delimited invocation messages. `-` (the default) reads stdin.
    #[arg(long, short, default_value = "-")]
    messages: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    // 🔒 an explicit --config must exist; the implicit default may be absent
    let config_file = match cli.config {
        Some(path) => {
            let exists = path
                .try_exists()
                .context(format!("💀 Couldn't check whether '{}' exists", path.display()))?;
            anyhow::ensure!(exists, "💀 Configuration file '{}' does not exist", path.display());
            Some(path)
        }
        None => Some(PathBuf::from("amsq.toml")).filter(|p| p.is_file()),
    };

    let app_config = amsq::app_config::load_config(config_file.as_deref())
        .context("💀 In amsq-cli, we couldn't load the configuration")?;

    let feed: Box<dyn AsyncBufRead + Unpin> = if cli.messages == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&cli.messages)
            .await
            .context(format!("💀 The message feed '{}' would not open", cli.messages))?;
        Box::new(BufReader::new(file))
    };

    let reports = amsq::run(app_config, feed).await?;
    println!("{}", scoreboard(&reports));
    Ok(())
}

/// 🍽️ One row per message, so a local run ends with something a human can read.
fn scoreboard(reports: &[CycleReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "invocation",
        "log type",
        "records",
        "fetch failed",
        "ingest failed",
        "slept (s)",
        "total (s)",
    ]);
    for report in reports {
        match report {
            CycleReport::Completed(t) => {
                table.add_row(vec![
                    t.parent_invocation_id.clone(),
                    t.log_type.clone(),
                    t.record_count.to_string(),
                    t.read_blob_failure_count.count().to_string(),
                    t.laws_insertion_failure_count.count().to_string(),
                    format!("{:.2}", t.ams_code_sleep_time),
                    format!("{:.2}", t.time_used_by_ams),
                ]);
            }
            CycleReport::Rejected { reason, .. } => {
                table.add_row(vec![
                    "<rejected>".to_string(),
                    reason.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]);
            }
        }
    }
    table
}
