use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};

use lifeflow_rules::classifier::RemoteClassifier;
use lifeflow_rules::config::PipelineConfig;
use lifeflow_rules::pipeline::orchestrator::BatchProcessor;
use lifeflow_rules::pipeline::stats::processing_stats;
use lifeflow_rules::pipeline::types::RawMessage;
use lifeflow_rules::rules::RuleDefinition;
use lifeflow_rules::store::{Database, LibSqlBackend};

const USAGE: &str = "\
usage:
  lifeflow-rules run <owner> <messages.json> [rules.json]
  lifeflow-rules preview <owner> <message.json>
  lifeflow-rules stats <owner> [days]
  lifeflow-rules health";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("health") {
        let config = PipelineConfig::from_env()?;
        let remote = RemoteClassifier::new(config.classifier.clone(), config.min_confidence);
        let report = match remote.health().await {
            Ok(()) => serde_json::json!({ "remote": "ok" }),
            Err(e) => serde_json::json!({ "remote": "unavailable", "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (command, owner) = match args.as_slice() {
        [command, owner, ..] => (command.as_str(), owner.as_str()),
        _ => bail!("{USAGE}"),
    };

    let config = PipelineConfig::from_env()?;
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .with_context(|| format!("opening database at {}", config.database_path.display()))?,
    );

    let output = match (command, &args[2..]) {
        ("run", [messages, rest @ ..]) => {
            if let Some(rules) = rest.first() {
                seed_rules(db.as_ref(), owner, Path::new(rules)).await?;
            }
            let messages: Vec<RawMessage> = read_json(Path::new(messages))?;
            let processor = BatchProcessor::from_config(Arc::clone(&db), &config);
            let summary = processor.run(owner, &messages, &config.batch_options()).await?;
            serde_json::to_string_pretty(&summary)?
        }
        ("preview", [message]) => {
            let message: RawMessage = read_json(Path::new(message))?;
            let processor = BatchProcessor::from_config(Arc::clone(&db), &config);
            let preview = processor.preview(owner, &message).await?;
            serde_json::to_string_pretty(&preview)?
        }
        ("stats", rest) => {
            let days = match rest.first() {
                Some(days) => days.parse().with_context(|| format!("invalid day count '{days}'"))?,
                None => 7,
            };
            let stats = processing_stats(db.as_ref(), owner, days).await?;
            serde_json::to_string_pretty(&stats)?
        }
        _ => bail!("{USAGE}"),
    };
    println!("{output}");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn seed_rules(db: &dyn Database, owner: &str, path: &Path) -> anyhow::Result<()> {
    let definitions: Vec<RuleDefinition> = read_json(path)?;
    let count = definitions.len();
    for definition in definitions {
        db.create_rule(&definition.into_rule(owner)).await?;
    }
    tracing::info!(owner = %owner, rules = count, "Rules seeded");
    Ok(())
}
