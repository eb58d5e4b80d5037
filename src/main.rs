use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use eventflow_rs::flow::action::ActionRegistry;
use eventflow_rs::flow::dot::entity;
use eventflow_rs::flow::graph::CompiledGraph;
use eventflow_rs::flow::invoker::FlowInput;
use eventflow_rs::tracker::{FlowLoader, Tracker, TrackerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow for one event
    Run {
        /// Path to the flow file (YAML or JSON)
        #[arg(short, long)]
        flow: String,

        /// Event document, inline JSON or a path to a JSON file
        #[arg(short, long)]
        event: String,

        /// Profile document, inline JSON or a path to a JSON file
        #[arg(short, long)]
        profile: Option<String>,

        /// Session document, inline JSON or a path to a JSON file
        #[arg(short, long)]
        session: Option<String>,

        /// Run debug nodes and print the call trace
        #[arg(short, long)]
        debug: bool,

        /// Redis URL for the identity lock (overrides EVENTFLOW_REDIS_URL)
        #[arg(long)]
        redis_url: Option<String>,
    },
    /// Check that a flow file compiles
    Validate {
        /// Path to the flow file (YAML or JSON)
        #[arg(short, long)]
        flow: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            flow,
            event,
            profile,
            session,
            debug,
            redis_url,
        } => {
            let definition = FlowLoader::new()
                .load_flow(&flow)
                .with_context(|| format!("Failed to load flow {}", flow))?;

            let mut config = TrackerConfig::from_env()?;
            if let Some(url) = redis_url {
                config = config.with_redis_url(&url);
            }

            let registry = ActionRegistry::with_builtins().await;
            let tracker = Tracker::from_config(definition, registry, &config)?;
            log::info!(
                "Loaded flow '{}' with {} nodes",
                tracker.graph().id(),
                tracker.graph().order().len()
            );

            let event = read_document(&event)?;
            let profile = match profile {
                Some(doc) => read_document(&doc)?,
                None => json!({}),
            };
            let session = match session {
                Some(doc) => read_document(&doc)?,
                None => json!({}),
            };

            let input = FlowInput::new(event)
                .with_profile(entity(profile))
                .with_session(entity(session))
                .with_debug(debug);
            let outcome = tracker.track(input).await?;
            tracker.close().await;

            let mut report = json!({
                "flow_id": outcome.flow_id,
                "event_id": outcome.event_id,
                "profile": outcome.profile_snapshot(),
                "session": outcome.session_snapshot(),
                "profile_replaced": outcome.profile_replaced,
                "session_replaced": outcome.session_replaced,
                "errors": outcome
                    .errors
                    .iter()
                    .map(|f| json!({"node_id": f.node_id, "error": f.error.to_string()}))
                    .collect::<Vec<_>>(),
                "metrics": outcome.metrics,
                "console": outcome.console,
            });
            if let Some(trace) = &outcome.trace {
                report["trace"] = serde_json::to_value(trace)?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !outcome.is_success() {
                anyhow::bail!("Flow stopped with {} error(s)", outcome.errors.len());
            }
        }
        Commands::Validate { flow } => {
            let definition = FlowLoader::new()
                .load_flow(&flow)
                .with_context(|| format!("Failed to load flow {}", flow))?;
            let graph = CompiledGraph::compile(&definition)?;
            println!(
                "Flow '{}' is valid: {} nodes, start nodes {:?}",
                graph.id(),
                graph.order().len(),
                graph.start_nodes()
            );
        }
    }

    Ok(())
}

/// Parse `input` as JSON, or read it as a path to a JSON file
fn read_document(input: &str) -> anyhow::Result<Value> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(input).context("Invalid inline JSON document");
    }
    let content = fs::read_to_string(Path::new(input))
        .with_context(|| format!("Failed to read {}", input))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", input))
}
