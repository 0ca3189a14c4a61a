use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use stepgraph_rs::demos;
use stepgraph_rs::service::server;
use stepgraph_rs::workflow::graph::{Executor, GraphDefinition, GraphSpec, RunOutcome};
use stepgraph_rs::workflow::loader::GraphLoader;
use stepgraph_rs::{EngineConfig, WorkflowService};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API with the demo graphs preloaded
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Worker tasks draining the run queue
        #[arg(short, long)]
        workers: Option<usize>,

        /// Default round budget per run
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Run a graph file in-process against the demo steps
    Run {
        /// Path to a YAML or JSON graph file
        #[arg(short, long)]
        file: PathBuf,

        /// Run input as JSON; plain text is passed as a string
        #[arg(short, long, default_value = "null")]
        input: String,

        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Run the code review demo
    Demo {
        /// Source code to review
        #[arg(short, long)]
        input: Option<String>,
    },
    /// List registered steps and predicates
    Steps,
}

const SAMPLE_CODE: &str = r#"
def process_data(data):
    for item in data:
        if item > 10:
            print("Complex logic here")
            nested = True
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = EngineConfig::from_env()?;

    match args.command {
        Commands::Serve {
            host,
            port,
            workers,
            max_rounds,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(max_rounds) = max_rounds {
                config.max_rounds = max_rounds;
            }
            config.validate()?;

            let service = WorkflowService::new(demos::registry().await, config);
            demos::install(&service).await?;
            for (graph_id, _) in demos::graph_specs() {
                log::info!("Startup: loaded '{}' graph", graph_id);
            }
            server::serve(Arc::new(service)).await?;
        }
        Commands::Run {
            file,
            input,
            max_rounds,
        } => {
            let spec = GraphLoader::new()
                .load_graph(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            let input = serde_json::from_str(&input).unwrap_or(Value::String(input));
            let budget = max_rounds.unwrap_or(config.max_rounds);
            run_in_process(&spec, input, budget, config.max_rounds_limit).await?;
        }
        Commands::Demo { input } => {
            let code = input.unwrap_or_else(|| SAMPLE_CODE.to_string());
            run_in_process(
                &demos::code_review::graph_spec(),
                Value::String(code),
                config.max_rounds,
                config.max_rounds_limit,
            )
            .await?;
        }
        Commands::Steps => {
            let registry = demos::registry().await;
            println!("Steps:");
            for name in registry.step_names().await {
                println!("  {}", name);
            }
            println!("Predicates:");
            for name in registry.predicate_names().await {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

async fn run_in_process(
    spec: &GraphSpec,
    input: Value,
    max_rounds: u32,
    max_rounds_limit: u32,
) -> anyhow::Result<()> {
    stepgraph_rs::config::validate_max_rounds(max_rounds, max_rounds_limit)?;
    let registry = demos::registry().await;
    let graph = GraphDefinition::build(spec, &registry).await?;

    println!("Running graph: {}", graph.name());
    let outcome = Executor::new(max_rounds)
        .run(&graph, graph.initial_state(input))
        .await;

    println!("\nTrace:");
    for entry in outcome.state().logs() {
        println!(" - {}", entry);
    }
    for decision in outcome.state().routes() {
        println!("   route (round {}): {}", decision.round, decision);
    }
    println!("\nFinal data: {}", outcome.state().to_json());

    match outcome {
        RunOutcome::Completed(_) => Ok(()),
        RunOutcome::Failed { error, .. } => Err(anyhow::anyhow!(error)),
    }
}
