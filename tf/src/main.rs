//! tf binary entry point

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use thinkflow::cli::{Cli, Command};
use thinkflow::config::Config;
use thinkflow::domain::{Filter, IndexValue};
use thinkflow::flow::{FlowDefinition, FlowRegistry, ResultFormat, StepResolver, flow_progress};
use thinkflow::prompts::PromptLoader;
use thinkflow::state::SqliteSessionStore;
use thinkflow::tools::{NextAction, ToolContext, ToolDispatcher, ToolEnvelope};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_ref())?;
    config.validate()?;

    match cli.command {
        Command::Flows => flows(&config),
        Command::Sessions { status } => sessions(&config, status.as_deref()),
        Command::Show { session_id } => show(&config, &session_id),
        Command::Demo { flow_type, topic } => demo(&config, &flow_type, &topic).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_registry(config: &Config) -> Result<FlowRegistry> {
    let mut registry = FlowRegistry::builtin()?;
    if let Some(file) = &config.flows.file {
        registry.load_flows_file(file)?;
    }
    Ok(registry)
}

fn build_context(config: &Config) -> Result<ToolContext> {
    let registry = build_registry(config)?;
    let store = SqliteSessionStore::open(&config.storage.store_dir)?;
    let loader = match &config.prompts.root {
        Some(root) => PromptLoader::new(root),
        None => PromptLoader::new(std::env::current_dir()?),
    };
    Ok(ToolContext::new(
        Arc::new(registry),
        Arc::new(store),
        Arc::new(loader),
        StepResolver::new(config.quality.threshold),
    ))
}

fn flows(config: &Config) -> Result<()> {
    let registry = build_registry(config)?;
    for flow_type in registry.flow_types() {
        let flow = registry.get(flow_type)?;
        println!("{:<28} {:>2} steps  {}", flow_type, flow.total_steps(), flow.description);
    }
    Ok(())
}

fn sessions(config: &Config, status: Option<&str>) -> Result<()> {
    use thinkflow::state::SessionStore;

    let registry = build_registry(config)?;
    let store = SqliteSessionStore::open(&config.storage.store_dir)?;

    let filters: Vec<Filter> = status
        .map(|s| vec![Filter::eq("status", IndexValue::String(s.to_string()))])
        .unwrap_or_default();

    let mut sessions = store.list(&filters)?;
    sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));

    for session in sessions {
        let progress = registry
            .get(&session.flow_type)
            .map(|flow| flow_progress(flow, &session))
            .unwrap_or_else(|_| "?".to_string());
        println!(
            "{:<44} {:<9} {:<24} {:>5}  {}",
            session.session_id,
            session.status,
            session.flow_type,
            progress,
            format_ms(session.updated_at),
        );
    }
    Ok(())
}

fn show(config: &Config, session_id: &str) -> Result<()> {
    use thinkflow::state::SessionStore;

    let store = SqliteSessionStore::open(&config.storage.store_dir)?;
    match store.get(session_id)? {
        Some(versioned) => {
            println!("version: {}", versioned.version);
            println!("{}", serde_json::to_string_pretty(&versioned.state)?);
        }
        None => println!("session not found: {session_id}"),
    }
    Ok(())
}

/// Drive one flow through the dispatcher with canned results
///
/// Exercises the full stack (registry, resolver, store, renderer) without a
/// transport; each envelope is printed as the caller would see it.
async fn demo(config: &Config, flow_type: &str, topic: &str) -> Result<()> {
    let ctx = build_context(config)?;
    let dispatcher = ToolDispatcher::standard();

    let flow = ctx.registry.get(flow_type)?.clone();

    let mut envelope = dispatcher
        .execute("start_thinking", json!({"topic": topic, "flow_type": flow_type}), &ctx)
        .await?;
    print_envelope(&envelope);

    // Generous bound; a demo run never needs anywhere near this many calls
    for _ in 0..64 {
        if envelope.next_action == NextAction::SessionComplete {
            return Ok(());
        }
        let step_result = canned_result(&flow, &envelope.step);
        envelope = dispatcher
            .execute(
                "advance_thinking",
                json!({"session_id": envelope.session_id, "step_result": step_result}),
                &ctx,
            )
            .await?;
        print_envelope(&envelope);
    }

    Err(eyre::eyre!("demo did not complete; flow '{flow_type}' may loop"))
}

/// A result shaped to satisfy the step's declared format, including the
/// list fields any fan-out consumer resolves from it
fn canned_result(flow: &FlowDefinition, step_id: &str) -> Value {
    let Some(step) = flow.step(step_id) else {
        return json!("demo result");
    };

    match step.format {
        ResultFormat::Structured => {
            let mut object = serde_json::Map::new();
            for consumer in &flow.steps {
                if let Some(for_each) = consumer.for_each_ref()
                    && for_each.source == step.step_id
                {
                    let items: Vec<Value> = (1..=3).map(|i| json!({"id": format!("ITEM{i}")})).collect();
                    object.insert(for_each.field.clone(), Value::Array(items));
                }
            }
            if object.is_empty() {
                object.insert("note".to_string(), json!("demo structured result"));
            }
            Value::Object(object)
        }
        ResultFormat::Text => json!(format!("Demo result for step '{step_id}'")),
    }
}

fn print_envelope(envelope: &ToolEnvelope) {
    println!(
        "\n── step {} [{}] → {} ──",
        envelope.step, envelope.metadata.flow_progress, envelope.next_action
    );
    println!("{}", envelope.prompt_text.trim_end());
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
