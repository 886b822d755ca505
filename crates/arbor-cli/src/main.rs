//! Arbor - on-device deployment agent
//!
//! Usage:
//!   arbor run deployment.json ...   # Process deployment documents
//!   arbor winners                   # Show stored scope winners
//!   arbor effective                 # Show the effective component set

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbor_core::agent::Agent;
use arbor_core::config::{AgentConfig, default_config_path};
use arbor_core::context::AgentContext;
use arbor_core::deploy::{DeploymentState, LifecycleRecord, RecordingLifecycleManager};
use arbor_core::document::read_document_file;
use arbor_core::effective::{EffectiveComponentSet, ScopeWinner, merge_winners};
use arbor_core::status::{FleetStatusSnapshot, JobStatusUpdate, StatusTransport};
use arbor_core::types::DeploymentType;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "On-device deployment arbitration agent", long_about = None)]
struct Cli {
    /// Path to arbor.toml (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process deployment documents in order and report their outcome
    ///
    /// Exits non-zero if any deployment did not succeed.
    Run {
        /// Deployment document files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Channel the documents arrive on (jobs, shadow, local)
        #[arg(long = "type", short = 't', default_value = "local")]
        deployment_type: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the winning deployment for each scope
    Winners {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the device-wide effective component set
    Effective {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbor=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = AgentConfig::load(&config_path)?;

    match cli.command {
        Commands::Run {
            files,
            deployment_type,
            format,
        } => {
            let deployment_type = DeploymentType::try_from(deployment_type.as_str())?;
            let exit_code = run_deployments(config, &files, deployment_type, format)?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Winners { format } => {
            let ctx = AgentContext::from_config(config)?;
            let winners = ctx.store().winners();
            match format {
                OutputFormat::Table => print_winners_table(&winners),
                OutputFormat::Json => print_winners_json(&winners)?,
            }
        }
        Commands::Effective { format } => {
            let ctx = AgentContext::from_config(config)?;
            let effective = merge_winners(&ctx.store().winners());
            match format {
                OutputFormat::Table => print_effective_table(&effective),
                OutputFormat::Json => print_effective_json(&effective)?,
            }
        }
    }

    Ok(())
}

fn run_deployments(
    config: AgentConfig,
    files: &[PathBuf],
    deployment_type: DeploymentType,
    format: OutputFormat,
) -> Result<i32> {
    // Read everything up front so a missing file aborts before any state changes
    let documents = files
        .iter()
        .map(|path| read_document_file(path).map(|content| (path.as_path(), content)))
        .collect::<Result<Vec<(&Path, String)>>>()?;

    let ctx = AgentContext::from_config(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let records = runtime.block_on(async move {
        let agent = Agent::start(ctx, Arc::new(RecordingLifecycleManager::new()));
        agent.attach_transport(Arc::new(LogTransport));

        let mut handles = Vec::with_capacity(documents.len());
        for (path, content) in documents {
            let handle = agent
                .enqueue_raw(deployment_type, content)
                .with_context(|| format!("Failed to enqueue {}", path.display()))?;
            handles.push(handle);
        }

        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(handle.wait().await?);
        }

        agent.flush_statuses();
        agent.shutdown().await;
        anyhow::Ok(records)
    })?;

    match format {
        OutputFormat::Table => print_records_table(&records),
        OutputFormat::Json => print_records_json(&records)?,
    }

    let failed = records
        .iter()
        .any(|record| record.state() != DeploymentState::Succeeded);
    Ok(if failed { 1 } else { 0 })
}

/// Status transport that writes every report to the log.
struct LogTransport;

impl StatusTransport for LogTransport {
    fn publish_job_update(&self, update: &JobStatusUpdate) -> bool {
        match serde_json::to_string(update) {
            Ok(payload) => {
                info!(target: "arbor::status", %payload, "Job status update");
                true
            }
            Err(_) => false,
        }
    }

    fn publish_fleet_snapshot(&self, snapshot: &FleetStatusSnapshot) -> bool {
        match serde_json::to_string(snapshot) {
            Ok(payload) => {
                info!(target: "arbor::status", %payload, "Fleet status snapshot");
                true
            }
            Err(_) => false,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_records_table(records: &[LifecycleRecord]) {
    println!(
        "{:<24} {:<7} {:<28} {:<10} Detail",
        "Deployment", "Type", "Scope", "State"
    );
    println!("{}", "-".repeat(90));

    for record in records {
        let scope = record
            .scope
            .as_ref()
            .map(|scope| scope.to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = record
            .detailed_status()
            .map(|status| status.as_str())
            .unwrap_or("-");

        println!(
            "{:<24} {:<7} {:<28} {:<10} {}",
            truncate(&record.deployment_id, 24),
            record.deployment_type.as_str(),
            truncate(&scope, 28),
            record.state().as_str(),
            detail
        );
        if let Some(cause) = record.failure_cause() {
            println!("  {}", cause);
        }
    }
}

fn print_records_json(records: &[LifecycleRecord]) -> Result<()> {
    let output = serde_json::json!({
        "schema_version": 1,
        "deployments": records,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_winners_table(winners: &[Arc<ScopeWinner>]) {
    if winners.is_empty() {
        println!("No deployments accepted yet.");
        return;
    }

    println!(
        "{:<28} {:<24} {:<14} Components",
        "Scope", "Deployment", "Created"
    );
    println!("{}", "-".repeat(80));
    for winner in winners {
        println!(
            "{:<28} {:<24} {:<14} {}",
            truncate(winner.scope_key.as_str(), 28),
            truncate(&winner.deployment_id, 24),
            winner.creation_timestamp,
            winner.components.len()
        );
    }
}

fn print_winners_json(winners: &[Arc<ScopeWinner>]) -> Result<()> {
    let winners: Vec<&ScopeWinner> = winners.iter().map(|winner| winner.as_ref()).collect();
    let output = serde_json::json!({
        "schema_version": 1,
        "winners": winners,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_effective_table(effective: &EffectiveComponentSet) {
    if effective.is_empty() {
        println!("No components deployed.");
        return;
    }

    println!("{:<32} {:<16} Scope", "Component", "Version");
    println!("{}", "-".repeat(70));
    for (name, version) in effective.versions() {
        let scope = effective
            .source(name)
            .map(|scope| scope.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<32} {:<16} {}", truncate(name, 32), truncate(version, 16), scope);
    }
    println!();
    println!("Fingerprint: {}", effective.fingerprint());
}

fn print_effective_json(effective: &EffectiveComponentSet) -> Result<()> {
    let output = serde_json::json!({
        "schema_version": 1,
        "fingerprint": effective.fingerprint(),
        "components": effective.versions(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
