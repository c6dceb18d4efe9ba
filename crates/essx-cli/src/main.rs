//! 🚀 essx-cli — the front desk of essx.
//!
//! 🎬 *[narrator voice]* "It all started with a YAML file nobody wanted to apply by hand..."
//! 📦 This binary loads config, sets up logging, keeps a little JSON state file
//! that plays the part of a control plane, and lets the library do the
//! reconciling. Like a manager. 🦆

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table};
use tracing::error;
use tracing_subscriber::EnvFilter;

use essx::app_config::{AppConfig, load_config};
use essx::gateway::HttpConnector;
use essx::host::{self, AdmissionReport, ObjectReport, StateFile};
use essx::reconciler::Reconciler;

#[derive(Parser)]
#[command(name = "essx", about = "Converge Elasticsearch indices, templates and pipelines")]
struct Cli {
    /// TOML config file. Missing file means environment variables only.
    #[arg(long, short, default_value = "essx.toml", env = "ESSX_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One reconciliation pass over every configured object
    Apply {
        #[arg(long, default_value = "essx-state.json")]
        state: PathBuf,
    },
    /// Mark objects for deletion and run the cleanup pass
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long, default_value = "essx-state.json")]
        state: PathBuf,
    },
    /// Default and validate every object without contacting a cluster
    Validate {
        #[arg(long, default_value = "essx-state.json")]
        state: PathBuf,
    },
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
    let config_file = existing_config(&cli.config)?;
    let app_config = load_config(config_file).context(
        "💀 Couldn't load the essx config. Check the file, check the ESSX_* variables, \
         check that nobody put a tab where a space should be.",
    )?;

    match cli.command {
        Commands::Apply { state } => apply(&app_config, &state).await,
        Commands::Delete { names, state } => delete(&app_config, &state, &names).await,
        Commands::Validate { state } => validate(&app_config, &state).await,
    }
}

/// 🔒 A config path that does not exist means "env only".
fn existing_config(path: &Path) -> Result<Option<&Path>> {
    let exists = path.try_exists().with_context(|| {
        format!(
            "💀 Could not check whether the config file exists. Was checking here: '{}'",
            path.display()
        )
    })?;
    Ok(exists.then_some(path))
}

fn reconciler(app_config: &AppConfig) -> Reconciler<HttpConnector> {
    Reconciler::new(
        app_config.runtime.clone(),
        HttpConnector::new(app_config.transport_options()),
    )
}

async fn apply(app_config: &AppConfig, state_path: &Path) -> Result<()> {
    let mut state = StateFile::load(state_path).await?;
    let reports = host::apply(app_config, &reconciler(app_config), &mut state).await;
    state.save(state_path).await?;
    println!("{}", status_table(&reports));
    Ok(())
}

async fn delete(app_config: &AppConfig, state_path: &Path, names: &[String]) -> Result<()> {
    let mut state = StateFile::load(state_path).await?;
    let summary = host::delete(app_config, &reconciler(app_config), &mut state, names).await;
    state.save(state_path).await?;
    println!("{}", status_table(&summary.reports));
    for name in &summary.missing {
        println!("🤷 `{name}` is not in the config or the state file");
    }
    Ok(())
}

async fn validate(app_config: &AppConfig, state_path: &Path) -> Result<()> {
    let state = StateFile::load(state_path).await?;
    println!("{}", admission_table(&host::validate(app_config, &state)));
    Ok(())
}

fn status_table(reports: &[ObjectReport]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Name", "State", "Code", "Message", "Marker", "Next check"]);
    for report in reports {
        let (state, code, message) = match &report.status {
            Some(status) => (
                status.state.to_string(),
                status.code.map(|c| c.to_string()).unwrap_or_default(),
                status.message.clone(),
            ),
            None => ("Pending".to_string(), String::new(), String::new()),
        };
        table.add_row(vec![
            Cell::new(report.kind),
            Cell::new(&report.name),
            Cell::new(state),
            Cell::new(code),
            Cell::new(message),
            Cell::new(format!("{:?}", report.marker)),
            Cell::new(next_check(report.recheck)),
        ]);
    }
    table
}

fn admission_table(reports: &[AdmissionReport]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Name", "Verdict"]);
    for report in reports {
        let verdict = match &report.verdict {
            Ok(()) => "✅ admitted".to_string(),
            Err(reason) => reason.clone(),
        };
        table.add_row(vec![
            Cell::new(report.kind),
            Cell::new(&report.name),
            Cell::new(verdict),
        ]);
    }
    table
}

fn next_check(delay: Option<Duration>) -> String {
    match delay {
        Some(delay) => format!("in {}s", delay.as_secs()),
        None => "-".to_string(),
    }
}
