use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use cluster_cron::bootstrap::ScriptBootstrap;
use cluster_cron::config::{SchedulerConfig, INIT_SCRIPT_PROPERTY, LAYER_PROPERTY};
use cluster_cron::engine::MemoryEngineFactory;
use cluster_cron::job::{JobDefinition, JobDetail, JobKey};
use cluster_cron::leadership::LocalElection;
use cluster_cron::shutdown::install_shutdown_handler;
use cluster_cron::trigger::CronSchedule;
use cluster_cron::JobScheduler;

#[derive(Parser, Debug)]
#[command(name = "cluster-cron")]
#[command(version)]
#[command(about = "Leadership-aware cron job scheduler node")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a scheduler node until SIGINT/SIGTERM
    Run(RunArgs),

    /// Check a jobs file and show when each job fires next
    Validate {
        /// Jobs file (JSON list)
        jobs: PathBuf,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Node ID within the in-process election
    #[arg(long, default_value = "1")]
    node_id: u64,

    /// Cluster layer; overrides `it.water.connectors.jobscheduler.layer`
    #[arg(long)]
    layer: Option<String>,

    /// Store init script; overrides `it.water.connectors.jobscheduler.init.script`
    #[arg(long)]
    init_script: Option<PathBuf>,

    /// Directory holding the default init script
    #[arg(long, default_value = ".")]
    resource_dir: PathBuf,

    /// Configuration property, repeatable (format: KEY=VALUE)
    #[arg(long = "property", short = 'p')]
    properties: Vec<String>,

    /// Jobs to register after activation (JSON list)
    #[arg(long)]
    jobs: Option<PathBuf>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn default_active() -> bool {
    true
}

/// One entry of a jobs file.
#[derive(Debug, Deserialize)]
struct JobSpec {
    name: String,
    #[serde(default)]
    group: Option<String>,
    job_type: String,
    cron: String,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

fn job_key(name: String, group: Option<String>) -> JobKey {
    match group {
        Some(group) => JobKey::new(name, group),
        None => JobKey::in_default_group(name),
    }
}

impl JobSpec {
    fn into_definition(self) -> JobDefinition {
        let mut detail = JobDetail::new(job_key(self.name, self.group), self.job_type);
        detail.description = self.description;
        detail.data = self.data;
        JobDefinition::new(detail, self.cron).with_active(self.active)
    }
}

#[derive(Serialize)]
struct ValidationOutput {
    job: String,
    cron: String,
    valid: bool,
    next_fire: Option<String>,
    error: Option<String>,
}

fn parse_properties(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|entry| match entry.split_once('=') {
            Some((key, value)) => Some((key.trim().to_string(), value.trim().to_string())),
            None => {
                tracing::warn!(entry = %entry, "Invalid property, expected KEY=VALUE");
                None
            }
        })
        .collect()
}

async fn load_jobs(path: &Path) -> Result<Vec<JobSpec>, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn run_node(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut properties = parse_properties(&args.properties);
    if let Some(layer) = args.layer {
        properties.push((LAYER_PROPERTY.to_string(), layer));
    }
    if let Some(script) = args.init_script {
        properties.push((
            INIT_SCRIPT_PROPERTY.to_string(),
            script.display().to_string(),
        ));
    }
    let config = SchedulerConfig::from_properties(properties);

    let election = LocalElection::new(true);
    let scheduler = JobScheduler::new(
        Arc::new(MemoryEngineFactory),
        Arc::new(election.node(args.node_id)),
        Arc::new(ScriptBootstrap::new(args.resource_dir)),
    );

    let shutdown = install_shutdown_handler();
    scheduler.activate(&config).await?;

    if let Some(path) = args.jobs {
        for spec in load_jobs(&path).await? {
            let job = spec.into_definition();
            if let Err(e) = scheduler.add_job(&job).await {
                tracing::error!(job = ?job.key, error = %e, "Failed to register job");
            }
        }
    }

    tracing::info!(node_id = args.node_id, mode = %scheduler.mode(), "Node ready");
    shutdown.cancelled().await;
    scheduler.deactivate().await;
    Ok(())
}

async fn validate_jobs(path: &Path, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let results: Vec<ValidationOutput> = load_jobs(path)
        .await?
        .into_iter()
        .map(|spec| {
            let job = job_key(spec.name, spec.group).to_string();
            match CronSchedule::parse(&spec.cron) {
                Ok(schedule) => ValidationOutput {
                    job,
                    cron: spec.cron,
                    valid: true,
                    next_fire: schedule.next_fire_after(now).map(|t| t.to_rfc3339()),
                    error: None,
                },
                Err(e) => ValidationOutput {
                    job,
                    cron: spec.cron,
                    valid: false,
                    next_fire: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Table => {
            println!("{:<32} {:<24} {:<6} NEXT FIRE", "JOB", "CRON", "VALID");
            for r in &results {
                let next = match (&r.next_fire, &r.error) {
                    (Some(t), _) => t.clone(),
                    (None, Some(e)) => e.clone(),
                    (None, None) => "-".to_string(),
                };
                println!("{:<32} {:<24} {:<6} {}", r.job, r.cron, r.valid, next);
            }
        }
    }

    if results.iter().any(|r| !r.valid) {
        return Err("jobs file contains invalid cron expressions".into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run(run_args) => run_node(run_args).await,
        Commands::Validate { jobs, output } => validate_jobs(&jobs, output).await,
    }
}
