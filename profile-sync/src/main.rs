//! profile-sync - Elements researcher profile updater
//!
//! Reads overview, research interests and teaching summary from a CSV export
//! and PATCHes them into each researcher's manual record in Elements.
//!
//! ```text
//! profile-sync --input Bulk_Profile_Update.csv --env qa --tunnel
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use elements_common::config::{resolve_config_path, CredentialsFile, ResolverKind};
use elements_common::Environment;
use profile_sync::{build_orchestrator, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvArg {
    Qa,
    Production,
}

impl From<EnvArg> for Environment {
    fn from(arg: EnvArg) -> Self {
        match arg {
            EnvArg::Qa => Environment::Qa,
            EnvArg::Production => Environment::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolverArg {
    Api,
    ReportingDb,
}

impl From<ResolverArg> for ResolverKind {
    fn from(arg: ResolverArg) -> Self {
        match arg {
            ResolverArg::Api => ResolverKind::Api,
            ResolverArg::ReportingDb => ResolverKind::ReportingDb,
        }
    }
}

/// Command-line arguments for profile-sync
#[derive(Parser, Debug)]
#[command(name = "profile-sync")]
#[command(about = "Push researcher profile fields from a CSV export into Elements")]
#[command(version)]
struct Args {
    /// CSV export with user_proprietary_id and the profile columns
    #[arg(short, long)]
    input: PathBuf,

    /// Elements deployment to update
    #[arg(short, long, value_enum)]
    env: EnvArg,

    /// Reach the reporting database through the configured SSH tunnel
    #[arg(long)]
    tunnel: bool,

    /// How proprietary IDs are matched to records (default from config)
    #[arg(long, value_enum)]
    resolver: Option<ResolverArg>,

    /// Credential file
    #[arg(short, long, env = "PROFILE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Build payloads and log them without sending updates
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("profile-sync: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = CredentialsFile::load(&config_path)
        .with_context(|| format!("Failed to load credentials from {}", config_path.display()))?;

    init_tracing(&config.logging.level);

    info!(
        "Starting profile-sync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Credentials: {}", config_path.display());

    let options = RunOptions {
        input: args.input,
        environment: args.env.into(),
        tunnel: args.tunnel,
        resolver: args.resolver.map(Into::into),
        dry_run: args.dry_run,
    };
    info!(environment = %options.environment, tunnel = options.tunnel, "Environment selected");

    let orchestrator = build_orchestrator(&config, &options)?;
    let summary = orchestrator.run().await?;

    let elapsed = summary.finished_at - summary.started_at;
    info!(
        batch_id = %summary.batch_id,
        loaded = summary.rows_loaded,
        resolved = summary.rows_resolved,
        unresolved = summary.rows_unresolved(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        dry_run = summary.dry_run,
        elapsed_secs = elapsed.num_seconds(),
        "Program complete. Exiting."
    );

    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("profile_sync={0},elements_common={0}", level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
