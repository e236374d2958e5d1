//! profile-sync library interface
//!
//! Pushes researcher profile fields from a CSV export into Elements manual
//! records. Exposes the pipeline pieces for the binary and for integration
//! testing.

pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{SyncError, SyncResult};

use elements_common::config::{CredentialsFile, ResolverKind};
use elements_common::Environment;
use services::{
    ApiResolver, BatchOrchestrator, ElementsClient, IdentifierResolver, PayloadBuilder,
    ReportingDbResolver, RowSource, SqlServerReportingDb, SshTunnelOpener, Throttle,
    UpdateDispatcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What the operator asked for on the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub environment: Environment,
    pub tunnel: bool,
    /// Overrides `sync.resolver` from the credential file
    pub resolver: Option<ResolverKind>,
    pub dry_run: bool,
}

/// Wire up an orchestrator for one environment
///
/// Nothing touches the network here; connections are made when the batch runs.
pub fn build_orchestrator(
    config: &CredentialsFile,
    options: &RunOptions,
) -> SyncResult<BatchOrchestrator> {
    let env = config.environment(options.environment)?;
    let sync = &config.sync;

    let source = RowSource::new(&options.input, &sync.encoding, &sync.target_fields)?;

    let client = Arc::new(ElementsClient::new(
        &env.api,
        sync.lookup_route,
        Duration::from_secs(sync.request_timeout_secs),
    )?);
    let throttle: Arc<dyn Throttle> = Arc::from(services::throttle::from_millis(sync.throttle_ms));

    let resolver: Box<dyn IdentifierResolver> =
        match options.resolver.unwrap_or(sync.resolver) {
            ResolverKind::Api => Box::new(ApiResolver::new(client.clone(), throttle.clone())),
            ResolverKind::ReportingDb => {
                let database = env.database.select(options.tunnel)?.clone();
                Box::new(ReportingDbResolver::new(
                    Box::new(SqlServerReportingDb::new(database)),
                    sync.sql_template.clone(),
                    sync.placeholder.clone(),
                ))
            }
        };

    let builder = PayloadBuilder::new(sync.target_fields.clone());
    let dispatcher = UpdateDispatcher::new(client, throttle);

    let mut orchestrator =
        BatchOrchestrator::new(source, resolver, builder, dispatcher).dry_run(options.dry_run);
    if options.tunnel {
        let ssh = env.ssh()?.clone();
        orchestrator = orchestrator.with_tunnel(Box::new(SshTunnelOpener::new(ssh)));
    }

    Ok(orchestrator)
}
