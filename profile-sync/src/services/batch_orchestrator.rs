//! Batch orchestrator
//!
//! Sequences one run:
//! 1. Load rows from the CSV
//! 2. Open the SSH tunnel (when configured)
//! 3. Resolve record IDs, dropping unmatched rows
//! 4. Build XML payloads
//! 5. PATCH each record (skipped in dry-run mode)
//! 6. Close the tunnel, on success and on every fatal error

use crate::error::SyncResult;
use crate::models::{BatchSummary, PreparedUpdate, RowReport, UpdateRow};
use crate::services::identifier_resolver::{resolve_rows, IdentifierResolver};
use crate::services::payload_builder::PayloadBuilder;
use crate::services::row_source::RowSource;
use crate::services::tunnel::TunnelOpener;
use crate::services::update_dispatcher::UpdateDispatcher;
use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives one profile update batch
pub struct BatchOrchestrator {
    source: RowSource,
    resolver: Box<dyn IdentifierResolver>,
    builder: PayloadBuilder,
    dispatcher: UpdateDispatcher,
    tunnel: Option<Box<dyn TunnelOpener>>,
    dry_run: bool,
}

/// Counts carried between stages
struct StageCounts {
    rows_resolved: usize,
    reports: Vec<RowReport>,
}

impl BatchOrchestrator {
    pub fn new(
        source: RowSource,
        resolver: Box<dyn IdentifierResolver>,
        builder: PayloadBuilder,
        dispatcher: UpdateDispatcher,
    ) -> Self {
        Self {
            source,
            resolver,
            builder,
            dispatcher,
            tunnel: None,
            dry_run: false,
        }
    }

    /// Hold a tunnel open for the resolve and dispatch stages
    pub fn with_tunnel(mut self, opener: Box<dyn TunnelOpener>) -> Self {
        self.tunnel = Some(opener);
        self
    }

    /// Build payloads but send nothing
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the batch to completion or to the first fatal error
    pub async fn run(&self) -> SyncResult<BatchSummary> {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", %batch_id);

        async move {
            let result = self.run_batch(batch_id).await;
            if let Err(e) = &result {
                error!("Batch aborted: {}", e);
            }
            info!("Batch complete");
            result
        }
        .instrument(span)
        .await
    }

    async fn run_batch(&self, batch_id: Uuid) -> SyncResult<BatchSummary> {
        let started_at = Utc::now();
        info!(
            input = %self.source.path().display(),
            strategy = self.resolver.strategy(),
            dry_run = self.dry_run,
            "Starting profile update batch"
        );

        let rows = self.source.load().await?;
        let rows_loaded = rows.len();

        let tunnel = match &self.tunnel {
            Some(opener) => {
                let tunnel = opener.open().await?;
                debug!(local = %tunnel.local_addr(), "Tunnel held for this batch");
                Some(tunnel)
            }
            None => None,
        };

        let result = self.run_stages(rows).await;

        if let Some(tunnel) = tunnel {
            if let Err(e) = tunnel.close().await {
                warn!("Tunnel did not close cleanly: {}", e);
            }
        }

        let counts = result?;
        Ok(BatchSummary {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            rows_loaded,
            rows_resolved: counts.rows_resolved,
            dry_run: self.dry_run,
            reports: counts.reports,
        })
    }

    async fn run_stages(&self, rows: Vec<UpdateRow>) -> SyncResult<StageCounts> {
        let resolved = resolve_rows(self.resolver.as_ref(), rows).await?;
        let rows_resolved = resolved.len();

        let updates = self.builder.prepare_all(resolved)?;

        let reports = if self.dry_run {
            log_dry_run(&updates);
            Vec::new()
        } else {
            self.dispatcher.dispatch_all(&updates).await?
        };

        Ok(StageCounts {
            rows_resolved,
            reports,
        })
    }
}

fn log_dry_run(updates: &[PreparedUpdate]) {
    info!("Dry run: {} update(s) built, none sent", updates.len());
    for update in updates {
        info!(
            proprietary_id = %update.proprietary_id(),
            user_record_id = %update.resolved.user_record_id,
            "Would PATCH: {}",
            update.xml_payload
        );
    }
}
