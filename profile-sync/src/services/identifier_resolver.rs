//! Identifier resolution: proprietary ID → (user ID, manual record ID)
//!
//! Two strategies sit behind [`IdentifierResolver`]:
//! - [`ApiResolver`]: one throttled API lookup per row
//! - [`ReportingDbResolver`]: one bulk query for the whole batch
//!
//! Both return one [`ResolutionResult`] per input row, in input order.
//! [`resolve_rows`] then drops everything unresolved, logging each drop.

use crate::error::{SyncError, SyncResult};
use crate::models::{ResolutionResult, ResolvedRow, UpdateRow};
use crate::services::elements_client::ElementsClient;
use crate::services::reporting_db::{QueryTemplate, ReportingDatabase};
use crate::services::throttle::Throttle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps rows to Elements record identifiers
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Short name used in logs
    fn strategy(&self) -> &'static str;

    /// One result per row, same order as `rows`
    async fn lookup(&self, rows: &[UpdateRow]) -> SyncResult<Vec<ResolutionResult>>;
}

/// Resolve a batch and keep only the rows that matched
pub async fn resolve_rows(
    resolver: &dyn IdentifierResolver,
    rows: Vec<UpdateRow>,
) -> SyncResult<Vec<ResolvedRow>> {
    info!(
        strategy = resolver.strategy(),
        "Retrieving user record IDs for {} row(s)",
        rows.len()
    );

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let results = resolver.lookup(&rows).await?;
    if results.len() != rows.len() {
        return Err(SyncError::Parse(format!(
            "{} resolver returned {} result(s) for {} row(s)",
            resolver.strategy(),
            results.len(),
            rows.len()
        )));
    }

    Ok(keep_resolved(rows, results))
}

/// Pair rows with their results, dropping unresolved rows with a warning
pub fn keep_resolved(rows: Vec<UpdateRow>, results: Vec<ResolutionResult>) -> Vec<ResolvedRow> {
    rows.into_iter()
        .zip(results)
        .filter_map(|(row, result)| match result {
            ResolutionResult::Resolved {
                user_id,
                user_record_id,
            } => Some(ResolvedRow {
                row,
                user_id,
                user_record_id,
            }),
            ResolutionResult::Unresolved { reason } => {
                warn!(
                    proprietary_id = %row.proprietary_id(),
                    reason = %reason,
                    "Skipping user: {}. This usually means a new user whose manual record has not been created yet",
                    reason
                );
                None
            }
        })
        .collect()
}

/// Per-row lookup against the Elements API
pub struct ApiResolver {
    client: Arc<ElementsClient>,
    throttle: Arc<dyn Throttle>,
}

impl ApiResolver {
    pub fn new(client: Arc<ElementsClient>, throttle: Arc<dyn Throttle>) -> Self {
        Self { client, throttle }
    }
}

#[async_trait]
impl IdentifierResolver for ApiResolver {
    fn strategy(&self) -> &'static str {
        "api"
    }

    async fn lookup(&self, rows: &[UpdateRow]) -> SyncResult<Vec<ResolutionResult>> {
        let mut results = Vec::with_capacity(rows.len());

        for row in rows {
            self.throttle.wait().await;

            let result = match self.client.lookup_manual_record(row.proprietary_id()).await? {
                Some(record) => {
                    debug!(
                        proprietary_id = %row.proprietary_id(),
                        user_id = %record.user_id,
                        user_record_id = %record.user_record_id,
                        "Resolved via API"
                    );
                    ResolutionResult::resolved(record.user_id, record.user_record_id)
                }
                None => ResolutionResult::no_manual_record(),
            };
            results.push(result);
        }

        Ok(results)
    }
}

/// Bulk lookup against the reporting database
pub struct ReportingDbResolver {
    database: Box<dyn ReportingDatabase>,
    template_path: PathBuf,
    placeholder: String,
}

impl ReportingDbResolver {
    pub fn new(
        database: Box<dyn ReportingDatabase>,
        template_path: impl Into<PathBuf>,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            database,
            template_path: template_path.into(),
            placeholder: placeholder.into(),
        }
    }
}

#[async_trait]
impl IdentifierResolver for ReportingDbResolver {
    fn strategy(&self) -> &'static str {
        "reporting-db"
    }

    async fn lookup(&self, rows: &[UpdateRow]) -> SyncResult<Vec<ResolutionResult>> {
        // Template first: a bad template must fail before any connection is made
        let template = QueryTemplate::load(&self.template_path, &self.placeholder).await?;
        let sql = template.render(rows.iter().map(UpdateRow::proprietary_id));

        let records = self.database.query_user_records(&sql).await?;

        // Later rows win when one proprietary ID has several records
        let by_proprietary_id: HashMap<String, (String, String)> = records
            .into_iter()
            .map(|r| (r.proprietary_id, (r.user_id, r.user_record_id)))
            .collect();

        Ok(rows
            .iter()
            .map(|row| match by_proprietary_id.get(row.proprietary_id()) {
                Some((user_id, user_record_id)) => {
                    ResolutionResult::resolved(user_id.clone(), user_record_id.clone())
                }
                None => ResolutionResult::no_manual_record(),
            })
            .collect())
    }
}
