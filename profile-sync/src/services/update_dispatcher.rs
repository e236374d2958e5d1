//! Update dispatcher: one throttled PATCH per prepared row
//!
//! A non-200 response is logged and recorded, then the next row is sent.
//! Nothing is retried.

use crate::error::SyncResult;
use crate::models::{DispatchOutcome, PreparedUpdate, RowReport};
use crate::services::elements_client::ElementsClient;
use crate::services::throttle::Throttle;
use std::sync::Arc;
use tracing::{info, warn};

/// Sends prepared updates to the Elements API
pub struct UpdateDispatcher {
    client: Arc<ElementsClient>,
    throttle: Arc<dyn Throttle>,
}

impl UpdateDispatcher {
    pub fn new(client: Arc<ElementsClient>, throttle: Arc<dyn Throttle>) -> Self {
        Self { client, throttle }
    }

    /// PATCH every update in order and collect the outcomes
    pub async fn dispatch_all(&self, updates: &[PreparedUpdate]) -> SyncResult<Vec<RowReport>> {
        info!("Sending {} update request(s) to API", updates.len());

        let mut reports = Vec::with_capacity(updates.len());
        for update in updates {
            self.throttle.wait().await;

            let outcome = self
                .client
                .patch_manual_record(&update.resolved.user_record_id, &update.xml_payload)
                .await?;

            log_outcome(update, &outcome);
            reports.push(RowReport {
                proprietary_id: update.proprietary_id().to_string(),
                user_record_id: update.resolved.user_record_id.clone(),
                outcome,
            });
        }

        Ok(reports)
    }
}

fn log_outcome(update: &PreparedUpdate, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Success => info!(
            user_id = %update.resolved.user_id,
            proprietary_id = %update.proprietary_id(),
            user_record_id = %update.resolved.user_record_id,
            "Successful update"
        ),
        DispatchOutcome::Failure {
            status_code,
            content_type,
            body,
        } => warn!(
            proprietary_id = %update.proprietary_id(),
            user_record_id = %update.resolved.user_record_id,
            status_code = *status_code,
            content_type = %content_type,
            "Non-200 status code received: {}",
            body
        ),
    }
}
