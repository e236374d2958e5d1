//! Per-row records flowing through the batch
//!
//! Each stage consumes one representation and produces the next:
//! `UpdateRow` → `ResolvedRow` → `PreparedUpdate`.

use std::collections::BTreeMap;

/// Column holding the external identifier
pub const PROPRIETARY_ID_COLUMN: &str = "user_proprietary_id";

/// Reason attached to rows that could not be matched
pub const NO_MANUAL_RECORD: &str = "no manual record found";

/// One input row: the proprietary ID plus every other column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRow {
    proprietary_id: String,
    fields: BTreeMap<String, String>,
}

impl UpdateRow {
    pub fn new(proprietary_id: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            proprietary_id: proprietary_id.into(),
            fields,
        }
    }

    /// Convenience constructor from `(column, value)` pairs
    pub fn from_pairs<I, K, V>(proprietary_id: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(proprietary_id, fields)
    }

    pub fn proprietary_id(&self) -> &str {
        &self.proprietary_id
    }

    /// Value of a column; missing columns read as empty ("no change")
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Outcome of matching one row against a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Resolved {
        user_id: String,
        user_record_id: String,
    },
    Unresolved {
        reason: String,
    },
}

impl ResolutionResult {
    pub fn resolved(user_id: impl Into<String>, user_record_id: impl Into<String>) -> Self {
        ResolutionResult::Resolved {
            user_id: user_id.into(),
            user_record_id: user_record_id.into(),
        }
    }

    pub fn no_manual_record() -> Self {
        ResolutionResult::Unresolved {
            reason: NO_MANUAL_RECORD.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionResult::Resolved { .. })
    }
}

/// A row matched to its Elements user and manual record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub row: UpdateRow,
    pub user_id: String,
    pub user_record_id: String,
}

/// A resolved row with its serialized XML update document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpdate {
    pub resolved: ResolvedRow,
    pub xml_payload: String,
}

impl PreparedUpdate {
    pub fn proprietary_id(&self) -> &str {
        self.resolved.row.proprietary_id()
    }
}

/// Result of one PATCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure {
        status_code: u16,
        content_type: String,
        body: String,
    },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}
