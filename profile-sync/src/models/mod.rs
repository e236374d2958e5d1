//! Data models for the profile update batch

pub mod batch_summary;
pub mod update_row;

pub use batch_summary::{BatchSummary, RowReport};
pub use update_row::{
    DispatchOutcome, PreparedUpdate, ResolutionResult, ResolvedRow, UpdateRow,
    NO_MANUAL_RECORD, PROPRIETARY_ID_COLUMN,
};
