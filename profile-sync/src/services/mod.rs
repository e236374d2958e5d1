//! Batch services

pub mod batch_orchestrator;
pub mod elements_client;
pub mod identifier_resolver;
pub mod payload_builder;
pub mod reporting_db;
pub mod row_source;
pub mod throttle;
pub mod tunnel;
pub mod update_dispatcher;

pub use batch_orchestrator::BatchOrchestrator;
pub use elements_client::{ElementsClient, ManualRecordRef};
pub use identifier_resolver::{
    keep_resolved, resolve_rows, ApiResolver, IdentifierResolver, ReportingDbResolver,
};
pub use payload_builder::PayloadBuilder;
pub use reporting_db::{QueryTemplate, ReportingDatabase, SqlServerReportingDb, UserRecordRow};
pub use row_source::RowSource;
pub use throttle::{IntervalThrottle, NoThrottle, Throttle};
pub use tunnel::{SshTunnelOpener, Tunnel, TunnelOpener};
pub use update_dispatcher::UpdateDispatcher;
