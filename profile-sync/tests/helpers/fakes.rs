//! Test doubles for the database, tunnel and throttle seams

use async_trait::async_trait;
use profile_sync::services::{ReportingDatabase, Throttle, Tunnel, TunnelOpener, UserRecordRow};
use profile_sync::SyncResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts waits instead of sleeping
#[derive(Clone, Default)]
pub struct CountingThrottle {
    waits: Arc<AtomicUsize>,
}

impl CountingThrottle {
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Throttle for CountingThrottle {
    async fn wait(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory reporting database recording every query it receives
#[derive(Clone, Default)]
pub struct FakeReportingDb {
    records: Vec<UserRecordRow>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FakeReportingDb {
    pub fn with_records(records: &[(&str, &str, &str)]) -> Self {
        Self {
            records: records
                .iter()
                .map(|(pid, user_id, record_id)| UserRecordRow {
                    proprietary_id: pid.to_string(),
                    user_id: user_id.to_string(),
                    user_record_id: record_id.to_string(),
                })
                .collect(),
            queries: Arc::default(),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportingDatabase for FakeReportingDb {
    async fn query_user_records(&self, sql: &str) -> SyncResult<Vec<UserRecordRow>> {
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(self.records.clone())
    }
}

/// Tunnel that only counts opens and closes
#[derive(Clone, Default)]
pub struct FakeTunnelOpener {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeTunnelOpener {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeTunnel {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl TunnelOpener for FakeTunnelOpener {
    async fn open(&self) -> SyncResult<Box<dyn Tunnel>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTunnel {
            closed: self.closed.clone(),
        }))
    }
}

#[async_trait]
impl Tunnel for FakeTunnel {
    fn local_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 14330))
    }

    async fn close(self: Box<Self>) -> SyncResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
