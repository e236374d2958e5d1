//! Shared fixtures for profile-sync integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

use elements_common::config::{ApiCredentials, LookupRoute};
use profile_sync::services::ElementsClient;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const CSV_HEADER: &str = "user_proprietary_id,overview,research-interests,teaching-summary\n";

/// `svc:pw` in an HTTP basic auth header
pub const BASIC_AUTH: &str = "Basic c3ZjOnB3";

pub fn target_fields() -> Vec<String> {
    ["overview", "research-interests", "teaching-summary"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn api_credentials(endpoint: &str) -> ApiCredentials {
    ApiCredentials {
        endpoint: format!("{}/", endpoint),
        username: "svc".to_string(),
        password: "pw".to_string(),
    }
}

pub fn client(endpoint: &str, route: LookupRoute) -> Arc<ElementsClient> {
    Arc::new(ElementsClient::new(&api_credentials(endpoint), route, Duration::from_secs(5)).unwrap())
}

/// Write `rows` (without header) as a windows-1252 CSV in a fresh temp dir
pub fn write_csv(rows: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("updates.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CSV_HEADER.as_bytes()).unwrap();
    file.write_all(rows.as_bytes()).unwrap();
    (dir, path)
}

/// Write a SQL template next to the CSV
pub fn write_template(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("user_records_query.sql");
    std::fs::write(&path, text).unwrap();
    path
}

/// Elements user feed with one manual record
pub fn user_feed(user_id: &str, proprietary_id: &str, record_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:api="http://www.symplectic.co.uk/publications/api">
  <entry>
    <api:object category="user" id="{user_id}" proprietary-id="{proprietary_id}">
      <api:records>
        <api:record format="native" source-name="manual" id-at-source="{record_id}"/>
      </api:records>
    </api:object>
  </entry>
</feed>"#
    )
}
