//! Tests for credential file resolution and loading
//!
//! Tests that manipulate PROFILE_SYNC_CONFIG are marked with #[serial]
//! so they never race each other.

use elements_common::config::{
    resolve_config_path, CredentialsFile, LookupRoute, ResolverKind, CONFIG_ENV_VAR,
};
use elements_common::{Environment, Error};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"

[sync]
throttle_ms = 250
sql_template = "/opt/profile-sync/user_records_query.sql"
resolver = "api"
lookup_route = "query"
target_fields = ["overview", "teaching-summary"]

[qa.api]
endpoint = "https://qa.example.edu:8091/secure-api/v5.5/"
username = "svc-qa"
password = "qa-secret"

[qa.ssh]
host = "bastion.example.edu"
username = "tunnel"
password = "ssh-secret"
remote_host = "reporting.internal"
remote_port = 1433
local_bind = "127.0.0.1:14330"

[qa.database.tunneled]
server = "127.0.0.1"
port = 14330
database = "elements-reporting"
user = "reader"
password = "db-secret"

[qa.database.direct]
server = "reporting.internal"
database = "elements-reporting"
user = "reader"
password = "db-secret"
trust_server_certificate = false

[production.api]
endpoint = "https://elements.example.edu:8091/secure-api/v5.5/"
username = "svc-prod"
password = "prod-secret"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(FULL_CONFIG);
    let config = CredentialsFile::load(file.path()).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.sync.throttle_ms, 250);
    assert_eq!(config.sync.resolver, ResolverKind::Api);
    assert_eq!(config.sync.lookup_route, LookupRoute::Query);
    assert_eq!(config.sync.target_fields, vec!["overview", "teaching-summary"]);
    // Unspecified keys keep their defaults
    assert_eq!(config.sync.encoding, "windows-1252");

    let qa = config.environment(Environment::Qa).unwrap();
    let ssh = qa.ssh().unwrap();
    assert_eq!(ssh.port, 22);
    assert_eq!(ssh.local_bind.port(), 14330);
    assert_eq!(qa.database.select(false).unwrap().port, 1433);
    assert!(!qa.database.select(false).unwrap().trust_server_certificate);

    let prod = config.environment(Environment::Production).unwrap();
    assert_eq!(prod.api.username, "svc-prod");
    assert!(prod.ssh.is_none());
}

#[test]
fn test_load_missing_file_is_not_found() {
    let err = CredentialsFile::load(Path::new("/nonexistent/profile-sync.toml")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_load_malformed_toml() {
    let file = write_config("[qa.api\nendpoint = ");
    let err = CredentialsFile::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
}

#[test]
fn test_unknown_resolver_rejected() {
    let file = write_config("[sync]\nresolver = \"carrier-pigeon\"\n");
    assert!(CredentialsFile::load(file.path()).is_err());
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml"))).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/from-cli.toml"));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let path = resolve_config_path(None).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/from-env.toml"));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");
    // Falls through to the platform default, which either exists or yields NotFound
    match resolve_config_path(None) {
        Ok(path) => assert!(path.ends_with("profile-sync/credentials.toml")),
        Err(err) => assert!(matches!(err, Error::NotFound(_) | Error::Config(_))),
    }
    env::remove_var(CONFIG_ENV_VAR);
}
