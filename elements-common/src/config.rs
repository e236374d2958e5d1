//! Credential file loading and config path resolution
//!
//! Credentials are never compiled in. They live in a TOML file with one
//! section per environment:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [sync]
//! throttle_ms = 500
//! sql_template = "user_records_query.sql"
//!
//! [qa.api]
//! endpoint = "https://elements-qa.example.edu:8091/secure-api/v5.5/"
//! username = "api-user"
//! password = "secret"
//!
//! [qa.ssh]
//! host = "bastion.example.edu"
//! username = "tunnel"
//! remote_host = "reporting-db.internal"
//! remote_port = 1433
//! local_bind = "127.0.0.1:14330"
//!
//! [qa.database.tunneled]
//! server = "127.0.0.1"
//! port = 14330
//! database = "elements-reporting"
//! user = "reader"
//! password = "secret"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable naming the credential file
pub const CONFIG_ENV_VAR: &str = "PROFILE_SYNC_CONFIG";

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "profile-sync";

/// File name under [`CONFIG_DIR_NAME`]
const CONFIG_FILE_NAME: &str = "credentials.toml";

/// Target deployment of the Elements system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Qa,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Qa => "qa",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qa" => Ok(Environment::Qa),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!(
                "Unknown environment '{}' (expected 'qa' or 'production')",
                other
            ))),
        }
    }
}

/// Which backend maps proprietary IDs to record IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    /// One authenticated API lookup per row
    Api,
    /// One bulk query against the reporting database
    ReportingDb,
}

/// Which API route is used for per-row lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupRoute {
    /// `users/pid-<id>`
    Pid,
    /// `users?proprietary-id=<id>&detail=full`
    Query,
}

/// Top-level credential file
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub qa: Option<EnvironmentConfig>,

    #[serde(default)]
    pub production: Option<EnvironmentConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Batch behaviour shared by every environment
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Minimum spacing between API calls, in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// SQL template used by the reporting-database resolver
    #[serde(default = "default_sql_template")]
    pub sql_template: PathBuf,

    /// Token in the SQL template replaced by the quoted ID list
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Encoding label of the input CSV
    #[serde(default = "default_encoding")]
    pub encoding: String,

    #[serde(default = "default_resolver")]
    pub resolver: ResolverKind,

    #[serde(default = "default_lookup_route")]
    pub lookup_route: LookupRoute,

    /// Profile fields copied from the CSV, in payload order
    #[serde(default = "default_target_fields")]
    pub target_fields: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            sql_template: default_sql_template(),
            placeholder: default_placeholder(),
            encoding: default_encoding(),
            resolver: default_resolver(),
            lookup_route: default_lookup_route(),
            target_fields: default_target_fields(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_sql_template() -> PathBuf {
    PathBuf::from("user_records_query.sql")
}

fn default_placeholder() -> String {
    "-- REPLACE".to_string()
}

fn default_encoding() -> String {
    "windows-1252".to_string()
}

fn default_resolver() -> ResolverKind {
    ResolverKind::ReportingDb
}

fn default_lookup_route() -> LookupRoute {
    LookupRoute::Pid
}

fn default_target_fields() -> Vec<String> {
    vec![
        "overview".to_string(),
        "research-interests".to_string(),
        "teaching-summary".to_string(),
    ]
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_ssh_port() -> u16 {
    22
}

fn default_sql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

/// Everything needed to talk to one deployment
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub api: ApiCredentials,

    #[serde(default)]
    pub ssh: Option<SshCredentials>,

    #[serde(default)]
    pub database: DatabaseProfiles,
}

impl EnvironmentConfig {
    /// SSH settings, required once a tunnel is requested
    pub fn ssh(&self) -> Result<&SshCredentials> {
        self.ssh
            .as_ref()
            .ok_or_else(|| Error::Config("Tunnel requested but no [ssh] section configured".to_string()))
    }
}

/// Elements API endpoint and basic-auth credentials
#[derive(Clone, Deserialize)]
pub struct ApiCredentials {
    /// Base URL, e.g. `https://host:8091/secure-api/v5.5/`
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl ApiCredentials {
    /// Endpoint without trailing slashes, ready for `format!("{}/users", ..)`
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SSH bastion used to forward a local port to the reporting database
#[derive(Clone, Deserialize)]
pub struct SshCredentials {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub username: String,

    /// Omit to rely on keys or an agent
    #[serde(default)]
    pub password: Option<String>,

    /// Host the bastion forwards to
    pub remote_host: String,

    pub remote_port: u16,

    /// Local listening address of the forward
    pub local_bind: SocketAddr,
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("local_bind", &self.local_bind)
            .finish()
    }
}

/// Database settings for both ways of reaching the reporting server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseProfiles {
    /// Used when the server is reachable without a tunnel
    #[serde(default)]
    pub direct: Option<DatabaseCredentials>,

    /// Used through the local end of the SSH tunnel
    #[serde(default)]
    pub tunneled: Option<DatabaseCredentials>,
}

impl DatabaseProfiles {
    /// Pick the profile matching the tunnel mode
    pub fn select(&self, tunnel: bool) -> Result<&DatabaseCredentials> {
        let (profile, name) = if tunnel {
            (self.tunneled.as_ref(), "tunneled")
        } else {
            (self.direct.as_ref(), "direct")
        };
        profile.ok_or_else(|| {
            Error::Config(format!("No [database.{}] section configured", name))
        })
    }
}

/// Reporting database (SQL Server) login
#[derive(Clone, Deserialize)]
pub struct DatabaseCredentials {
    pub server: String,

    #[serde(default = "default_sql_port")]
    pub port: u16,

    pub database: String,
    pub user: String,
    pub password: String,

    #[serde(default = "default_true")]
    pub trust_server_certificate: bool,
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

impl CredentialsFile {
    /// Read and validate a credential file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Credential file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded credential file");
        Self::from_toml_str(&content)
    }

    /// Parse and validate credential TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CredentialsFile = toml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Settings for one environment
    pub fn environment(&self, env: Environment) -> Result<&EnvironmentConfig> {
        let section = match env {
            Environment::Qa => self.qa.as_ref(),
            Environment::Production => self.production.as_ref(),
        };
        section.ok_or_else(|| {
            Error::Config(format!("No [{}] section in credential file", env))
        })
    }

    fn validate(&self) -> Result<()> {
        if self.sync.target_fields.is_empty() {
            return Err(Error::Config("sync.target_fields must not be empty".to_string()));
        }
        if self.sync.placeholder.is_empty() {
            return Err(Error::Config("sync.placeholder must not be empty".to_string()));
        }
        for (name, env) in [("qa", &self.qa), ("production", &self.production)] {
            if let Some(env) = env {
                if env.api.endpoint.trim().is_empty() {
                    return Err(Error::Config(format!("[{}.api] endpoint is empty", name)));
                }
                if env.api.username.trim().is_empty() {
                    return Err(Error::Config(format!("[{}.api] username is empty", name)));
                }
            }
        }
        Ok(())
    }
}

/// Locate the credential file
///
/// Priority order:
/// 1. Command-line argument
/// 2. `PROFILE_SYNC_CONFIG` environment variable
/// 3. `<config dir>/profile-sync/credentials.toml`
///
/// There is no compiled fallback: credentials must come from the operator.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let default_path = default_config_path()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    if default_path.exists() {
        return Ok(default_path);
    }

    Err(Error::NotFound(format!(
        "No credential file. Pass --config, set {}, or create {}",
        CONFIG_ENV_VAR,
        default_path.display()
    )))
}

/// Platform location of the credential file (may not exist)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[qa.api]
endpoint = "https://qa.example.edu/secure-api/v5.5/"
username = "svc"
password = "pw"
"#;

    #[test]
    fn test_defaults_applied() {
        let file = CredentialsFile::from_toml_str(MINIMAL).unwrap();
        assert_eq!(file.logging.level, "info");
        assert_eq!(file.sync.throttle_ms, 500);
        assert_eq!(file.sync.placeholder, "-- REPLACE");
        assert_eq!(file.sync.encoding, "windows-1252");
        assert_eq!(file.sync.resolver, ResolverKind::ReportingDb);
        assert_eq!(file.sync.lookup_route, LookupRoute::Pid);
        assert_eq!(
            file.sync.target_fields,
            vec!["overview", "research-interests", "teaching-summary"]
        );
    }

    #[test]
    fn test_missing_environment_section() {
        let file = CredentialsFile::from_toml_str(MINIMAL).unwrap();
        assert!(file.environment(Environment::Qa).is_ok());
        let err = file.environment(Environment::Production).unwrap_err();
        assert!(err.to_string().contains("production"));
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let file = CredentialsFile::from_toml_str(MINIMAL).unwrap();
        let api = &file.environment(Environment::Qa).unwrap().api;
        assert_eq!(api.base_url(), "https://qa.example.edu/secure-api/v5.5");
    }

    #[test]
    fn test_debug_redacts_password() {
        let file = CredentialsFile::from_toml_str(MINIMAL).unwrap();
        let rendered = format!("{:?}", file.environment(Environment::Qa).unwrap().api);
        assert!(!rendered.contains("pw\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let toml = r#"
[production.api]
endpoint = " "
username = "svc"
password = "pw"
"#;
        let err = CredentialsFile::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("QA".parse::<Environment>().unwrap(), Environment::Qa);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_database_profile_selection() {
        let toml = r#"
[qa.api]
endpoint = "https://qa.example.edu/api/"
username = "svc"
password = "pw"

[qa.database.tunneled]
server = "127.0.0.1"
port = 14330
database = "reporting"
user = "reader"
password = "pw"
"#;
        let file = CredentialsFile::from_toml_str(toml).unwrap();
        let env = file.environment(Environment::Qa).unwrap();
        let tunneled = env.database.select(true).unwrap();
        assert_eq!(tunneled.port, 14330);
        assert!(tunneled.trust_server_certificate);
        assert!(env.database.select(false).is_err());
        assert!(env.ssh().is_err());
    }
}
