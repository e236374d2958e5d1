//! Reporting database access
//!
//! The Elements reporting database is a read-only SQL Server replica. The
//! batch runs exactly one query against it: a template whose placeholder is
//! replaced by the quoted list of proprietary IDs.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use elements_common::config::DatabaseCredentials;
use std::path::{Path, PathBuf};
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info};

/// Result column holding the proprietary ID
pub const COL_PROPRIETARY_ID: &str = "Proprietary ID";
/// Result column holding the manual record ID
pub const COL_RECORD_ID: &str = "Data Source Proprietary ID";
/// Result column holding the Elements user ID
pub const COL_USER_ID: &str = "User ID";

/// One row of the user records query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecordRow {
    pub proprietary_id: String,
    pub user_record_id: String,
    pub user_id: String,
}

/// Source of user record rows for a rendered query
#[async_trait]
pub trait ReportingDatabase: Send + Sync {
    /// Run `sql` once and return every row with all three columns present
    async fn query_user_records(&self, sql: &str) -> SyncResult<Vec<UserRecordRow>>;
}

/// SQL template with a placeholder for the ID list
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    path: PathBuf,
    text: String,
    placeholder: String,
}

impl QueryTemplate {
    /// Read the template; missing file and missing placeholder are fatal
    pub async fn load(path: &Path, placeholder: &str) -> SyncResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::file_not_found(path, e))?;
        Self::from_text(path, text, placeholder)
    }

    pub fn from_text(path: &Path, text: String, placeholder: &str) -> SyncResult<Self> {
        if !text.contains(placeholder) {
            return Err(SyncError::Parse(format!(
                "SQL template {} does not contain placeholder '{}'",
                path.display(),
                placeholder
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            text,
            placeholder: placeholder.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Substitute the quoted, comma-joined ID list
    pub fn render<'a, I>(&self, proprietary_ids: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let list = proprietary_ids
            .into_iter()
            .map(quote_literal)
            .collect::<Vec<_>>()
            .join(",\n");
        self.text.replace(&self.placeholder, &list)
    }
}

/// Single-quoted T-SQL string literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Reporting database reached with tiberius
pub struct SqlServerReportingDb {
    credentials: DatabaseCredentials,
}

impl SqlServerReportingDb {
    pub fn new(credentials: DatabaseCredentials) -> Self {
        Self { credentials }
    }

    fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.credentials.server);
        config.port(self.credentials.port);
        config.database(&self.credentials.database);
        config.authentication(AuthMethod::sql_server(
            &self.credentials.user,
            &self.credentials.password,
        ));
        if self.credentials.trust_server_certificate {
            config.trust_cert();
        }
        config
    }
}

#[async_trait]
impl ReportingDatabase for SqlServerReportingDb {
    async fn query_user_records(&self, sql: &str) -> SyncResult<Vec<UserRecordRow>> {
        let config = self.tiberius_config();
        let addr = config.get_addr();

        info!(server = %addr, database = %self.credentials.database, "Connecting to reporting database");

        let tcp = TcpStream::connect(addr.as_str())
            .await
            .map_err(|e| SyncError::Connection(format!("Reporting database {} unreachable: {}", addr, e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        let mut client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(map_tiberius_error)?;

        debug!(sql = %sql, "Executing user records query");

        // The stream borrows the client; it must be gone before close()
        let rows = match client.simple_query(sql).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };

        if let Err(e) = client.close().await {
            debug!("Error closing reporting database connection: {}", e);
        }

        let rows = rows.map_err(|e| SyncError::Parse(format!("User records query failed: {}", e)))?;
        let records = user_records_from_cells(rows.iter().map(|row| {
            [
                read_cell(row, COL_PROPRIETARY_ID),
                read_cell(row, COL_RECORD_ID),
                read_cell(row, COL_USER_ID),
            ]
        }))?;

        info!(rows = rows.len(), usable = records.len(), "Reporting database returned user records");
        Ok(records)
    }
}

fn map_tiberius_error(err: tiberius::error::Error) -> SyncError {
    match err {
        tiberius::error::Error::Server(ref token) if token.code() == 18456 => {
            SyncError::Auth(format!("Reporting database login failed: {}", token.message()))
        }
        other => SyncError::Connection(format!("Reporting database connection failed: {}", other)),
    }
}

/// One result cell, reduced to what the user record mapping needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Null,
    /// The result set has no column with this name
    Missing,
    /// Present but not readable as text or a number; holds the SQL type
    Unsupported(String),
}

/// Column names in the order [`user_records_from_cells`] expects them
pub const USER_RECORD_COLUMNS: [&str; 3] = [COL_PROPRIETARY_ID, COL_RECORD_ID, COL_USER_ID];

/// Map result rows (cells ordered as [`USER_RECORD_COLUMNS`]) to user records
///
/// Rows with a NULL in any column are skipped. A missing or unreadable column
/// fails the whole query, since every row would otherwise look unmatched.
pub fn user_records_from_cells<I>(rows: I) -> SyncResult<Vec<UserRecordRow>>
where
    I: IntoIterator<Item = [Cell; 3]>,
{
    let mut records = Vec::new();

    'rows: for cells in rows {
        let mut values: [String; 3] = Default::default();
        for ((cell, column), value) in cells.into_iter().zip(USER_RECORD_COLUMNS).zip(values.iter_mut()) {
            match cell {
                Cell::Text(text) => *value = text,
                Cell::Null => {
                    debug!(column = column, "Skipping user record row with NULL column");
                    continue 'rows;
                }
                Cell::Missing => {
                    return Err(SyncError::Parse(format!(
                        "User records query returned no '{}' column",
                        column
                    )));
                }
                Cell::Unsupported(sql_type) => {
                    return Err(SyncError::Parse(format!(
                        "Column '{}' has unsupported type {}",
                        column, sql_type
                    )));
                }
            }
        }

        let [proprietary_id, user_record_id, user_id] = values;
        records.push(UserRecordRow {
            proprietary_id,
            user_record_id,
            user_id,
        });
    }

    Ok(records)
}

/// Read a column as text whether it is stored as a string, integer, GUID or decimal
fn read_cell(row: &Row, column: &str) -> Cell {
    let Some(meta) = row.columns().iter().find(|c| c.name() == column) else {
        return Cell::Missing;
    };

    fn text<T: ToString>(value: Option<T>) -> Cell {
        value.map_or(Cell::Null, |v| Cell::Text(v.to_string()))
    }

    if let Ok(value) = row.try_get::<&str, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<i32, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<i64, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<i16, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<u8, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<tiberius::Uuid, _>(column) {
        return text(value);
    }
    if let Ok(value) = row.try_get::<tiberius::numeric::Numeric, _>(column) {
        return text(value);
    }

    Cell::Unsupported(format!("{:?}", meta.column_type()))
}
