//! Row source: loads the update batch from the exported CSV
//!
//! The export is produced in a legacy single-byte encoding (windows-1252 by
//! default), so the file is decoded with `encoding_rs` before `csv` sees it.

use crate::error::{SyncError, SyncResult};
use crate::models::{UpdateRow, PROPRIETARY_ID_COLUMN};
use encoding_rs::Encoding;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reads [`UpdateRow`]s from a delimited file
#[derive(Debug, Clone)]
pub struct RowSource {
    path: PathBuf,
    encoding: &'static Encoding,
    required_columns: Vec<String>,
}

impl RowSource {
    /// `encoding_label` is any WHATWG label (`windows-1252`, `latin1`, `utf-8`, ...)
    pub fn new(
        path: impl Into<PathBuf>,
        encoding_label: &str,
        target_fields: &[String],
    ) -> SyncResult<Self> {
        let encoding = Encoding::for_label(encoding_label.trim().as_bytes()).ok_or_else(|| {
            SyncError::Parse(format!("Unknown input encoding '{}'", encoding_label))
        })?;

        let mut required_columns = vec![PROPRIETARY_ID_COLUMN.to_string()];
        required_columns.extend(target_fields.iter().cloned());

        Ok(Self {
            path: path.into(),
            encoding,
            required_columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole file
    pub async fn load(&self) -> SyncResult<Vec<UpdateRow>> {
        info!("Converting CSV to update rows: {}", self.path.display());

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SyncError::file_not_found(&self.path, e))?;

        let rows = parse_rows(&bytes, self.encoding, &self.required_columns)?;
        info!(rows = rows.len(), encoding = self.encoding.name(), "Loaded update rows");
        Ok(rows)
    }
}

/// Decode `bytes` and turn each CSV record into an [`UpdateRow`]
///
/// The header row names the fields. Every column in `required_columns` must
/// be present in the header; other columns are carried along untouched.
pub fn parse_rows(
    bytes: &[u8],
    encoding: &'static Encoding,
    required_columns: &[String],
) -> SyncResult<Vec<UpdateRow>> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(
            encoding = encoding.name(),
            "Input contained bytes invalid for its encoding; replaced with U+FFFD"
        );
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = required_columns
        .iter()
        .map(String::as_str)
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::Parse(format!(
            "CSV header is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let fields: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        let proprietary_id = fields
            .get(PROPRIETARY_ID_COLUMN)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        if proprietary_id.is_empty() {
            warn!(line, "Skipping CSV row without a {}", PROPRIETARY_ID_COLUMN);
            continue;
        }

        rows.push(UpdateRow::new(proprietary_id, fields));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn required() -> Vec<String> {
        ["user_proprietary_id", "overview", "research-interests", "teaching-summary"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_rows_keeps_order_and_values() {
        let csv = b"user_proprietary_id,overview,research-interests,teaching-summary\n\
jdoe@example.edu,New bio,,Taught X\n\
asmith@example.edu,,Proteins,\n";
        let rows = parse_rows(csv, WINDOWS_1252, &required()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].proprietary_id(), "jdoe@example.edu");
        assert_eq!(rows[0].field("overview"), "New bio");
        assert_eq!(rows[0].field("research-interests"), "");
        assert_eq!(rows[1].proprietary_id(), "asmith@example.edu");
        assert_eq!(rows[1].field("research-interests"), "Proteins");
    }

    #[test]
    fn test_windows_1252_bytes_decoded() {
        // 0xE9 is 'é' and 0x92 is a right single quote in windows-1252
        let mut csv = b"user_proprietary_id,overview,research-interests,teaching-summary\n".to_vec();
        csv.extend_from_slice(b"jdoe@example.edu,Caf\xe9 owner\x92s bio,,\n");
        let rows = parse_rows(&csv, WINDOWS_1252, &required()).unwrap();
        assert_eq!(rows[0].field("overview"), "Café owner\u{2019}s bio");
    }

    #[test]
    fn test_missing_required_column() {
        let csv = b"user_proprietary_id,overview\njdoe@example.edu,bio\n";
        let err = parse_rows(csv, WINDOWS_1252, &required()).unwrap_err();
        match err {
            SyncError::Parse(msg) => {
                assert!(msg.contains("research-interests"));
                assert!(msg.contains("teaching-summary"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_rows_without_proprietary_id_skipped() {
        let csv = b"user_proprietary_id,overview,research-interests,teaching-summary\n\
  ,bio,,\n\
jdoe@example.edu,bio,,\n";
        let rows = parse_rows(csv, WINDOWS_1252, &required()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_quoted_multiline_value() {
        let csv = b"user_proprietary_id,overview,research-interests,teaching-summary\n\
jdoe@example.edu,\"Line one\nLine two, with comma\",,\n";
        let rows = parse_rows(csv, WINDOWS_1252, &required()).unwrap();
        assert_eq!(rows[0].field("overview"), "Line one\nLine two, with comma");
    }

    #[test]
    fn test_unknown_encoding_label() {
        let err = RowSource::new("in.csv", "klingon-8", &[]).unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_file_not_found() {
        let source = RowSource::new("/nonexistent/updates.csv", "windows-1252", &[]).unwrap();
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, SyncError::FileNotFound { .. }));
    }
}
