//! Builds `update-record` documents for manual record PATCHes
//!
//! Shape:
//!
//! ```xml
//! <update-record xmlns="http://www.symplectic.co.uk/publications/api">
//!   <fields>
//!     <field name="overview" operation="set"><text>...</text></field>
//!   </fields>
//! </update-record>
//! ```
//!
//! Output has no XML declaration and no whitespace between elements, so the
//! same row always serializes to the same bytes.

use crate::error::{SyncError, SyncResult};
use crate::models::{PreparedUpdate, ResolvedRow, UpdateRow};
use crate::services::elements_client::API_NS;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use tracing::{debug, info};

/// Converts resolved rows into XML payloads
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    target_fields: Vec<String>,
}

impl PayloadBuilder {
    /// `target_fields` fixes both which columns are sent and their order
    pub fn new(target_fields: Vec<String>) -> Self {
        Self { target_fields }
    }

    pub fn target_fields(&self) -> &[String] {
        &self.target_fields
    }

    /// Serialize one row's non-empty target fields
    pub fn build(&self, row: &UpdateRow) -> SyncResult<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        write(&mut writer, Event::Start(BytesStart::new("update-record").with_attributes([("xmlns", API_NS)])))?;
        write(&mut writer, Event::Start(BytesStart::new("fields")))?;

        for name in &self.target_fields {
            let value = row.field(name);
            if value.is_empty() {
                continue;
            }
            write(
                &mut writer,
                Event::Start(
                    BytesStart::new("field")
                        .with_attributes([("name", name.as_str()), ("operation", "set")]),
                ),
            )?;
            write(&mut writer, Event::Start(BytesStart::new("text")))?;
            write(&mut writer, Event::Text(BytesText::new(value)))?;
            write(&mut writer, Event::End(BytesEnd::new("text")))?;
            write(&mut writer, Event::End(BytesEnd::new("field")))?;
        }

        write(&mut writer, Event::End(BytesEnd::new("fields")))?;
        write(&mut writer, Event::End(BytesEnd::new("update-record")))?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| SyncError::Parse(format!("Payload is not UTF-8: {}", e)))
    }

    /// Attach payloads to every resolved row
    pub fn prepare_all(&self, rows: Vec<ResolvedRow>) -> SyncResult<Vec<PreparedUpdate>> {
        info!("Creating XML bodies for {} record update(s)", rows.len());

        rows.into_iter()
            .map(|resolved| {
                let xml_payload = self.build(&resolved.row)?;
                debug!(
                    proprietary_id = %resolved.row.proprietary_id(),
                    payload = %xml_payload,
                    "Built update payload"
                );
                Ok(PreparedUpdate {
                    resolved,
                    xml_payload,
                })
            })
            .collect()
    }
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> SyncResult<()> {
    writer
        .write_event(event)
        .map_err(|e| SyncError::Parse(format!("Failed to write payload XML: {}", e)))
}
