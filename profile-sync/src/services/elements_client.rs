//! Elements API client
//!
//! Thin reqwest wrapper over the two calls the batch needs: looking a user up
//! by proprietary ID, and PATCHing that user's manual record. Responses are
//! Atom feeds with vendor elements in the API namespace.

use crate::error::{SyncError, SyncResult};
use crate::models::DispatchOutcome;
use elements_common::config::{ApiCredentials, LookupRoute};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Atom feed namespace
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Elements API namespace
pub const API_NS: &str = "http://www.symplectic.co.uk/publications/api";

const USER_AGENT: &str = concat!("profile-sync/", env!("CARGO_PKG_VERSION"));

/// IDs of a user and their manual record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualRecordRef {
    pub user_id: String,
    pub user_record_id: String,
}

/// Elements API client
pub struct ElementsClient {
    http_client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    lookup_route: LookupRoute,
}

impl ElementsClient {
    pub fn new(
        api: &ApiCredentials,
        lookup_route: LookupRoute,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: api.base_url().to_string(),
            username: api.username.clone(),
            password: api.password.clone(),
            lookup_route,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// User lookup URL for the configured route
    ///
    /// The proprietary ID is percent-encoded as a single path segment or as
    /// a query value, so reserved characters never change the resource.
    pub fn lookup_url(&self, proprietary_id: &str) -> SyncResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::Parse(format!("Invalid API endpoint '{}': {}", self.base_url, e)))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SyncError::Parse(format!("API endpoint '{}' cannot take a path", self.base_url))
            })?;
            segments.pop_if_empty().push("users");
            if self.lookup_route == LookupRoute::Pid {
                segments.push(&format!("pid-{}", proprietary_id));
            }
        }

        if self.lookup_route == LookupRoute::Query {
            url.query_pairs_mut()
                .append_pair("proprietary-id", proprietary_id)
                .append_pair("detail", "full");
        }

        Ok(url)
    }

    /// URL of the manual record update for `user_record_id`
    pub fn manual_record_url(&self, user_record_id: &str) -> String {
        format!("{}/user/records/manual/{}", self.base_url, user_record_id)
    }

    /// Look up a user by proprietary ID
    ///
    /// Returns `Ok(None)` when the API answers with a non-success status or
    /// the user has no native/manual record. Rejected credentials and
    /// transport failures are errors.
    pub async fn lookup_manual_record(
        &self,
        proprietary_id: &str,
    ) -> SyncResult<Option<ManualRecordRef>> {
        let url = self.lookup_url(proprietary_id)?;

        debug!(proprietary_id = %proprietary_id, "Querying Elements API for user");

        let response = self
            .http_client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::Auth(format!(
                "Elements API rejected credentials for '{}' ({})",
                self.username, status
            )));
        }

        if !status.is_success() {
            debug!(proprietary_id = %proprietary_id, status = status.as_u16(), "User lookup returned non-success status");
            return Ok(None);
        }

        let body = response.text().await?;
        parse_manual_record(&body)
    }

    /// PATCH a manual record with an `update-record` document
    ///
    /// Any status other than 200 is reported as a failure with the response
    /// body kept verbatim.
    pub async fn patch_manual_record(
        &self,
        user_record_id: &str,
        xml_payload: &str,
    ) -> SyncResult<DispatchOutcome> {
        let url = self.manual_record_url(user_record_id);
        debug!(url = %url, "Sending record update");

        let response = self
            .http_client
            .patch(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "text/xml")
            .body(xml_payload.to_owned())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(DispatchOutcome::Success);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        Ok(DispatchOutcome::Failure {
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Extract user and manual record IDs from a user lookup feed
///
/// Takes `id` from the first `entry/api:object` and `id-at-source` from the
/// first `api:record` inside that same object with `format="native"` or
/// `source-name="manual"`. Returns `Ok(None)` if either is absent; records
/// of later objects are never considered.
pub fn parse_manual_record(xml: &str) -> SyncResult<Option<ManualRecordRef>> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entry_depth = 0usize;
    // Set while inside the first object of an entry
    let mut user_id: Option<Option<String>> = None;

    loop {
        match reader.read_resolved_event()? {
            (ResolveResult::Bound(ns), Event::Start(e)) => {
                let local = e.local_name();
                match (ns.0, local.as_ref()) {
                    (ns, b"entry") if ns == ATOM_NS.as_bytes() => entry_depth += 1,
                    (ns, b"object") if ns == API_NS.as_bytes() && entry_depth > 0 => {
                        if user_id.is_none() {
                            user_id = Some(attribute(&e, b"id")?);
                        }
                    }
                    (ns, b"record") if ns == API_NS.as_bytes() => {
                        if let Some(found) = manual_record(&user_id, &e)? {
                            return Ok(Some(found));
                        }
                    }
                    _ => {}
                }
            }
            (ResolveResult::Bound(ns), Event::Empty(e)) => {
                let local = e.local_name();
                match (ns.0, local.as_ref()) {
                    // A childless first object has no records
                    (ns, b"object") if ns == API_NS.as_bytes() && entry_depth > 0 => {
                        return Ok(None);
                    }
                    (ns, b"record") if ns == API_NS.as_bytes() => {
                        if let Some(found) = manual_record(&user_id, &e)? {
                            return Ok(Some(found));
                        }
                    }
                    _ => {}
                }
            }
            (ResolveResult::Bound(ns), Event::End(e)) => {
                let local = e.local_name();
                match (ns.0, local.as_ref()) {
                    (ns, b"entry") if ns == ATOM_NS.as_bytes() => {
                        entry_depth = entry_depth.saturating_sub(1);
                    }
                    // First object closed without a manual record
                    (ns, b"object") if ns == API_NS.as_bytes() && user_id.is_some() => {
                        return Ok(None);
                    }
                    _ => {}
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(None)
}

/// `record` as a manual record of the current object, if it qualifies
fn manual_record(
    user_id: &Option<Option<String>>,
    record: &BytesStart<'_>,
) -> SyncResult<Option<ManualRecordRef>> {
    let Some(Some(uid)) = user_id else {
        return Ok(None);
    };
    if !is_manual_record(record)? {
        return Ok(None);
    }
    Ok(attribute(record, b"id-at-source")?.map(|record_id| ManualRecordRef {
        user_id: uid.clone(),
        user_record_id: record_id,
    }))
}

fn is_manual_record(e: &BytesStart<'_>) -> SyncResult<bool> {
    let native = attribute(e, b"format")?.is_some_and(|f| f == "native");
    let manual = attribute(e, b"source-name")?.is_some_and(|s| s == "manual");
    Ok(native || manual)
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> SyncResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SyncError::Parse(format!("XML attribute: {}", err)))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| SyncError::Parse(format!("XML attribute value: {}", err)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
