//! Minimal Nextcloud CalDAV/WebDAV client: PROPFIND listing, single-item
//! GET/PUT/DELETE, and field-overlay merge. One short-lived HTTP agent per
//! invocation, HTTP Basic auth, configurable timeout, no retries — remote
//! failures surface with the status code and a truncated body.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::{clean_ics_text, unfold_ics_lines};

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Fields retained from a fetched ICS item.
const RELEVANT_FIELDS: [&str; 12] = [
    "SUMMARY",
    "UID",
    "STATUS",
    "PRIORITY",
    "DUE",
    "DTSTART",
    "DESCRIPTION",
    "LOCATION",
    "URL",
    "PERCENT-COMPLETE",
    "COMPLETED",
    "LAST-MODIFIED",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct NextcloudConfig {
    #[serde(default)]
    pub(crate) host: String,
    #[serde(default)]
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) calendar_url: Option<String>,
    #[serde(default)]
    pub(crate) tasks_url: Option<String>,
    #[serde(default)]
    pub(crate) files_url: Option<String>,
    #[serde(default)]
    pub(crate) deck_url: Option<String>,
    #[serde(default)]
    pub(crate) timeout_seconds: Option<u64>,
}

impl NextcloudConfig {
    pub(crate) fn is_configured(&self) -> bool {
        !self.host.is_empty() || self.tasks_url.is_some() || self.calendar_url.is_some()
    }

    /// CalDAV tasks collection, e.g.
    /// `https://host/remote.php/dav/calendars/user/tasks/`.
    pub(crate) fn tasks_url(&self) -> String {
        if let Some(url) = &self.tasks_url {
            return url.clone();
        }
        format!(
            "{}/remote.php/dav/calendars/{}/tasks/",
            self.host.trim_end_matches('/'),
            urlencoding::encode(&self.username)
        )
    }

    /// CalDAV personal calendar collection.
    pub(crate) fn calendar_url(&self) -> String {
        if let Some(url) = &self.calendar_url {
            return url.clone();
        }
        format!(
            "{}/remote.php/dav/calendars/{}/personal/",
            self.host.trim_end_matches('/'),
            urlencoding::encode(&self.username)
        )
    }

    /// WebDAV files root.
    pub(crate) fn files_url(&self) -> String {
        if let Some(url) = &self.files_url {
            return url.clone();
        }
        format!("{}/remote.php/webdav/", self.host.trim_end_matches('/'))
    }

    /// Nextcloud Deck API root.
    pub(crate) fn deck_url(&self) -> String {
        if let Some(url) = &self.deck_url {
            return url.clone();
        }
        format!(
            "{}/index.php/apps/deck/api/v1.0/",
            self.host.trim_end_matches('/')
        )
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub(crate) fn agent(&self) -> ureq::Agent {
        http_agent(self.timeout())
    }

    pub(crate) fn auth_header(&self) -> String {
        basic_auth(&self.username, &self.password)
    }
}

pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    let raw = format!("{username}:{password}");
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

/// Nextcloud PROPFIND returns hrefs as server-relative paths; rebuild the
/// absolute URL from the collection base.
pub(crate) fn full_url(collection_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    match collection_url.find("/remote.php") {
        Some(idx) if idx > 0 => format!("{}{}", &collection_url[..idx], href),
        _ => href.to_string(),
    }
}

/// RFC 3339 → ICS UTC basic format ("2026-02-24T20:00:00+06:00" →
/// "20260224T140000Z"). Partial ICS strings fall back to stripping
/// separators.
pub(crate) fn format_rfc3339_to_ics(ts: &str) -> String {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(t) => t.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string(),
        Err(_) => ts.replace(['-', ':'], ""),
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(300).collect()
}

fn remote_error(op: &str, err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            format!("{op}: remote returned {code}: {}", truncate_body(&body))
        }
        ureq::Error::Transport(t) => format!("{op}: {t}"),
    }
}

/// PROPFIND Depth:1 over a collection, returning every href ending in
/// `.ics`. Nextcloud emits lowercase `d:href`, so scan case-insensitively.
pub(crate) fn propfind_hrefs(cfg: &NextcloudConfig, collection_url: &str) -> Result<Vec<String>, String> {
    let resp = cfg
        .agent()
        .request("PROPFIND", collection_url)
        .set("Depth", "1")
        .set("Content-Type", "application/xml")
        .set("Authorization", &cfg.auth_header())
        .send_string(r#"<?xml version="1.0"?><propfind xmlns="DAV:"><prop><getetag/></prop></propfind>"#)
        .map_err(|e| remote_error("PROPFIND", e))?;

    let body = resp
        .into_string()
        .map_err(|e| format!("PROPFIND: reading response: {e}"))?;
    Ok(scan_ics_hrefs(&body))
}

pub(crate) fn scan_ics_hrefs(body: &str) -> Vec<String> {
    let mut hrefs = Vec::new();
    for chunk in body.split('<') {
        let lower = chunk.to_lowercase();
        if lower.starts_with("d:href>") || lower.starts_with("href>") {
            if let Some((_, val)) = chunk.split_once('>') {
                let val = val.trim();
                if val.ends_with(".ics") {
                    hrefs.push(val.to_string());
                }
            }
        }
    }
    hrefs
}

/// GET a single item and parse its relevant fields: unfold per RFC 5545,
/// split on the first `:`, strip `;` parameters, upper-case the key,
/// unescape `\,` `\;` `\n`.
pub(crate) fn get_item_fields(
    cfg: &NextcloudConfig,
    collection_url: &str,
    href: &str,
) -> Result<HashMap<String, String>, String> {
    let url = full_url(collection_url, href);
    let resp = cfg
        .agent()
        .get(&url)
        .set("Authorization", &cfg.auth_header())
        .call()
        .map_err(|e| remote_error("GET", e))?;
    let body = resp
        .into_string()
        .map_err(|e| format!("GET: reading response: {e}"))?;
    Ok(parse_item_fields(&body))
}

pub(crate) fn parse_item_fields(body: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in unfold_ics_lines(body) {
        let Some((key_raw, val)) = line.split_once(':') else {
            continue;
        };
        let key = key_raw
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_uppercase();
        if RELEVANT_FIELDS.contains(&key.as_str()) {
            fields.insert(key, clean_ics_text(val.trim()));
        }
    }
    fields
}

/// One ICS property line, already formatted ("DUE:20260221T170000Z").
pub(crate) type IcsProp = (String, String);

/// Synthesize the VCALENDAR envelope around a single VTODO or VEVENT.
pub(crate) fn build_ics(component: &str, uid: &str, props: &[IcsProp]) -> String {
    let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut body = String::new();
    body.push_str("BEGIN:VCALENDAR\r\n");
    body.push_str("VERSION:2.0\r\n");
    body.push_str("PRODID:-//picoclaw//EN\r\n");
    body.push_str(&format!("BEGIN:{component}\r\n"));
    body.push_str(&format!("UID:{uid}\r\n"));
    body.push_str(&format!("DTSTAMP:{dtstamp}\r\n"));
    for (key, value) in props {
        if !value.is_empty() {
            body.push_str(&format!("{key}:{value}\r\n"));
        }
    }
    body.push_str(&format!("END:{component}\r\n"));
    body.push_str("END:VCALENDAR\r\n");
    body
}

/// PUT an item payload at `<collection>/<uid>.ics`. Success is 201 or 204.
pub(crate) fn put_item(
    cfg: &NextcloudConfig,
    collection_url: &str,
    uid: &str,
    ics_body: &str,
) -> Result<(), String> {
    let url = format!("{}{uid}.ics", collection_url);
    put_item_at(cfg, &url, ics_body)
}

pub(crate) fn put_item_at(cfg: &NextcloudConfig, url: &str, ics_body: &str) -> Result<(), String> {
    let resp = cfg
        .agent()
        .put(url)
        .set("Content-Type", "text/calendar; charset=utf-8")
        .set("Authorization", &cfg.auth_header())
        .send_string(ics_body)
        .map_err(|e| remote_error("PUT", e))?;
    match resp.status() {
        201 | 204 => Ok(()),
        other => Err(format!("PUT: remote returned {other}")),
    }
}

/// DELETE on the full item URL. Success is 200 or 204.
pub(crate) fn delete_item(
    cfg: &NextcloudConfig,
    collection_url: &str,
    href: &str,
) -> Result<(), String> {
    let url = full_url(collection_url, href);
    let resp = cfg
        .agent()
        .delete(&url)
        .set("Authorization", &cfg.auth_header())
        .call()
        .map_err(|e| remote_error("DELETE", e))?;
    match resp.status() {
        200 | 204 => Ok(()),
        other => Err(format!("DELETE: remote returned {other}")),
    }
}

/// Optional field overlay for merge/push operations.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskUpdate {
    pub(crate) summary: Option<String>,
    pub(crate) due: Option<String>,
    pub(crate) start: Option<String>,
    pub(crate) priority: Option<i64>,
    pub(crate) percent_complete: Option<i64>,
    pub(crate) location: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) status: Option<String>,
}

/// GET an existing VTODO, overlay only the caller-provided fields, PUT it
/// back. The UID is preserved.
pub(crate) fn merge_task(
    cfg: &NextcloudConfig,
    collection_url: &str,
    href: &str,
    updates: &TaskUpdate,
) -> Result<(), String> {
    let mut fields = get_item_fields(cfg, collection_url, href)?;
    let uid = fields
        .get("UID")
        .cloned()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "merge: fetched item has no UID".to_string())?;

    if let Some(summary) = &updates.summary {
        fields.insert("SUMMARY".to_string(), summary.clone());
    }
    if let Some(due) = &updates.due {
        fields.insert("DUE".to_string(), format_rfc3339_to_ics(due));
    }
    if let Some(start) = &updates.start {
        fields.insert("DTSTART".to_string(), format_rfc3339_to_ics(start));
    }
    if let Some(priority) = updates.priority {
        fields.insert("PRIORITY".to_string(), priority.to_string());
    }
    if let Some(pct) = updates.percent_complete {
        fields.insert("PERCENT-COMPLETE".to_string(), pct.to_string());
    }
    if let Some(location) = &updates.location {
        fields.insert("LOCATION".to_string(), location.clone());
    }
    if let Some(url) = &updates.url {
        fields.insert("URL".to_string(), url.clone());
    }
    if let Some(notes) = &updates.notes {
        fields.insert("DESCRIPTION".to_string(), notes.replace('\n', "\\n"));
    }
    if let Some(status) = &updates.status {
        fields.insert("STATUS".to_string(), status.to_uppercase());
    }

    let mut props: Vec<IcsProp> = Vec::new();
    props.push((
        "SUMMARY".to_string(),
        fields.get("SUMMARY").cloned().unwrap_or_default(),
    ));
    props.push((
        "STATUS".to_string(),
        fields
            .get("STATUS")
            .cloned()
            .unwrap_or_else(|| "NEEDS-ACTION".to_string()),
    ));
    for key in [
        "DUE",
        "DTSTART",
        "PRIORITY",
        "PERCENT-COMPLETE",
        "DESCRIPTION",
        "LOCATION",
        "URL",
    ] {
        if let Some(v) = fields.get(key) {
            if !v.is_empty() {
                props.push((key.to_string(), v.clone()));
            }
        }
    }

    let body = build_ics("VTODO", &uid, &props);
    let url = full_url(collection_url, href);
    put_item_at(cfg, &url, &body)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NextcloudConfig {
        NextcloudConfig {
            host: "https://cloud.example.org/".to_string(),
            username: "jony rahman".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_construction() {
        let c = cfg();
        assert_eq!(
            c.tasks_url(),
            "https://cloud.example.org/remote.php/dav/calendars/jony%20rahman/tasks/"
        );
        assert_eq!(
            c.calendar_url(),
            "https://cloud.example.org/remote.php/dav/calendars/jony%20rahman/personal/"
        );
        assert_eq!(c.files_url(), "https://cloud.example.org/remote.php/webdav/");
        assert_eq!(
            c.deck_url(),
            "https://cloud.example.org/index.php/apps/deck/api/v1.0/"
        );
    }

    #[test]
    fn test_explicit_url_overrides() {
        let c = NextcloudConfig {
            tasks_url: Some("https://other/dav/tasks/".to_string()),
            ..Default::default()
        };
        assert_eq!(c.tasks_url(), "https://other/dav/tasks/");
    }

    #[test]
    fn test_full_url() {
        let base = "https://cloud.example.org/remote.php/dav/calendars/u/tasks/";
        assert_eq!(
            full_url(base, "/remote.php/dav/calendars/u/tasks/abc.ics"),
            "https://cloud.example.org/remote.php/dav/calendars/u/tasks/abc.ics"
        );
        assert_eq!(full_url(base, "https://x/y.ics"), "https://x/y.ics");
    }

    #[test]
    fn test_scan_ics_hrefs_case_insensitive() {
        let body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
 <d:response><d:href>/remote.php/dav/calendars/u/tasks/</d:href></d:response>
 <d:response><d:href>/remote.php/dav/calendars/u/tasks/a1.ics</d:href></d:response>
 <D:response><D:HREF>/remote.php/dav/calendars/u/tasks/b2.ics</D:HREF></D:response>
</d:multistatus>"#;
        let hrefs = scan_ics_hrefs(body);
        assert_eq!(hrefs.len(), 2);
        assert!(hrefs[0].ends_with("a1.ics"));
    }

    #[test]
    fn test_parse_item_fields_unfolds_and_unescapes() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:abc-123\r\nSUMMARY:Buy milk\\, eggs\r\n  and bread\r\nSTATUS:NEEDS-ACTION\r\nDUE;VALUE=DATE:20260301\r\nPERCENT-COMPLETE:50\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let fields = parse_item_fields(ics);
        assert_eq!(fields["UID"], "abc-123");
        assert_eq!(fields["SUMMARY"], "Buy milk, eggs and bread");
        assert_eq!(fields["DUE"], "20260301");
        assert_eq!(fields["PERCENT-COMPLETE"], "50");
        assert!(!fields.contains_key("BEGIN"));
    }

    #[test]
    fn test_format_rfc3339_to_ics() {
        assert_eq!(
            format_rfc3339_to_ics("2026-02-24T20:00:00+06:00"),
            "20260224T140000Z"
        );
        assert_eq!(format_rfc3339_to_ics("20260224T140000Z"), "20260224T140000Z");
    }

    #[test]
    fn test_build_ics_envelope() {
        let body = build_ics(
            "VTODO",
            "uid-1",
            &[
                ("SUMMARY".to_string(), "Medicine Order".to_string()),
                ("STATUS".to_string(), "NEEDS-ACTION".to_string()),
                ("DUE;VALUE=DATE".to_string(), "20260221".to_string()),
                ("RRULE".to_string(), "FREQ=DAILY;INTERVAL=30".to_string()),
                ("LOCATION".to_string(), String::new()),
            ],
        );
        assert!(body.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(body.contains("BEGIN:VTODO\r\n"));
        assert!(body.contains("UID:uid-1\r\n"));
        assert!(body.contains("RRULE:FREQ=DAILY;INTERVAL=30\r\n"));
        assert!(!body.contains("LOCATION"), "empty props are dropped");
        assert!(body.ends_with("END:VTODO\r\nEND:VCALENDAR\r\n"));
    }
}
