//! RFC cache codec — the plaintext data bus between skills.
//!
//! A cache file lives under the briefing composer's `memory/` directory and
//! carries one record per line:
//!
//!   [type:id12:tag] title | YYYYMMDD | url
//!
//! The header (`AGENT:`, `TS:`, `TTL:`, `COUNT:`) lets readers expire whole
//! files passively: a reader that finds `now - TS > TTL` deletes the file and
//! treats it as empty.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped before hashing so the same logical resource
/// always produces the same id12.
const TRACKING_PARAMS: [&str; 10] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "ref",
    "context",
    "source",
    "fbclid",
    "gclid",
];

/// Strip tracking parameters and the fragment, re-encoding the surviving
/// query pairs in sorted order. Unparseable input is returned unchanged.
pub(crate) fn canonical_url(raw: &str) -> String {
    let mut parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_string(),
    };
    let mut kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let encoded: Vec<String> = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    format!("{}=", urlencoding::encode(k))
                } else {
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                }
            })
            .collect();
        parsed.set_query(Some(&encoded.join("&")));
    }
    parsed.set_fragment(None);
    parsed.to_string()
}

/// First 12 hex characters of SHA-256 over the canonical URL.
/// 48-bit space; birthday collision at ~17M entries, far beyond the
/// per-day caches capped at 100 records.
pub(crate) fn id12(raw_url: &str) -> String {
    let normalized = canonical_url(raw_url);
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

/// Strip pipe characters and newlines so a field can't break the record
/// grammar.
fn sanitize_field(s: &str) -> String {
    s.replace('|', "-").replace(['\r', '\n'], "")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Format one record line. Title is capped at 80 chars (with `…`), tag at
/// 20; the date is normalized to YYYYMMDD and defaults to today.
pub(crate) fn encode_record(
    rec_type: &str,
    raw_url: &str,
    title: &str,
    tag: &str,
    date: &str,
) -> String {
    let id = id12(raw_url);
    let mut title = sanitize_field(title);
    let tag = truncate_chars(&sanitize_field(tag), 20);
    let url = raw_url.replace(['\r', '\n'], "");

    if title.chars().count() > 80 {
        title = format!("{}…", truncate_chars(&title, 77));
    }

    let mut date_compact: String = date.chars().filter(|c| *c != '-' && *c != '/').collect();
    if date_compact.len() > 8 {
        date_compact.truncate(8);
    }
    if date_compact.is_empty() {
        date_compact = Utc::now().format("%Y%m%d").to_string();
    }

    format!("[{rec_type}:{id}:{tag}] {title} | {date_compact} | {url}")
}

/// Parse a TTL string like "6h" / "24h". Invalid or non-positive values
/// fall back to 24 hours.
pub(crate) fn parse_ttl(ttl: &str) -> Duration {
    let cleaned = ttl.trim().to_lowercase();
    match cleaned.trim_end_matches('h').parse::<i64>() {
        Ok(hours) if hours > 0 => Duration::from_secs(hours as u64 * 3600),
        _ => Duration::from_secs(24 * 3600),
    }
}

/// Pull the id12 out of a record line like `[type:id12:tag] ...`.
pub(crate) fn extract_id12(line: &str) -> Option<String> {
    if !line.starts_with('[') {
        return None;
    }
    let end = line.find(']')?;
    let mut parts = line[1..end].splitn(3, ':');
    parts.next()?;
    let id = parts.next()?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Read a cache file: TTL-check (deleting expired files — passive GC),
/// then collect up to `max_records` record lines in order. A missing file
/// is not an error and yields an empty list.
pub(crate) fn parse_file(path: &Path, max_records: usize) -> Result<Vec<String>, String> {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("read {}: {e}", path.display())),
    };

    let mut ts_val = String::new();
    let mut ttl_val = String::new();
    let mut records = Vec::new();

    for line in data.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("TS:") {
            ts_val = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("TTL:") {
            ttl_val = rest.trim().to_string();
        } else if line.starts_with('[') {
            records.push(line.to_string());
        }
    }

    if !ts_val.is_empty() && !ttl_val.is_empty() {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&ts_val) {
            let ttl = parse_ttl(&ttl_val);
            let age = Utc::now().signed_duration_since(ts.with_timezone(&Utc));
            if age.num_seconds() > ttl.as_secs() as i64 {
                let _ = fs::remove_file(path);
                return Ok(Vec::new());
            }
        }
    }

    if max_records > 0 && records.len() > max_records {
        records.truncate(max_records);
    }
    Ok(records)
}

/// Merge `new_lines` into the existing file by id12 (newest wins, first-seen
/// order preserved), then atomically rewrite header + records via a `.tmp`
/// file and rename.
pub(crate) fn write_file(
    path: &Path,
    agent: &str,
    ttl: &str,
    new_lines: &[String],
) -> Result<(), String> {
    let mut existing: HashMap<String, String> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    if let Ok(data) = fs::read_to_string(path) {
        for line in data.lines() {
            let line = line.trim();
            if !line.starts_with('[') {
                continue;
            }
            if let Some(id) = extract_id12(line) {
                if !existing.contains_key(&id) {
                    order.push(id.clone());
                }
                existing.insert(id, line.to_string());
            }
        }
    }

    for line in new_lines {
        let Some(id) = extract_id12(line) else {
            continue;
        };
        if !existing.contains_key(&id) {
            order.push(id.clone());
        }
        existing.insert(id, line.clone());
    }

    let mut out = String::new();
    out.push_str(&format!("AGENT:  {agent}\n"));
    out.push_str(&format!("TS:     {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!("TTL:    {ttl}\n"));
    out.push_str(&format!("COUNT:  {}\n", order.len()));
    out.push('\n');
    for id in &order {
        out.push_str(&existing[id]);
        out.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("mkdir {}: {e}", parent.display()))?;
    }
    let tmp = path.with_extension("md.tmp");
    fs::write(&tmp, &out).map_err(|e| format!("write {}: {e}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| format!("rename {}: {e}", path.display()))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_url_strips_tracking() {
        assert_eq!(
            canonical_url("https://reuters.com/story?utm_source=rss&utm_medium=feed"),
            "https://reuters.com/story"
        );
        assert_eq!(
            canonical_url("https://thedailystar.net/article/123#comments"),
            "https://thedailystar.net/article/123"
        );
        assert_eq!(
            canonical_url("https://bdnews24.com/story?ref=homepage&source=rss"),
            "https://bdnews24.com/story"
        );
        assert_eq!(
            canonical_url("https://openai.com/blog/gpt5"),
            "https://openai.com/blog/gpt5"
        );
    }

    #[test]
    fn test_canonical_url_keeps_real_params() {
        let got = canonical_url("https://example.com/a?page=2&utm_term=x&q=rust");
        assert_eq!(got, "https://example.com/a?page=2&q=rust");
    }

    #[test]
    fn test_canonical_url_idempotent() {
        let once = canonical_url("https://reuters.com/x?fbclid=abc&id=9#frag");
        let twice = canonical_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_url_unparseable_passthrough() {
        assert_eq!(canonical_url("not a url"), "not a url");
    }

    #[test]
    fn test_id12_matches_canonical() {
        let a = id12("https://reuters.com/story/abc?utm_source=rss");
        let b = id12("https://reuters.com/story/abc?utm_source=twitter");
        let c = id12("https://reuters.com/story/abc");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_encode_record_shape() {
        let line = encode_record(
            "news",
            "https://example.com/story",
            "Some | piped\ntitle",
            "world",
            "2026-02-23",
        );
        assert!(line.starts_with("[news:"));
        assert!(line.contains("Some - piped"));
        assert!(line.contains("| 20260223 |"));
        assert!(line.ends_with("https://example.com/story"));
        // round trip: the id in the bracket tuple equals id12 of the URL
        assert_eq!(
            extract_id12(&line).unwrap(),
            id12("https://example.com/story")
        );
    }

    #[test]
    fn test_encode_record_truncates_title() {
        let long_title = "x".repeat(200);
        let line = encode_record("news", "https://e.com/1", &long_title, "t", "");
        let title_part = line.split('|').next().unwrap();
        assert!(title_part.contains('…'));
        // 77 chars + ellipsis
        let after_bracket = line.split("] ").nth(1).unwrap();
        let title = after_bracket.split(" |").next().unwrap();
        assert_eq!(title.chars().count(), 78);
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("6h"), Duration::from_secs(6 * 3600));
        assert_eq!(parse_ttl(" 24H "), Duration::from_secs(24 * 3600));
        assert_eq!(parse_ttl("garbage"), Duration::from_secs(24 * 3600));
        assert_eq!(parse_ttl("-3h"), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_parse_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lines = parse_file(&dir.path().join("absent.md"), 10).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_write_then_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news-20260223.md");
        let lines = vec![
            encode_record("news", "https://a.com/1", "First story", "world", "20260223"),
            encode_record("news", "https://b.com/2", "Second story", "tech", "20260223"),
        ];
        write_file(&path, "monitor", "6h", &lines).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("AGENT:  monitor"));
        assert!(content.contains("TTL:    6h"));
        assert!(content.contains("COUNT:  2"));

        let parsed = parse_file(&path, 20).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].contains("First story"));
    }

    #[test]
    fn test_write_file_idempotent_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.md");
        let lines = vec![
            encode_record("news", "https://a.com/1", "Story A", "world", "20260223"),
            encode_record("news", "https://b.com/2", "Story B", "world", "20260223"),
        ];
        write_file(&path, "monitor", "6h", &lines).unwrap();
        write_file(&path, "monitor", "6h", &lines).unwrap();

        let parsed = parse_file(&path, 0).unwrap();
        assert_eq!(parsed.len(), 2, "same id12 records must collapse");
    }

    #[test]
    fn test_write_file_newest_wins_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.md");
        write_file(
            &path,
            "monitor",
            "6h",
            &[
                encode_record("news", "https://a.com/1", "Old title", "world", "20260223"),
                encode_record("news", "https://b.com/2", "Other", "world", "20260223"),
            ],
        )
        .unwrap();
        write_file(
            &path,
            "monitor",
            "6h",
            &[encode_record(
                "news",
                "https://a.com/1",
                "New title",
                "world",
                "20260224",
            )],
        )
        .unwrap();

        let parsed = parse_file(&path, 0).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].contains("New title"), "upsert keeps insertion slot");
        assert!(parsed[1].contains("Other"));
    }

    #[test]
    fn test_expired_file_deleted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.md");
        let old_ts = (Utc::now() - chrono::Duration::hours(10)).to_rfc3339();
        let body = format!(
            "AGENT:  monitor\nTS:     {old_ts}\nTTL:    6h\nCOUNT:  1\n\n[news:abcdefabcdef:t] T | 20260101 | https://a.com\n"
        );
        fs::write(&path, body).unwrap();

        let parsed = parse_file(&path, 10).unwrap();
        assert!(parsed.is_empty());
        assert!(!path.exists(), "expired cache must be passively GC'd");
    }

    #[test]
    fn test_max_records_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.md");
        let lines: Vec<String> = (0..30)
            .map(|i| {
                encode_record(
                    "news",
                    &format!("https://a.com/{i}"),
                    &format!("Story {i}"),
                    "world",
                    "20260223",
                )
            })
            .collect();
        write_file(&path, "monitor", "6h", &lines).unwrap();
        assert_eq!(parse_file(&path, 20).unwrap().len(), 20);
    }
}
