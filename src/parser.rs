//! Consolidated calendar-and-feed text parsing, shared by the task, deadline
//! and news skills: the xCal (RFC 6321) document model used for the local
//! `tasks.xml` / `events.xml` mirrors, ICS (RFC 5545) text handling, OPML
//! outlines, and RSS/Atom item extraction.
//!
//! The documents involved have small fixed shapes, so parsing is scanning
//! over tag boundaries rather than a general XML machine. Anything
//! malformed yields `Err` or an empty list; nothing here panics on input.

use chrono::{DateTime, Utc};

// ── xCal document model ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub(crate) struct ICalendar {
    pub(crate) vtodos: Vec<VTodo>,
    pub(crate) vevents: Vec<VEvent>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct VTodo {
    pub(crate) uid: String,
    pub(crate) summary: String,
    pub(crate) description: String,
    /// NEEDS-ACTION, IN-PROCESS, COMPLETED, CANCELLED — stored upper-case.
    pub(crate) status: String,
    /// RFC 5545: 0 undefined, 1 highest .. 9 lowest.
    pub(crate) priority: i64,
    /// Date-time deadline (RFC 3339) — exclusive with `due_date`.
    pub(crate) due: String,
    /// Date-only deadline (YYYY-MM-DD).
    pub(crate) due_date: String,
    /// Free labels like "Today", "Tomorrow", "Someday".
    pub(crate) categories: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct VEvent {
    pub(crate) uid: String,
    pub(crate) summary: String,
    pub(crate) description: String,
    pub(crate) location: String,
    pub(crate) dtstart: String,
    pub(crate) dtstart_date: String,
    pub(crate) dtend: String,
    pub(crate) dtend_date: String,
}

// ── Scanning primitives ──────────────────────────────────────────────────

/// All inner bodies of `<tag ...>...</tag>` occurrences, in order.
fn tag_blocks<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open_a = format!("<{tag}>");
    let open_b = format!("<{tag} ");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = text;
    loop {
        let start = match (rest.find(&open_a), rest.find(&open_b)) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        let after_open = match rest[start..].find('>') {
            Some(i) => start + i + 1,
            None => break,
        };
        let Some(end_rel) = rest[after_open..].find(&close) else {
            break;
        };
        out.push(&rest[after_open..after_open + end_rel]);
        rest = &rest[after_open + end_rel + close.len()..];
    }
    out
}

/// First inner body of `<tag>...</tag>` within `text`.
fn tag_value<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    tag_blocks(text, tag).into_iter().next()
}

/// xCal nests values one level deep: `<summary><text>..</text></summary>`.
/// Properties like `due` may appear once per value form, so every block is
/// checked for the requested inner tag.
fn xcal_value(block: &str, prop: &str, inner: &str) -> String {
    tag_blocks(block, prop)
        .into_iter()
        .find_map(|b| tag_value(b, inner))
        .map(|v| unescape_xml(v.trim()))
        .unwrap_or_default()
}

/// Value of `name="..."` inside a single tag's attribute text.
fn attr_value(tag_text: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let start = tag_text.find(&needle)? + needle.len();
    let end = tag_text[start..].find('"')?;
    Some(unescape_xml(&tag_text[start..start + end]))
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub(crate) fn unescape_xml(s: &str) -> String {
    let mut out = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    // Numeric references, decimal and hex.
    while let Some(start) = out.find("&#") {
        let Some(end) = out[start..].find(';') else { break };
        let body = &out[start + 2..start + end];
        let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        let replacement = code.and_then(char::from_u32).map(String::from);
        match replacement {
            Some(ch) => out.replace_range(start..start + end + 1, &ch),
            None => break,
        }
    }
    out.replace("&amp;", "&")
}

fn strip_cdata(s: &str) -> &str {
    s.trim()
        .strip_prefix("<![CDATA[")
        .and_then(|v| v.strip_suffix("]]>"))
        .unwrap_or(s.trim())
}

// ── xCal parse / emit ────────────────────────────────────────────────────

pub(crate) fn parse_xcal(xml: &str) -> Result<ICalendar, String> {
    if !xml.contains("<icalendar") {
        return Err("not an xCal document (missing <icalendar>)".to_string());
    }
    let mut cal = ICalendar::default();

    for block in tag_blocks(xml, "vtodo") {
        cal.vtodos.push(VTodo {
            uid: xcal_value(block, "uid", "text"),
            summary: xcal_value(block, "summary", "text"),
            description: xcal_value(block, "description", "text"),
            status: xcal_value(block, "status", "text").to_uppercase(),
            priority: xcal_value(block, "priority", "integer")
                .parse()
                .unwrap_or(0),
            due: xcal_value(block, "due", "date-time"),
            due_date: xcal_value(block, "due", "date"),
            categories: xcal_value(block, "categories", "text"),
        });
    }
    for block in tag_blocks(xml, "vevent") {
        cal.vevents.push(VEvent {
            uid: xcal_value(block, "uid", "text"),
            summary: xcal_value(block, "summary", "text"),
            description: xcal_value(block, "description", "text"),
            location: xcal_value(block, "location", "text"),
            dtstart: xcal_value(block, "dtstart", "date-time"),
            dtstart_date: xcal_value(block, "dtstart", "date"),
            dtend: xcal_value(block, "dtend", "date-time"),
            dtend_date: xcal_value(block, "dtend", "date"),
        });
    }
    Ok(cal)
}

fn push_prop(out: &mut String, prop: &str, inner: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push_str(&format!(
        "        <{prop}><{inner}>{}</{inner}></{prop}>\n",
        escape_xml(value)
    ));
}

/// Serialize back to the xCal mirror format the skills read.
pub(crate) fn emit_xcal(cal: &ICalendar) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<icalendar xmlns=\"urn:ietf:params:xml:ns:icalendar-2.0\">\n  <vcalendar>\n    <properties>\n      <version><text>2.0</text></version>\n      <prodid><text>-//picoclaw//EN</text></prodid>\n    </properties>\n    <components>\n",
    );
    for todo in &cal.vtodos {
        out.push_str("      <vtodo>\n      <properties>\n");
        push_prop(&mut out, "uid", "text", &todo.uid);
        push_prop(&mut out, "summary", "text", &todo.summary);
        push_prop(&mut out, "description", "text", &todo.description);
        push_prop(&mut out, "status", "text", &todo.status);
        if todo.priority > 0 {
            push_prop(&mut out, "priority", "integer", &todo.priority.to_string());
        }
        push_prop(&mut out, "due", "date-time", &todo.due);
        push_prop(&mut out, "due", "date", &todo.due_date);
        push_prop(&mut out, "categories", "text", &todo.categories);
        out.push_str("      </properties>\n      </vtodo>\n");
    }
    for event in &cal.vevents {
        out.push_str("      <vevent>\n      <properties>\n");
        push_prop(&mut out, "uid", "text", &event.uid);
        push_prop(&mut out, "summary", "text", &event.summary);
        push_prop(&mut out, "description", "text", &event.description);
        push_prop(&mut out, "location", "text", &event.location);
        push_prop(&mut out, "dtstart", "date-time", &event.dtstart);
        push_prop(&mut out, "dtstart", "date", &event.dtstart_date);
        push_prop(&mut out, "dtend", "date-time", &event.dtend);
        push_prop(&mut out, "dtend", "date", &event.dtend_date);
        out.push_str("      </properties>\n      </vevent>\n");
    }
    out.push_str("    </components>\n  </vcalendar>\n</icalendar>\n");
    out
}

pub(crate) fn empty_xcal() -> String {
    emit_xcal(&ICalendar::default())
}

// ── ICS (RFC 5545) text handling ─────────────────────────────────────────

/// RFC 5545 unfolding: a line starting with SPACE or HTAB continues the
/// previous line.
pub(crate) fn unfold_ics_lines(raw: &str) -> Vec<String> {
    let mut folded: Vec<String> = Vec::new();
    for line in raw.replace("\r\n", "\n").split('\n') {
        if let Some(cont) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = folded.last_mut() {
                last.push_str(cont);
                continue;
            }
        }
        folded.push(line.to_string());
    }
    folded
}

/// ICS escapes commas, semicolons and newlines: `\,` `\;` `\n`.
pub(crate) fn clean_ics_text(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\,", ",").replace("\\;", ";")
}

/// 20260220 → 2026-02-20.
pub(crate) fn format_ics_date(val: &str) -> String {
    if val.len() >= 8 && val[..8].chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &val[0..4], &val[4..6], &val[6..8])
    } else {
        val.to_string()
    }
}

/// Basic ISO 8601 (20260220T150000Z) → RFC 3339. Values without an
/// explicit zone are treated as UTC.
pub(crate) fn format_ics_datetime(val: &str) -> String {
    if val.len() >= 15 && val.contains('T') {
        let date = format_ics_date(&val[..8]);
        let time_part = &val[9..];
        if time_part.len() >= 6 {
            return format!(
                "{date}T{}:{}:{}Z",
                &time_part[0..2],
                &time_part[2..4],
                &time_part[4..6]
            );
        }
    }
    val.to_string()
}

/// Translate flat ICS text into the xCal tree. Collects both VEVENTs and
/// VTODOs so the calendar sync and the deadline sweep share one pass.
pub(crate) fn parse_ics(raw: &str) -> ICalendar {
    let lines = unfold_ics_lines(raw);
    let mut cal = ICalendar::default();
    let mut event: Option<VEvent> = None;
    let mut todo: Option<VTodo> = None;

    for line in &lines {
        let Some((key_raw, val)) = line.split_once(':') else {
            continue;
        };
        let key = key_raw
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_uppercase();
        let val = val.trim();

        match key.as_str() {
            "BEGIN" => match val {
                "VEVENT" => event = Some(VEvent::default()),
                "VTODO" => todo = Some(VTodo::default()),
                _ => {}
            },
            "END" => match val {
                "VEVENT" => {
                    if let Some(e) = event.take() {
                        cal.vevents.push(e);
                    }
                }
                "VTODO" => {
                    if let Some(t) = todo.take() {
                        cal.vtodos.push(t);
                    }
                }
                _ => {}
            },
            "UID" => {
                if let Some(e) = event.as_mut() {
                    e.uid = val.to_string();
                } else if let Some(t) = todo.as_mut() {
                    t.uid = val.to_string();
                }
            }
            "SUMMARY" => {
                if let Some(e) = event.as_mut() {
                    e.summary = clean_ics_text(val);
                } else if let Some(t) = todo.as_mut() {
                    t.summary = clean_ics_text(val);
                }
            }
            "DESCRIPTION" => {
                if let Some(e) = event.as_mut() {
                    e.description = clean_ics_text(val);
                } else if let Some(t) = todo.as_mut() {
                    t.description = clean_ics_text(val);
                }
            }
            "LOCATION" => {
                if let Some(e) = event.as_mut() {
                    e.location = clean_ics_text(val);
                }
            }
            "STATUS" => {
                if let Some(t) = todo.as_mut() {
                    t.status = val.to_uppercase();
                }
            }
            "PRIORITY" => {
                if let Some(t) = todo.as_mut() {
                    t.priority = val.parse().unwrap_or(0);
                }
            }
            "DUE" => {
                if let Some(t) = todo.as_mut() {
                    if val.len() == 8 {
                        t.due_date = format_ics_date(val);
                    } else {
                        t.due = format_ics_datetime(val);
                    }
                }
            }
            "DTSTART" => {
                if let Some(e) = event.as_mut() {
                    if val.len() == 8 {
                        e.dtstart_date = format_ics_date(val);
                    } else {
                        e.dtstart = format_ics_datetime(val);
                    }
                }
            }
            "DTEND" => {
                if let Some(e) = event.as_mut() {
                    if val.len() == 8 {
                        e.dtend_date = format_ics_date(val);
                    } else {
                        e.dtend = format_ics_datetime(val);
                    }
                }
            }
            _ => {}
        }
    }
    cal
}

// ── OPML ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct FeedEntry {
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) category: String,
    pub(crate) tier: i64,
    pub(crate) lang: String,
    pub(crate) active: bool,
}

/// Parse OPML outlines into feed entries. Nested outlines inherit the
/// parent's mapped category.
pub(crate) fn parse_opml(xml: &str) -> Vec<FeedEntry> {
    let Some(body) = tag_value(xml, "body") else {
        return Vec::new();
    };
    let mut feeds = Vec::new();
    let mut category_stack: Vec<String> = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find("<outline") {
        let after = &rest[start..];
        let Some(tag_end) = after.find('>') else { break };
        let tag_text = &after[..tag_end + 1];
        let self_closing = tag_text.trim_end_matches('>').ends_with('/');

        let text = attr_value(tag_text, "text").unwrap_or_default();
        let title = attr_value(tag_text, "title").unwrap_or_default();
        let xml_url = attr_value(tag_text, "xmlUrl").unwrap_or_default();
        let parent = category_stack.last().cloned().unwrap_or_default();
        let category = map_category(&text, &title, &parent);

        if !xml_url.is_empty() {
            let name = if title.is_empty() { text.clone() } else { title };
            feeds.push(FeedEntry {
                name,
                url: xml_url,
                category: category.clone(),
                tier: 2,
                lang: "en".to_string(),
                active: true,
            });
        }
        if !self_closing {
            category_stack.push(category);
        }

        // Pop closed containers between here and the next opening tag.
        let advanced = &rest[start + tag_end + 1..];
        let next_open = advanced.find("<outline").unwrap_or(advanced.len());
        let closes = advanced[..next_open].matches("</outline>").count();
        for _ in 0..closes {
            category_stack.pop();
        }
        rest = advanced;
    }
    feeds
}

/// Keyword heuristics mapping outline labels to a feed category. Legacy
/// names fall through to `default` in the dedup window table.
pub(crate) fn map_category(text: &str, title: &str, parent: &str) -> String {
    let combined = format!("{} {}", text.to_lowercase(), title.to_lowercase());
    let parent_lower = parent.to_lowercase();

    if combined.contains("bangladesh") || combined.contains(" bd ") || parent_lower.contains("bangladesh")
    {
        return "bangladesh".to_string();
    }
    if combined.contains("breaking")
        || combined.contains("wire")
        || combined.contains("reuters")
        || combined.contains("ap ")
        || combined.contains("bbc")
    {
        return "world".to_string();
    }
    if combined.contains("ai")
        || combined.contains("llm")
        || combined.contains("model")
        || combined.contains("gpt")
        || combined.contains("gemini")
        || combined.contains("claude")
    {
        return "ai".to_string();
    }
    if combined.contains("research")
        || combined.contains("arxiv")
        || combined.contains("academic")
        || combined.contains("paper")
    {
        return "research".to_string();
    }
    if combined.contains("tech")
        || combined.contains("startup")
        || combined.contains("robot")
        || combined.contains("hardware")
    {
        return "tech".to_string();
    }
    if !parent.is_empty() && parent != "default" {
        return parent.to_string();
    }
    "default".to_string()
}

// ── RSS / Atom ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub(crate) struct FeedItem {
    pub(crate) title: String,
    pub(crate) link: String,
    pub(crate) description: String,
    pub(crate) published_at: Option<DateTime<Utc>>,
}

fn text_of(block: &str, tag: &str) -> String {
    tag_value(block, tag)
        .map(strip_cdata)
        .map(unescape_xml)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

/// Extract items from RSS 2.0 (`<item>`) or Atom (`<entry>`) documents.
pub(crate) fn parse_feed_items(xml: &str) -> Result<Vec<FeedItem>, String> {
    let mut items = Vec::new();

    for block in tag_blocks(xml, "item") {
        let item = FeedItem {
            title: text_of(block, "title"),
            link: text_of(block, "link"),
            description: text_of(block, "description"),
            published_at: parse_feed_date(&text_of(block, "pubDate")),
        };
        if !item.title.is_empty() {
            items.push(item);
        }
    }

    if items.is_empty() {
        for block in tag_blocks(xml, "entry") {
            // Atom links are attributes: <link href="..."/>
            let link = block
                .find("<link")
                .and_then(|i| {
                    let tag_end = block[i..].find('>')?;
                    attr_value(&block[i..i + tag_end + 1], "href")
                })
                .unwrap_or_default();
            let description = {
                let summary = text_of(block, "summary");
                if summary.is_empty() {
                    text_of(block, "content")
                } else {
                    summary
                }
            };
            let published = {
                let p = text_of(block, "published");
                if p.is_empty() {
                    text_of(block, "updated")
                } else {
                    p
                }
            };
            let item = FeedItem {
                title: text_of(block, "title"),
                link,
                description,
                published_at: parse_feed_date(&published),
            };
            if !item.title.is_empty() {
                items.push(item);
            }
        }
    }

    if items.is_empty() && !xml.contains("<item") && !xml.contains("<entry") {
        return Err("no RSS items or Atom entries found".to_string());
    }
    Ok(items)
}

/// Strip markup and collapse whitespace — used for news summaries before
/// hashing.
pub(crate) fn clean_html_text(text: &str) -> String {
    let unescaped = unescape_xml(strip_cdata(text));
    let mut out = String::with_capacity(unescaped.len());
    let mut in_tag = false;
    for ch in unescaped.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XCAL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<icalendar xmlns="urn:ietf:params:xml:ns:icalendar-2.0">
  <vcalendar>
    <components>
      <vtodo>
      <properties>
        <uid><text>todo-1</text></uid>
        <summary><text>Write report &amp; send</text></summary>
        <status><text>needs-action</text></status>
        <priority><integer>1</integer></priority>
        <categories><text>Today</text></categories>
      </properties>
      </vtodo>
      <vevent>
      <properties>
        <uid><text>ev-1</text></uid>
        <summary><text>Standup</text></summary>
        <dtstart><date-time>2026-02-23T09:00:00Z</date-time></dtstart>
      </properties>
      </vevent>
    </components>
  </vcalendar>
</icalendar>"#;

    #[test]
    fn test_parse_xcal() {
        let cal = parse_xcal(SAMPLE_XCAL).unwrap();
        assert_eq!(cal.vtodos.len(), 1);
        assert_eq!(cal.vevents.len(), 1);
        let todo = &cal.vtodos[0];
        assert_eq!(todo.uid, "todo-1");
        assert_eq!(todo.summary, "Write report & send");
        assert_eq!(todo.status, "NEEDS-ACTION");
        assert_eq!(todo.priority, 1);
        assert_eq!(cal.vevents[0].dtstart, "2026-02-23T09:00:00Z");
    }

    #[test]
    fn test_xcal_round_trip() {
        let cal = parse_xcal(SAMPLE_XCAL).unwrap();
        let emitted = emit_xcal(&cal);
        let reparsed = parse_xcal(&emitted).unwrap();
        assert_eq!(reparsed.vtodos.len(), 1);
        assert_eq!(reparsed.vtodos[0].summary, "Write report & send");
        assert_eq!(reparsed.vtodos[0].status, "NEEDS-ACTION");
        assert_eq!(reparsed.vevents[0].uid, "ev-1");
    }

    #[test]
    fn test_unfold_ics_lines() {
        let raw = "SUMMARY:A long\r\n  continued line\r\nSTATUS:NEEDS-ACTION\r\n\tmore";
        let lines = unfold_ics_lines(raw);
        assert_eq!(lines[0], "SUMMARY:A long continued line");
        assert_eq!(lines[1], "STATUS:NEEDS-ACTIONmore");
    }

    #[test]
    fn test_parse_ics_event_and_todo() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:e1\r\nSUMMARY:Dentist\\, checkup\r\nDTSTART;TZID=UTC:20260223T140000Z\r\nEND:VEVENT\r\nBEGIN:VTODO\r\nUID:t1\r\nSUMMARY:Pay rent\r\nSTATUS:needs-action\r\nDUE;VALUE=DATE:20260301\r\nPRIORITY:1\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let cal = parse_ics(ics);
        assert_eq!(cal.vevents.len(), 1);
        assert_eq!(cal.vevents[0].summary, "Dentist, checkup");
        assert_eq!(cal.vevents[0].dtstart, "2026-02-23T14:00:00Z");
        assert_eq!(cal.vtodos.len(), 1);
        assert_eq!(cal.vtodos[0].status, "NEEDS-ACTION");
        assert_eq!(cal.vtodos[0].due_date, "2026-03-01");
        assert_eq!(cal.vtodos[0].priority, 1);
    }

    #[test]
    fn test_format_ics_datetime() {
        assert_eq!(
            format_ics_datetime("20260220T150000Z"),
            "2026-02-20T15:00:00Z"
        );
        assert_eq!(format_ics_date("20260220"), "2026-02-20");
        assert_eq!(format_ics_date("garbage"), "garbage");
    }

    #[test]
    fn test_parse_opml() {
        let opml = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline text="Bangladesh News">
      <outline text="bdnews24" title="bdnews24" type="rss" xmlUrl="https://bdnews24.com/rss"/>
    </outline>
    <outline text="Tech" title="TechCrunch" type="rss" xmlUrl="https://techcrunch.com/feed/"/>
  </body>
</opml>"#;
        let feeds = parse_opml(opml);
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].url, "https://bdnews24.com/rss");
        assert_eq!(feeds[0].category, "bangladesh");
        assert_eq!(feeds[1].category, "tech");
    }

    #[test]
    fn test_parse_rss_items() {
        let rss = r#"<rss version="2.0"><channel>
<item><title>Big &amp; breaking story</title><link>https://a.com/1</link>
<description><![CDATA[<p>Body text</p>]]></description>
<pubDate>Mon, 23 Feb 2026 10:00:00 GMT</pubDate></item>
<item><title>Second</title><link>https://a.com/2</link></item>
</channel></rss>"#;
        let items = parse_feed_items(rss).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Big & breaking story");
        assert!(items[0].published_at.is_some());
        assert_eq!(clean_html_text(&items[0].description), "Body text");
    }

    #[test]
    fn test_parse_atom_entries() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
<entry><title>Paper one</title><link href="http://arxiv.org/abs/2402.12251"/>
<summary>An abstract.</summary><published>2026-02-20T00:00:00Z</published></entry>
</feed>"#;
        let items = parse_feed_items(atom).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "http://arxiv.org/abs/2402.12251");
        assert_eq!(items[0].description, "An abstract.");
    }

    #[test]
    fn test_parse_feed_items_malformed() {
        assert!(parse_feed_items("<html><body>not a feed</body></html>").is_err());
    }

    #[test]
    fn test_clean_html_text() {
        assert_eq!(
            clean_html_text("<p>Hello   <b>world</b></p>\n"),
            "Hello world"
        );
    }
}
