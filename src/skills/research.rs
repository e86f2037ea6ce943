//! Research Scout: trending-paper discovery from arXiv and HuggingFace,
//! with CORE-rank annotation, bounded PDF downloads, and an RFC cache feed
//! into the composer's memory.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::parser;
use crate::rfc;
use crate::skill::{decode_command, init_workspace, Skill, ToolResult};

const IDENTITY: &str = "# Research Scout - Identity\n\n- **Name:** Scout\n- **Creature:** Academic owl with reading glasses 🦉\n- **Vibe:** Nerdy enthusiasm, citation-obsessed, \"did you see this paper?!\"\n- **Emoji:** 🔬\n- **Catchphrase:** \"Found something fascinating...\"\n";

const HUGGINGFACE_PAPERS_URL: &str = "https://huggingface.co/papers";
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const MAX_FILE_SIZE: i64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Default)]
pub(crate) struct Paper {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) arxiv_id: String,
    pub(crate) source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) core_rank: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) published_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) abstract_text: String,
}

#[derive(Debug, Serialize)]
struct FetchResult {
    papers: Vec<Paper>,
    total_found: usize,
    query: String,
    timestamp: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

/// Venue → CORE rank table, loaded from an optional CSV in the workspace
/// (`id,rank,short_name,full_name` rows).
#[derive(Default)]
struct CoreRanking {
    rankings: HashMap<String, String>,
}

impl CoreRanking {
    fn load_csv(&mut self, path: &Path) {
        let Ok(data) = fs::read_to_string(path) else {
            return;
        };
        for line in data.lines() {
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() > 3 {
                let rank = cols[1].trim().to_string();
                let short = cols[2].trim().to_lowercase();
                if !short.is_empty() {
                    self.rankings.insert(short, rank.clone());
                }
                let full = cols[3].trim().to_lowercase();
                if !full.is_empty() {
                    self.rankings.insert(full, rank);
                }
            }
        }
    }

    fn rank(&self, venue: &str) -> String {
        if venue.is_empty() {
            return "Unranked".to_string();
        }
        self.rankings
            .get(&venue.to_lowercase())
            .cloned()
            .unwrap_or_else(|| "Unranked".to_string())
    }
}

/// First `NNNN.NNNN[N]` run in the text — the arXiv id grammar.
pub(crate) fn extract_arxiv_id(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let left = i - start;
            if left == 4 && i < chars.len() && chars[i] == '.' {
                let dot = i;
                i += 1;
                let frac_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let right = i - frac_start;
                if (4..=5).contains(&right) {
                    return Some(chars[start..i].iter().collect());
                }
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Remove unsafe characters, keep dots (arXiv ids), cap at 50 chars.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'))
        .collect();
    let underscored = cleaned.replace(' ', "_");
    underscored.chars().take(50).collect()
}

/// Pull `/papers/<arxiv-id>` anchors out of the HuggingFace trending page.
/// The page layout shifts; anchor scanning survives restyles that a CSS
/// selector would not.
pub(crate) fn scan_huggingface_papers(html: &str) -> Vec<Paper> {
    let mut papers = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut rest = html;

    while let Some(pos) = rest.find("href=\"/papers/") {
        rest = &rest[pos + "href=\"/papers/".len()..];
        let Some(quote) = rest.find('"') else { break };
        let candidate = &rest[..quote];
        let Some(arxiv_id) = extract_arxiv_id(candidate) else {
            continue;
        };
        if candidate != arxiv_id || seen.contains(&arxiv_id) {
            continue;
        }
        // Anchor text up to the closing tag is the title.
        let Some(gt) = rest.find('>') else { break };
        let after_tag = &rest[gt + 1..];
        let Some(close) = after_tag.find("</a>") else {
            continue;
        };
        let title = parser::clean_html_text(&after_tag[..close]);
        if title.chars().count() < 10 {
            continue;
        }
        seen.push(arxiv_id.clone());
        papers.push(Paper {
            title,
            url: format!("https://arxiv.org/abs/{arxiv_id}"),
            arxiv_id,
            source: "huggingface".to_string(),
            published_date: "Unknown".to_string(),
            ..Default::default()
        });
        if papers.len() >= 10 {
            break;
        }
    }
    papers
}

fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(15))
        .build()
}

/// Parse an arXiv Atom response into papers.
fn papers_from_atom(xml: &str, cap: usize) -> Vec<Paper> {
    let Ok(entries) = parser::parse_feed_items(xml) else {
        return Vec::new();
    };
    entries
        .into_iter()
        .take(cap)
        .map(|entry| {
            let arxiv_id = extract_arxiv_id(&entry.link).unwrap_or_default();
            let mut abstract_text = entry.description;
            if abstract_text.chars().count() > 500 {
                abstract_text = abstract_text.chars().take(500).collect();
            }
            let published_date = entry
                .published_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            Paper {
                title: entry.title,
                url: entry.link,
                arxiv_id,
                source: "arxiv".to_string(),
                published_date,
                abstract_text,
                ..Default::default()
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ResearchCommand {
    Fetch {
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        timeframe: Option<String>,
        #[serde(default)]
        include_trending: Option<bool>,
    },
    Download {
        #[serde(default)]
        paper_id: Option<String>,
        #[serde(default)]
        paper_title: Option<String>,
        paper_url: String,
    },
    Memory,
}

pub(crate) struct ResearchSkill {
    workspace: PathBuf,
    core: CoreRanking,
}

impl ResearchSkill {
    pub(crate) fn new() -> Self {
        ResearchSkill {
            workspace: PathBuf::new(),
            core: CoreRanking::default(),
        }
    }

    fn fetch_huggingface(&self, topic: &str, timeframe: &str) -> Vec<Paper> {
        let now = Utc::now();
        let mut url = match timeframe {
            "daily" => format!("{HUGGINGFACE_PAPERS_URL}/date/{}", now.format("%Y-%m-%d")),
            "weekly" => format!(
                "{HUGGINGFACE_PAPERS_URL}/week/{}",
                now.format("%Y-W%W")
            ),
            "monthly" => format!("{HUGGINGFACE_PAPERS_URL}/month/{}", now.format("%Y-%m")),
            _ => HUGGINGFACE_PAPERS_URL.to_string(),
        };
        if !topic.is_empty() {
            url.push_str(&format!("?q={}", urlencoding::encode(topic)));
        }

        let response = http_agent()
            .get(&url)
            .set("User-Agent", "Mozilla/5.0 (compatible; ResearchScout/1.0)")
            .call();
        let body = match response {
            Ok(resp) => match resp.into_string() {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("[research] huggingface read: {e}");
                    return Vec::new();
                }
            },
            Err(e) => {
                eprintln!("[research] huggingface fetch: {e}");
                return Vec::new();
            }
        };
        let mut papers = scan_huggingface_papers(&body);

        // Trending cards carry no abstracts; backfill the first few from
        // the arXiv API.
        if !papers.is_empty() && papers[0].abstract_text.is_empty() {
            let ids: Vec<String> = papers
                .iter()
                .take(5)
                .map(|p| p.arxiv_id.clone())
                .collect();
            let backfilled = self.fetch_arxiv_by_ids(&ids);
            for (i, extra) in backfilled.into_iter().enumerate() {
                if let Some(paper) = papers.get_mut(i) {
                    paper.abstract_text = extra.abstract_text;
                    if !extra.title.is_empty() {
                        paper.title = extra.title;
                    }
                    paper.published_date = extra.published_date;
                }
            }
        }
        papers
    }

    fn fetch_arxiv(&self, topic: &str, max_results: usize) -> Vec<Paper> {
        let query = if topic.contains(' ') && !topic.starts_with('"') {
            format!("\"{topic}\"")
        } else {
            topic.to_string()
        };
        let url = format!(
            "{ARXIV_API_URL}?search_query={}&max_results={max_results}",
            urlencoding::encode(&format!("all:{query}"))
        );
        match http_agent().get(&url).call() {
            Ok(resp) => match resp.into_string() {
                Ok(body) => papers_from_atom(&body, max_results),
                Err(e) => {
                    eprintln!("[research] arxiv read: {e}");
                    Vec::new()
                }
            },
            Err(e) => {
                eprintln!("[research] arxiv query: {e}");
                Vec::new()
            }
        }
    }

    fn fetch_arxiv_by_ids(&self, ids: &[String]) -> Vec<Paper> {
        if ids.is_empty() {
            return Vec::new();
        }
        let url = format!(
            "{ARXIV_API_URL}?id_list={}&max_results={}",
            ids.join(","),
            ids.len()
        );
        match http_agent().get(&url).call() {
            Ok(resp) => match resp.into_string() {
                Ok(body) => papers_from_atom(&body, ids.len()),
                Err(_) => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }

    fn fetch(
        &self,
        topic: Option<String>,
        timeframe: Option<String>,
        include_trending: bool,
    ) -> ToolResult {
        let topic = topic.unwrap_or_default();
        let timeframe = timeframe.unwrap_or_else(|| "daily".to_string());

        // arXiv is the primary source; the HuggingFace trending scrape is a
        // supplement, deduplicated by arXiv id.
        let mut papers = self.fetch_arxiv(&topic, 10);

        if include_trending {
            let trending = self.fetch_huggingface(&topic, &timeframe);
            let mut seen: Vec<String> = papers
                .iter()
                .filter(|p| !p.arxiv_id.is_empty())
                .map(|p| p.arxiv_id.clone())
                .collect();
            for paper in trending {
                let key = if paper.arxiv_id.is_empty() {
                    paper.title.clone()
                } else {
                    paper.arxiv_id.clone()
                };
                if !seen.contains(&key) {
                    seen.push(key);
                    papers.push(paper);
                }
            }
        }

        for (i, paper) in papers.iter_mut().enumerate() {
            if paper.id.is_empty() {
                paper.id = (i + 1).to_string();
            }
            if paper.core_rank.is_empty() {
                paper.core_rank = self.core.rank("arxiv");
            }
        }

        self.save_to_memory(&papers, &topic);

        let result = FetchResult {
            total_found: papers.len(),
            query: topic,
            timestamp: Utc::now().to_rfc3339(),
            error: if papers.is_empty() {
                "No papers found".to_string()
            } else {
                String::new()
            },
            papers: papers.clone(),
        };
        let json_data = serde_json::to_string_pretty(&result).unwrap_or_default();
        ToolResult::split(json_data, format_papers_for_user(&papers))
    }

    fn save_to_memory(&self, papers: &[Paper], query: &str) {
        if papers.is_empty() {
            return;
        }
        let Some(parent) = self.workspace.parent() else {
            return;
        };
        let date_key = Utc::now().format("%Y%m%d").to_string();
        let path = parent
            .join("chief")
            .join("memory")
            .join(format!("research-{date_key}.md"));
        let lines: Vec<String> = papers
            .iter()
            .map(|p| {
                let mut date: String = p
                    .published_date
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                if date.len() > 8 {
                    date.truncate(8);
                }
                if date.is_empty() {
                    date = date_key.clone();
                }
                rfc::encode_record("paper", &p.url, &p.title, query, &date)
            })
            .collect();
        if let Err(e) = rfc::write_file(&path, "research", "24h", &lines) {
            eprintln!("[research] RFC cache write failed: {e}");
        }

        // Accumulated findings for the `memory` command.
        let own_memory = self.workspace.join("memory").join("research-papers.md");
        let mut log = fs::read_to_string(&own_memory).unwrap_or_default();
        log.push_str(&format!(
            "\n## {} — {}\n{}\n",
            Utc::now().format("%Y-%m-%d %H:%M"),
            if query.is_empty() { "trending" } else { query },
            papers
                .iter()
                .map(|p| format!("- {} ({})", p.title, p.url))
                .collect::<Vec<_>>()
                .join("\n")
        ));
        let _ = fs::write(&own_memory, log);
    }

    fn download(
        &self,
        paper_id: Option<String>,
        paper_title: Option<String>,
        paper_url: &str,
    ) -> ToolResult {
        if paper_url.is_empty() {
            return ToolResult::error("paper_url is required");
        }
        let paper_id = paper_id
            .filter(|s| !s.is_empty())
            .or_else(|| extract_arxiv_id(paper_url))
            .unwrap_or_else(|| "paper".to_string());
        let pdf_url = paper_url.replacen("/abs/", "/pdf/", 1);

        // Size pre-check via HEAD before committing to the transfer.
        if let Ok(resp) = http_agent().head(&pdf_url).call() {
            if let Some(size) = resp
                .header("content-length")
                .and_then(|v| v.parse::<i64>().ok())
            {
                if size > MAX_FILE_SIZE {
                    return ToolResult::split(
                        json!({
                            "status": "error",
                            "message": format!("File too large ({:.1}MB). Limit is 50MB.", size as f64 / 1024.0 / 1024.0),
                            "url": pdf_url,
                        })
                        .to_string(),
                        format!("File too large ({:.1}MB). Limit is 50MB.", size as f64 / 1024.0 / 1024.0),
                    );
                }
            }
        }

        let title = paper_title
            .filter(|s| !s.is_empty())
            .or_else(|| extract_arxiv_id(paper_url));
        let filename = match title {
            Some(t) => format!("{paper_id}_{}.pdf", sanitize_filename(&t)),
            None => format!("{paper_id}.pdf"),
        };
        // Path-traversal guard: keep only the basename.
        let filename = Path::new(&filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("paper.pdf")
            .to_string();
        let target = self.workspace.join(&filename);

        match self.download_file(&pdf_url, &target) {
            Ok(()) => ToolResult::split(
                json!({"status": "success", "file_path": target.display().to_string(), "filename": filename})
                    .to_string(),
                format!("Downloaded: {filename}"),
            ),
            Err(e) => {
                eprintln!("[research] download failed: {e}");
                ToolResult::split(
                    json!({"status": "link_only", "message": "Download failed. Here's the direct link:", "url": pdf_url})
                        .to_string(),
                    format!("Download failed. Here's the direct link:\n{pdf_url}"),
                )
            }
        }
    }

    fn download_file(&self, url: &str, target: &Path) -> Result<(), String> {
        let resp = http_agent()
            .get(url)
            .call()
            .map_err(|e| format!("GET {url}: {e}"))?;
        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_FILE_SIZE as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| format!("read body: {e}"))?;
        if bytes.len() as i64 > MAX_FILE_SIZE {
            return Err("body exceeded 50MB limit".to_string());
        }
        fs::write(target, &bytes).map_err(|e| format!("write {}: {e}", target.display()))
    }

    fn memory(&self) -> ToolResult {
        let path = self.workspace.join("memory").join("research-papers.md");
        match fs::read_to_string(&path) {
            Ok(data) if !data.trim().is_empty() => ToolResult::text(data),
            _ => ToolResult::split("No memory found", "No research papers in memory yet."),
        }
    }
}

fn format_papers_for_user(papers: &[Paper]) -> String {
    if papers.is_empty() {
        return "No papers found.".to_string();
    }
    let mut out = format!("Found **{}** papers:\n\n", papers.len());
    for (i, p) in papers.iter().take(5).enumerate() {
        out.push_str(&format!(
            "{}. **{}** (Rank: {} | Source: {} | Date: {})\n",
            i + 1,
            p.title,
            p.core_rank,
            p.source,
            p.published_date
        ));
        if !p.abstract_text.is_empty() {
            out.push_str(&format!("   Abstract: {}\n", p.abstract_text));
        }
        out.push_str(&format!("   📄 {}\n\n", p.url));
    }
    out.push_str("Would you like me to download any of these?");
    out
}

impl Skill for ResearchSkill {
    fn name(&self) -> &'static str {
        "research"
    }

    fn description(&self) -> String {
        "Research Scout - Discover trending papers from HuggingFace and ArXiv with CORE ranking.\n\nUse this tool to:\n1. Find papers on any topic (e.g., \"Find papers on LLM optimization\")\n2. Discover SOTA for a task (e.g., \"What's SOTA for object detection?\")\n3. Get daily/weekly trending papers\n4. Download specific papers\n\nCommands:\n- fetch: Search for papers by topic\n- download: Download a specific paper by URL\n- memory: Check what papers were found previously".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute: fetch, download, or memory",
                    "enum": ["fetch", "download", "memory"]
                },
                "topic": {
                    "type": "string",
                    "description": "Topic to search for (for fetch command)"
                },
                "timeframe": {
                    "type": "string",
                    "description": "Timeframe for trending papers",
                    "enum": ["daily", "weekly", "monthly", "search"],
                    "default": "daily"
                },
                "include_trending": {
                    "type": "boolean",
                    "description": "Also scrape HuggingFace trending papers as a supplement",
                    "default": false
                },
                "paper_id": {
                    "type": "string",
                    "description": "Paper ID to download (for download command)"
                },
                "paper_title": {
                    "type": "string",
                    "description": "Paper title (for download command)"
                },
                "paper_url": {
                    "type": "string",
                    "description": "Paper URL (for download command)"
                }
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&mut self, workspace: &Path) {
        self.workspace = workspace.to_path_buf();
        init_workspace(workspace, IDENTITY);
        self.core.load_csv(&workspace.join("core-rankings.csv"));
    }

    fn execute(&self, args: &Value) -> ToolResult {
        let command: ResearchCommand = match decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            ResearchCommand::Fetch {
                topic,
                timeframe,
                include_trending,
            } => self.fetch(topic, timeframe, include_trending.unwrap_or(false)),
            ResearchCommand::Download {
                paper_id,
                paper_title,
                paper_url,
            } => self.download(paper_id, paper_title, &paper_url),
            ResearchCommand::Memory => self.memory(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
