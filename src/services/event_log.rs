use super::EventSource;
use crate::models::{ModelKind, UsageEvent};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// JSONL-backed usage event log.
///
/// Reads the conversation transcripts Claude Code writes under its projects
/// directories and reduces each record to a prompt or response event.
pub struct JsonlEventLog {
    data_paths: Vec<PathBuf>,
}

impl JsonlEventLog {
    pub fn new() -> Result<Self> {
        let data_paths = Self::discover_claude_paths()?;

        if data_paths.is_empty() {
            log::warn!("No Claude data directories found; usage will read as zero");
        } else {
            log::debug!("Found Claude data paths: {:?}", data_paths);
        }

        Ok(Self { data_paths })
    }

    /// Log rooted at explicit directories (used by tests)
    pub fn with_paths(data_paths: Vec<PathBuf>) -> Self {
        Self { data_paths }
    }

    /// Discover Claude data directories based on standard locations
    pub fn discover_claude_paths() -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;

        // Environment overrides take priority over the standard locations
        if let Ok(env_paths) = std::env::var("CLAUDE_DATA_PATHS") {
            for path_str in env_paths.split(':') {
                paths.push(PathBuf::from(path_str));
            }
        }

        if let Ok(env_path) = std::env::var("CLAUDE_DATA_PATH") {
            paths.push(PathBuf::from(env_path));
        }

        paths.push(home_dir.join(".claude").join("projects"));
        paths.push(home_dir.join(".config").join("claude").join("projects"));

        let existing_paths: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| path.is_dir())
            .collect();

        Ok(existing_paths)
    }

    fn scan_events(&self) -> Result<Vec<UsageEvent>> {
        let mut all_events = Vec::new();

        for data_path in &self.data_paths {
            log::debug!("Scanning directory: {:?}", data_path);

            for entry in WalkDir::new(data_path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().map_or(false, |ext| ext == "jsonl"))
            {
                let file_path = entry.path();

                match parse_jsonl_file(file_path) {
                    Ok(mut events) => all_events.append(&mut events),
                    Err(e) => {
                        log::warn!("Failed to parse JSONL file {:?}: {}", file_path, e);
                    }
                }
            }
        }

        all_events.sort_by_key(|e| e.timestamp);
        log::debug!("Loaded {} usage events from JSONL files", all_events.len());
        Ok(all_events)
    }
}

impl EventSource for JsonlEventLog {
    fn all_events(&self) -> Result<Vec<UsageEvent>> {
        self.scan_events()
    }
}

/// Parse a single JSONL transcript file into usage events.
///
/// Invalid lines are skipped; records that are neither external user prompts
/// nor assistant responses are ignored.
fn parse_jsonl_file(file_path: &Path) -> Result<Vec<UsageEvent>> {
    let content = std::fs::read_to_string(file_path)?;
    let mut events = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(json) => {
                if let Some(event) = parse_event(&json) {
                    events.push(event);
                }
            }
            Err(e) => {
                log::debug!(
                    "Skipping invalid JSON line {} in {:?}: {}",
                    line_num + 1,
                    file_path,
                    e
                );
            }
        }
    }

    Ok(events)
}

/// Reduce one transcript record to a usage event, if it represents one
fn parse_event(json: &serde_json::Value) -> Option<UsageEvent> {
    let timestamp = parse_timestamp(json.get("timestamp")?.as_str()?)?;

    match json.get("type").and_then(|v| v.as_str()) {
        Some("user") => {
            if !is_external_prompt(json) {
                return None;
            }
            Some(UsageEvent::prompt(timestamp))
        }
        Some("assistant") => {
            let model_str = json
                .get("message")
                .and_then(|m| m.get("model"))
                .and_then(|v| v.as_str())?;
            let model = ModelKind::from_label(model_str)?;
            Some(UsageEvent::response(timestamp, model))
        }
        _ => None,
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A prompt counts only when it is a real external user message: not meta,
/// not a slash-command echo, with non-empty content.
fn is_external_prompt(json: &serde_json::Value) -> bool {
    if json.get("isMeta").and_then(|v| v.as_bool()).unwrap_or(false) {
        return false;
    }

    if json.get("userType").and_then(|v| v.as_str()) != Some("external") {
        return false;
    }

    let message = match json.get("message") {
        Some(m) => m,
        None => return false,
    };

    if message.get("role").and_then(|v| v.as_str()) != Some("user") {
        return false;
    }

    match message.get("content") {
        Some(content) => has_real_content(content),
        None => false,
    }
}

fn has_real_content(content: &serde_json::Value) -> bool {
    match content {
        serde_json::Value::String(s) => !s.is_empty() && !is_command_text(s),
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return false;
            }
            // Array content like [{"type":"text","text":"..."}]
            !items.iter().any(|item| {
                item.get("type").and_then(|v| v.as_str()) == Some("text")
                    && item
                        .get("text")
                        .and_then(|v| v.as_str())
                        .map_or(false, is_command_text)
            })
        }
        _ => false,
    }
}

fn is_command_text(text: &str) -> bool {
    text.contains("<command-name>") || text.contains("<local-command-stdout>")
}
