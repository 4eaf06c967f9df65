use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model family a usage event belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Sonnet,
    Opus,
}

impl ModelKind {
    /// Match a free-form model string ("claude-opus-4", "Opus", ...) by substring
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase();
        if lower.contains("opus") {
            Some(ModelKind::Opus)
        } else if lower.contains("sonnet") {
            Some(ModelKind::Sonnet)
        } else {
            None
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            ModelKind::Sonnet => "Sonnet 4",
            ModelKind::Opus => "Opus 4",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_label())
    }
}

/// Kind of usage event recorded in the log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Prompt,
    Response,
}

/// Single usage event from the Claude Code JSONL log.
///
/// Prompt records carry no model name in the log, so `model` is only
/// populated for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub model: Option<ModelKind>,
    pub kind: EventKind,
}

impl UsageEvent {
    pub fn prompt(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            model: None,
            kind: EventKind::Prompt,
        }
    }

    pub fn response(timestamp: DateTime<Utc>, model: ModelKind) -> Self {
        Self {
            timestamp,
            model: Some(model),
            kind: EventKind::Response,
        }
    }
}

/// Contiguous run of usage events bounded by inactivity gaps.
///
/// Derived view over the event log, rebuilt on every query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub prompt_count: u32,
    pub sonnet_responses: u32,
    pub opus_responses: u32,
}

impl Session {
    pub fn duration_hours(&self) -> f64 {
        self.end
            .signed_duration_since(self.start)
            .num_seconds()
            .max(0) as f64
            / 3600.0
    }

    pub fn total_responses(&self) -> u32 {
        self.sonnet_responses + self.opus_responses
    }

    /// Model with strictly more responses in this session, if any
    pub fn dominant_model(&self) -> Option<ModelKind> {
        match self.opus_responses.cmp(&self.sonnet_responses) {
            std::cmp::Ordering::Greater => Some(ModelKind::Opus),
            std::cmp::Ordering::Less => Some(ModelKind::Sonnet),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Result of one usage-aggregation pass over the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub current_5h_start: DateTime<Utc>,
    pub current_5h_prompts: u32,
    pub weekly_sonnet_hours: f64,
    pub weekly_opus_hours: f64,
    /// Sessions in chronological order
    pub sessions: Vec<Session>,
}

impl UsageSnapshot {
    /// Degraded snapshot used when the event log cannot be read
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            current_5h_start: now,
            current_5h_prompts: 0,
            weekly_sonnet_hours: 0.0,
            weekly_opus_hours: 0.0,
            sessions: Vec::new(),
        }
    }
}

/// Claude subscription tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tier {
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "pro")]
    Pro,
    #[serde(rename = "max_5x")]
    Max5x,
    #[serde(rename = "max_20x")]
    Max20x,
}

impl Tier {
    /// Whether the weekly Opus figure is part of this tier's display
    pub fn shows_opus(&self) -> bool {
        matches!(self, Tier::Max5x | Tier::Max20x)
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "max_5x" | "max5x" | "max5" => Ok(Tier::Max5x),
            "max_20x" | "max20x" | "max20" => Ok(Tier::Max20x),
            _ => Err(anyhow::anyhow!(
                "Invalid tier: {}. Use 'free', 'pro', 'max_5x', or 'max_20x'",
                s
            )),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Max5x => "max_5x",
            Tier::Max20x => "max_20x",
        };
        f.write_str(name)
    }
}

/// Quota limits for a subscription tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierLimits {
    pub cycle_5h_max: u32,
    pub weekly_sonnet_max: f64,
    /// Absent for tiers without a separate Opus allowance
    pub weekly_opus_max: Option<f64>,
}

impl TierLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free | Tier::Pro => Self {
                cycle_5h_max: 40,
                weekly_sonnet_max: 80.0,
                weekly_opus_max: None,
            },
            Tier::Max5x => Self {
                cycle_5h_max: 200,
                weekly_sonnet_max: 280.0,
                weekly_opus_max: Some(35.0),
            },
            Tier::Max20x => Self {
                cycle_5h_max: 800,
                weekly_sonnet_max: 480.0,
                weekly_opus_max: Some(40.0),
            },
        }
    }
}

/// User configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default = "default_model")]
    pub default_model: ModelKind,
    #[serde(default = "default_show_git_info")]
    pub show_git_info: bool,
    #[serde(default = "default_git_cache_duration")]
    pub git_cache_duration_secs: u64,
}

fn default_tier() -> Tier {
    Tier::Pro
}

fn default_model() -> ModelKind {
    ModelKind::Sonnet
}

fn default_show_git_info() -> bool {
    true
}

fn default_git_cache_duration() -> u64 {
    5
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            default_model: default_model(),
            show_git_info: default_show_git_info(),
            git_cache_duration_secs: default_git_cache_duration(),
        }
    }
}

impl UserConfig {
    pub fn limits(&self) -> TierLimits {
        TierLimits::for_tier(self.tier)
    }
}
