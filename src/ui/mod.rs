use crate::models::{ModelKind, TierLimits, UsageSnapshot, UserConfig};
use crate::services::git_status::GitStatus;
use crate::services::GitLookup;
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;

/// Discrete severity palette. Thresholds: green below 50%, yellow below 75%,
/// soft red from 75% up. Monotonic in percentage by construction.
const COLOR_OK: (u8, u8, u8) = (0, 255, 0);
const COLOR_WARN: (u8, u8, u8) = (255, 255, 0);
const COLOR_HOT: (u8, u8, u8) = (255, 150, 150);

const GIT_COLOR_DIRTY: (u8, u8, u8) = (255, 215, 0);
const GIT_COLOR_AHEAD: (u8, u8, u8) = (100, 150, 255);
const GIT_COLOR_BEHIND: (u8, u8, u8) = (255, 165, 0);
const GIT_COLOR_CLEAN: (u8, u8, u8) = (0, 255, 0);

const MAX_BRANCH_LENGTH: usize = 20;

/// Percentage used, rounded; a missing or zero limit reads as 0% rather than
/// dividing by zero
pub fn usage_percentage(used: f64, max: f64) -> u32 {
    if max > 0.0 {
        (used / max * 100.0).round().max(0.0) as u32
    } else {
        0
    }
}

/// Severity color for a (used, limit) pair
pub fn usage_color(used: f64, max: f64) -> (u8, u8, u8) {
    let percentage = usage_percentage(used, max);
    if percentage < 50 {
        COLOR_OK
    } else if percentage < 75 {
        COLOR_WARN
    } else {
        COLOR_HOT
    }
}

/// Human-readable time left in the cycle: "2h15m", "45m", or "resetting..."
/// once the cycle end has passed
pub fn format_time_remaining(seconds: i64) -> String {
    if seconds <= 0 {
        return "resetting...".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

fn paint(text: &str, (r, g, b): (u8, u8, u8)) -> String {
    text.truecolor(r, g, b).to_string()
}

/// Compact git field: branch name plus ahead/behind and dirtiness markers.
/// Returns None for non-repositories and failed lookups so the field is
/// simply omitted.
pub fn format_git_info(lookup: &GitLookup) -> Option<String> {
    let status = match lookup {
        GitLookup::Hit(status) => status,
        GitLookup::Miss | GitLookup::Failed => return None,
    };

    if status.branch.is_empty() {
        return None;
    }

    // Truncate by characters, not bytes; branch names are not always ASCII
    let mut text = if status.branch.chars().count() > MAX_BRANCH_LENGTH {
        let kept: String = status.branch.chars().take(MAX_BRANCH_LENGTH - 3).collect();
        format!("{}...", kept)
    } else {
        status.branch.clone()
    };
    if status.ahead > 0 {
        text.push_str(&format!("↑{}", status.ahead));
    }
    if status.behind > 0 {
        text.push_str(&format!("↓{}", status.behind));
    }
    if status.has_staged || status.has_modified {
        text.push('*');
    }
    if status.has_untracked {
        text.push('?');
    }

    Some(paint(&format!("🌿 {}", text), git_color(status)))
}

fn git_color(status: &GitStatus) -> (u8, u8, u8) {
    if status.is_dirty() {
        GIT_COLOR_DIRTY
    } else if status.ahead > 0 {
        GIT_COLOR_AHEAD
    } else if status.behind > 0 {
        GIT_COLOR_BEHIND
    } else {
        GIT_COLOR_CLEAN
    }
}

/// Assemble the status line: project, optional git field, current model,
/// colored cycle usage, colored weekly figure(s) per tier, and time left in
/// the cycle, pipe-separated.
pub fn render_status_line(
    project_name: &str,
    git_field: Option<String>,
    model: ModelKind,
    snapshot: &UsageSnapshot,
    config: &UserConfig,
    now: DateTime<Utc>,
) -> String {
    let limits = config.limits();
    let mut parts = Vec::new();

    parts.push(format!("📁 {}", project_name));

    if let Some(git) = git_field {
        parts.push(git);
    }

    parts.push(format!("🤖 {}", model.display_label()));

    parts.push(cycle_field(snapshot, &limits));
    parts.extend(weekly_fields(snapshot, &limits, config));

    let cycle_end = snapshot.current_5h_start + Duration::hours(5);
    let remaining = cycle_end.signed_duration_since(now).num_seconds();
    parts.push(format!("🔄 {}", format_time_remaining(remaining)));

    parts.join(" | ")
}

fn cycle_field(snapshot: &UsageSnapshot, limits: &TierLimits) -> String {
    let used = snapshot.current_5h_prompts as f64;
    let max = limits.cycle_5h_max as f64;
    let text = format!(
        "⚡{}/{}p ({}%)",
        snapshot.current_5h_prompts,
        limits.cycle_5h_max,
        usage_percentage(used, max)
    );
    paint(&text, usage_color(used, max))
}

fn weekly_fields(
    snapshot: &UsageSnapshot,
    limits: &TierLimits,
    config: &UserConfig,
) -> Vec<String> {
    if config.tier.shows_opus() {
        let opus_max = limits.weekly_opus_max.unwrap_or(0.0);
        let sonnet = format!(
            "📅 S4: {:.1}h/{:.0}h",
            snapshot.weekly_sonnet_hours, limits.weekly_sonnet_max
        );
        let opus = format!(
            "O4: {:.1}h/{:.0}h",
            snapshot.weekly_opus_hours, opus_max
        );
        vec![
            paint(
                &sonnet,
                usage_color(snapshot.weekly_sonnet_hours, limits.weekly_sonnet_max),
            ),
            paint(&opus, usage_color(snapshot.weekly_opus_hours, opus_max)),
        ]
    } else {
        let sonnet = format!(
            "📅 {:.1}h/{:.0}h",
            snapshot.weekly_sonnet_hours, limits.weekly_sonnet_max
        );
        vec![paint(
            &sonnet,
            usage_color(snapshot.weekly_sonnet_hours, limits.weekly_sonnet_max),
        )]
    }
}
