use chrono::{DateTime, Duration, TimeZone, Utc};
use claude_usage_statusline::models::{ModelKind, Tier, UserConfig};
use claude_usage_statusline::services::event_log::JsonlEventLog;
use claude_usage_statusline::services::model_resolver::resolve_model;
use claude_usage_statusline::services::usage_tracker::UsageTracker;
use claude_usage_statusline::ui;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn prompt_line(ts: DateTime<Utc>) -> String {
    format!(
        r#"{{"type":"user","userType":"external","timestamp":"{}","message":{{"role":"user","content":"do the thing"}}}}"#,
        ts.to_rfc3339()
    )
}

fn response_line(ts: DateTime<Utc>, model: &str) -> String {
    format!(
        r#"{{"type":"assistant","timestamp":"{}","message":{{"role":"assistant","model":"{}"}}}}"#,
        ts.to_rfc3339(),
        model
    )
}

fn write_transcript(root: &Path, project: &str, name: &str, lines: &[String]) {
    let project_dir = root.join(project);
    std::fs::create_dir_all(&project_dir).unwrap();
    let mut file = std::fs::File::create(project_dir.join(name)).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
}

#[test]
fn test_pipeline_recent_session() {
    let temp = TempDir::new().unwrap();
    let now = fixed_now();
    let session_start = now - Duration::hours(2);

    write_transcript(
        temp.path(),
        "-home-user-demo",
        "session.jsonl",
        &[
            prompt_line(session_start),
            response_line(session_start + Duration::minutes(1), "claude-sonnet-4"),
            prompt_line(session_start + Duration::minutes(30)),
            response_line(session_start + Duration::minutes(31), "claude-opus-4"),
            prompt_line(session_start + Duration::minutes(60)),
            response_line(session_start + Duration::minutes(61), "claude-sonnet-4"),
        ],
    );

    let event_log = JsonlEventLog::with_paths(vec![temp.path().to_path_buf()]);
    let snapshot = UsageTracker::new(event_log).snapshot(now);

    assert_eq!(snapshot.current_5h_start, session_start);
    assert_eq!(snapshot.current_5h_prompts, 3);
    assert_eq!(snapshot.sessions.len(), 1);
    assert!(snapshot.weekly_sonnet_hours > 0.0);
    assert!(snapshot.weekly_opus_hours > 0.0);

    colored::control::set_override(false);
    let config = UserConfig {
        tier: Tier::Max5x,
        ..Default::default()
    };
    let line = ui::render_status_line("demo", None, ModelKind::Sonnet, &snapshot, &config, now);

    assert!(line.contains("📁 demo"));
    assert!(line.contains("⚡3/200p"));
    assert!(line.contains("📅 S4:"));
    assert!(line.contains("O4:"));
    assert!(line.contains("🔄 3h0m"));
}

#[test]
fn test_pipeline_empty_log_free_tier() {
    let temp = TempDir::new().unwrap();
    let now = fixed_now();

    let event_log = JsonlEventLog::with_paths(vec![temp.path().to_path_buf()]);
    let snapshot = UsageTracker::new(event_log).snapshot(now);

    assert_eq!(snapshot.current_5h_start, now);
    assert_eq!(snapshot.current_5h_prompts, 0);
    assert_eq!(snapshot.weekly_sonnet_hours, 0.0);

    colored::control::set_override(false);
    let config = UserConfig {
        tier: Tier::Free,
        ..Default::default()
    };
    let line = ui::render_status_line("demo", None, ModelKind::Sonnet, &snapshot, &config, now);

    assert!(line.contains("⚡0/40p (0%)"));
    assert!(line.contains("📅 0.0h/80h"));
    assert!(!line.contains("O4:"));
}

#[test]
fn test_pipeline_sessions_across_projects_and_gaps() {
    let temp = TempDir::new().unwrap();
    let now = fixed_now();

    // One session yesterday, one active now, in different projects
    write_transcript(
        temp.path(),
        "-home-user-alpha",
        "old.jsonl",
        &[
            prompt_line(now - Duration::hours(26)),
            response_line(now - Duration::hours(25), "claude-sonnet-4"),
        ],
    );
    write_transcript(
        temp.path(),
        "-home-user-beta",
        "recent.jsonl",
        &[
            prompt_line(now - Duration::hours(1)),
            response_line(now - Duration::minutes(59), "claude-opus-4"),
        ],
    );

    let event_log = JsonlEventLog::with_paths(vec![temp.path().to_path_buf()]);
    let snapshot = UsageTracker::new(event_log).snapshot(now);

    assert_eq!(snapshot.sessions.len(), 2);
    assert_eq!(snapshot.current_5h_start, now - Duration::hours(1));
    assert_eq!(snapshot.current_5h_prompts, 1);
}

#[test]
fn test_model_resolution_from_opus_majority_session() {
    let temp = TempDir::new().unwrap();
    let now = fixed_now();
    let start = now - Duration::hours(1);

    let mut lines = vec![prompt_line(start)];
    for i in 0..5 {
        lines.push(response_line(start + Duration::minutes(i + 1), "claude-opus-4"));
    }
    lines.push(response_line(start + Duration::minutes(10), "claude-sonnet-4"));
    write_transcript(temp.path(), "-home-user-demo", "session.jsonl", &lines);

    let event_log = JsonlEventLog::with_paths(vec![temp.path().to_path_buf()]);
    let snapshot = UsageTracker::new(event_log).snapshot(now);

    // No env override, no settings file: falls through to session analysis
    let missing_settings = temp.path().join("settings.json");
    let model = resolve_model(None, &missing_settings, &snapshot, ModelKind::Sonnet);
    assert_eq!(model, ModelKind::Opus);

    // Env override still wins over the opus-majority session
    let model = resolve_model(
        Some("claude-sonnet-4"),
        &missing_settings,
        &snapshot,
        ModelKind::Opus,
    );
    assert_eq!(model, ModelKind::Sonnet);
}

#[test]
fn test_config_round_trip() {
    let config = UserConfig {
        tier: Tier::Max20x,
        default_model: ModelKind::Opus,
        show_git_info: false,
        git_cache_duration_secs: 30,
    };

    let json = serde_json::to_string_pretty(&config).unwrap();
    let loaded: UserConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(loaded.tier, Tier::Max20x);
    assert_eq!(loaded.default_model, ModelKind::Opus);
    assert!(!loaded.show_git_info);
    assert_eq!(loaded.git_cache_duration_secs, 30);
}

#[test]
fn test_config_tolerates_missing_fields() {
    let loaded: UserConfig = serde_json::from_str(r#"{"tier":"max_5x"}"#).unwrap();
    assert_eq!(loaded.tier, Tier::Max5x);
    assert_eq!(loaded.default_model, ModelKind::Sonnet);
    assert!(loaded.show_git_info);
}
