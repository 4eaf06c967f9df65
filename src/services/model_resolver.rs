use crate::models::{ModelKind, UsageSnapshot};
use std::path::Path;

/// Resolve the model to display, trying detection sources in order until one
/// yields a match:
///
/// 1. environment override (`CLAUDE_MODEL`), matched by substring;
/// 2. the `model` field of the user settings file;
/// 3. the dominant model of the most recent session;
/// 4. the configured default.
///
/// Sources are passed in rather than read here so callers (and tests) control
/// the environment.
pub fn resolve_model(
    env_override: Option<&str>,
    settings_path: &Path,
    snapshot: &UsageSnapshot,
    default: ModelKind,
) -> ModelKind {
    from_env(env_override)
        .or_else(|| from_settings_file(settings_path))
        .or_else(|| from_recent_session(snapshot))
        .unwrap_or(default)
}

/// Default location of the Claude Code settings file
pub fn default_settings_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".claude")
        .join("settings.json")
}

fn from_env(env_override: Option<&str>) -> Option<ModelKind> {
    env_override.and_then(ModelKind::from_label)
}

/// Read the `model` field from settings JSON. Missing or malformed files are
/// treated as "no match" so the next strategy runs.
fn from_settings_file(path: &Path) -> Option<ModelKind> {
    let content = std::fs::read_to_string(path).ok()?;
    let settings: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("Ignoring malformed settings file {:?}: {}", path, e);
            return None;
        }
    };

    settings
        .get("model")
        .and_then(|v| v.as_str())
        .and_then(ModelKind::from_label)
}

fn from_recent_session(snapshot: &UsageSnapshot) -> Option<ModelKind> {
    snapshot.sessions.last().and_then(|s| s.dominant_model())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use tempfile::TempDir;

    fn snapshot_with_session(sonnet: u32, opus: u32) -> UsageSnapshot {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        UsageSnapshot {
            current_5h_start: t,
            current_5h_prompts: 0,
            weekly_sonnet_hours: 0.0,
            weekly_opus_hours: 0.0,
            sessions: vec![Session {
                start: t,
                end: t + chrono::Duration::hours(1),
                prompt_count: 1,
                sonnet_responses: sonnet,
                opus_responses: opus,
            }],
        }
    }

    fn write_settings(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_env_override_wins_over_everything() {
        let temp = TempDir::new().unwrap();
        let settings = write_settings(&temp, r#"{"model":"claude-sonnet-4"}"#);
        let snapshot = snapshot_with_session(10, 0);

        let model = resolve_model(
            Some("claude-opus-4"),
            &settings,
            &snapshot,
            ModelKind::Sonnet,
        );
        assert_eq!(model, ModelKind::Opus);
    }

    #[test]
    fn test_unrecognized_env_falls_through() {
        let temp = TempDir::new().unwrap();
        let settings = write_settings(&temp, r#"{"model":"opus"}"#);
        let snapshot = snapshot_with_session(0, 0);

        let model = resolve_model(Some("haiku"), &settings, &snapshot, ModelKind::Sonnet);
        assert_eq!(model, ModelKind::Opus);
    }

    #[test]
    fn test_settings_file_used_when_no_env() {
        let temp = TempDir::new().unwrap();
        let settings = write_settings(&temp, r#"{"model":"claude-opus-4-20250514"}"#);
        let snapshot = snapshot_with_session(10, 0);

        let model = resolve_model(None, &settings, &snapshot, ModelKind::Sonnet);
        assert_eq!(model, ModelKind::Opus);
    }

    #[test]
    fn test_malformed_settings_fall_through_to_session() {
        let temp = TempDir::new().unwrap();
        let settings = write_settings(&temp, "{not json");
        let snapshot = snapshot_with_session(1, 5);

        let model = resolve_model(None, &settings, &snapshot, ModelKind::Sonnet);
        assert_eq!(model, ModelKind::Opus);
    }

    #[test]
    fn test_missing_settings_fall_through_to_session() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.json");
        let snapshot = snapshot_with_session(1, 5);

        let model = resolve_model(None, &missing, &snapshot, ModelKind::Sonnet);
        assert_eq!(model, ModelKind::Opus);
    }

    #[test]
    fn test_tie_and_empty_data_use_default() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.json");

        let tied = snapshot_with_session(3, 3);
        assert_eq!(
            resolve_model(None, &missing, &tied, ModelKind::Sonnet),
            ModelKind::Sonnet
        );

        let empty = UsageSnapshot::empty(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(
            resolve_model(None, &missing, &empty, ModelKind::Opus),
            ModelKind::Opus
        );
    }
}
