use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use claude_usage_statusline::{
    models::{ModelKind, Tier, UsageSnapshot, UserConfig},
    services::{
        event_log::JsonlEventLog,
        git_status::{GitStatusCache, SystemGitProbe},
        model_resolver::{default_settings_path, resolve_model},
        usage_tracker::UsageTracker,
    },
    ui,
};
use std::path::{Path, PathBuf};

/// Version string carrying the metadata emitted by build.rs
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (build ",
    env!("CLAUDE_USAGE_STATUSLINE_BUILD_ID"),
    ", ",
    env!("CLAUDE_USAGE_STATUSLINE_BUILD_TIME"),
    ")"
);

#[derive(Parser)]
#[command(name = "claude-usage-statusline")]
#[command(about = "Renders a Claude Code usage status line against subscription quotas")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a detailed usage breakdown
    Status,
    /// Configure tier and display settings
    Config {
        /// Set subscription tier (free, pro, max_5x, max_20x)
        #[arg(long)]
        tier: Option<String>,
        /// Set default model label (sonnet or opus)
        #[arg(long)]
        default_model: Option<String>,
        /// Show the git field in the status line
        #[arg(long = "show-git", overrides_with = "no_git")]
        show_git: bool,
        /// Hide the git field from the status line
        #[arg(long = "no-git", overrides_with = "show_git")]
        no_git: bool,
        /// Set git cache duration in seconds
        #[arg(long)]
        git_cache_duration: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr; stdout is reserved for the status line
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();

    // The consumer is a status-line slot, not a tty
    colored::control::set_override(true);

    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claude-usage-statusline");
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        log::warn!("Could not create data directory {:?}: {}", data_dir, e);
    }

    let config = load_or_create_config(&data_dir).unwrap_or_else(|e| {
        log::warn!("Could not load configuration: {}; using defaults", e);
        UserConfig::default()
    });

    match cli.command {
        Some(Commands::Status) => show_status(&config),
        Some(Commands::Config {
            tier,
            default_model,
            show_git,
            no_git,
            git_cache_duration,
        }) => {
            let git_toggle = git_field_toggle(show_git, no_git);
            configure(&data_dir, config, tier, default_model, git_toggle, git_cache_duration)
        }
        None => {
            let project_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let project_name = project_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            // A failed render still prints a minimal line and exits 0; the
            // surrounding tool integration needs output on every invocation
            if let Err(e) = render_status_line(&config, &data_dir, &project_path, &project_name) {
                log::warn!("Status line render failed: {}", e);
                println!("📁 {}", project_name);
            }
            Ok(())
        }
    }
}

/// One synchronous render pass: read the log, aggregate usage, look up git
/// status through the cache, resolve the model, print one line.
fn render_status_line(
    config: &UserConfig,
    data_dir: &Path,
    project_path: &Path,
    project_name: &str,
) -> Result<()> {
    let now = Utc::now();

    let snapshot = match JsonlEventLog::new() {
        Ok(event_log) => UsageTracker::new(event_log).snapshot(now),
        Err(e) => {
            log::warn!("Could not open usage event log: {}; showing zero usage", e);
            UsageSnapshot::empty(now)
        }
    };

    let git_field = if config.show_git_info {
        let mut cache = GitStatusCache::new(
            SystemGitProbe,
            config.git_cache_duration_secs,
            Some(data_dir.join("git_cache.json")),
        );
        ui::format_git_info(&cache.get(project_path, now))
    } else {
        None
    };

    let env_model = std::env::var("CLAUDE_MODEL").ok();
    let model = resolve_model(
        env_model.as_deref(),
        &default_settings_path(),
        &snapshot,
        config.default_model,
    );

    println!(
        "{}",
        ui::render_status_line(project_name, git_field, model, &snapshot, config, now)
    );
    Ok(())
}

fn show_status(config: &UserConfig) -> Result<()> {
    let now = Utc::now();
    let snapshot = match JsonlEventLog::new() {
        Ok(event_log) => UsageTracker::new(event_log).snapshot(now),
        Err(e) => {
            log::warn!("Could not open usage event log: {}", e);
            UsageSnapshot::empty(now)
        }
    };
    let limits = config.limits();

    println!("📊 Claude Usage Status:");
    // GIT_HASH is only emitted when build.rs finds a git checkout
    match option_env!("CLAUDE_USAGE_STATUSLINE_GIT_HASH") {
        Some(revision) => println!("  Build: {} @ {}", LONG_VERSION, revision),
        None => println!("  Build: {}", LONG_VERSION),
    }
    println!("  Tier: {}", config.tier);
    println!(
        "  5h cycle: {} / {} prompts ({}%)",
        snapshot.current_5h_prompts,
        limits.cycle_5h_max,
        ui::usage_percentage(snapshot.current_5h_prompts as f64, limits.cycle_5h_max as f64)
    );
    println!(
        "  Cycle started: {}",
        humantime::format_rfc3339(snapshot.current_5h_start.into())
    );
    println!(
        "  Weekly Sonnet: {:.1}h / {:.0}h",
        snapshot.weekly_sonnet_hours, limits.weekly_sonnet_max
    );
    if let Some(opus_max) = limits.weekly_opus_max {
        println!(
            "  Weekly Opus: {:.1}h / {:.0}h",
            snapshot.weekly_opus_hours, opus_max
        );
    }

    if snapshot.sessions.is_empty() {
        println!("  No sessions recorded");
        return Ok(());
    }

    println!("  Recent sessions:");
    for session in snapshot.sessions.iter().rev().take(5) {
        println!(
            "    {} | {:.1}h | {} prompts | S:{} O:{}",
            humantime::format_rfc3339(session.start.into()),
            session.duration_hours(),
            session.prompt_count,
            session.sonnet_responses,
            session.opus_responses
        );
    }

    Ok(())
}

fn configure(
    data_dir: &Path,
    mut config: UserConfig,
    tier: Option<String>,
    default_model: Option<String>,
    show_git: Option<bool>,
    git_cache_duration: Option<u64>,
) -> Result<()> {
    if let Some(tier_str) = tier {
        config.tier = tier_str.parse::<Tier>()?;
        println!("✅ Set tier to: {}", config.tier);
    }

    if let Some(model_str) = default_model {
        config.default_model = ModelKind::from_label(&model_str).ok_or_else(|| {
            anyhow::anyhow!("Invalid model: {}. Use 'sonnet' or 'opus'", model_str)
        })?;
        println!("✅ Set default model to: {}", config.default_model);
    }

    if let Some(show) = show_git {
        config.show_git_info = show;
        println!("✅ Set git field display to: {}", show);
    }

    if let Some(duration) = git_cache_duration {
        config.git_cache_duration_secs = duration.max(1);
        println!(
            "✅ Set git cache duration to: {} seconds",
            config.git_cache_duration_secs
        );
    }

    save_config(data_dir, &config)?;
    Ok(())
}

/// Collapse the --show-git/--no-git flag pair into one optional setting;
/// clap guarantees at most one survives parsing
fn git_field_toggle(show_git: bool, no_git: bool) -> Option<bool> {
    if show_git {
        Some(true)
    } else if no_git {
        Some(false)
    } else {
        None
    }
}

fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

fn load_or_create_config(data_dir: &Path) -> Result<UserConfig> {
    let path = config_path(data_dir);

    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        let config = UserConfig::default();
        save_config(data_dir, &config)?;
        Ok(config)
    }
}

fn save_config(data_dir: &Path, config: &UserConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path(data_dir), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_long_version_carries_build_metadata() {
        assert!(LONG_VERSION.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(LONG_VERSION.contains(env!("CLAUDE_USAGE_STATUSLINE_BUILD_ID")));
    }

    #[test]
    fn test_git_toggle_flags() {
        let parse = |argv: &[&str]| {
            let cli = Cli::try_parse_from(argv).unwrap();
            match cli.command {
                Some(Commands::Config { show_git, no_git, .. }) => {
                    git_field_toggle(show_git, no_git)
                }
                _ => panic!("expected config subcommand"),
            }
        };

        assert_eq!(parse(&["claude-usage-statusline", "config"]), None);
        assert_eq!(
            parse(&["claude-usage-statusline", "config", "--show-git"]),
            Some(true)
        );
        assert_eq!(
            parse(&["claude-usage-statusline", "config", "--no-git"]),
            Some(false)
        );
        // Later flag wins when both appear
        assert_eq!(
            parse(&["claude-usage-statusline", "config", "--show-git", "--no-git"]),
            Some(false)
        );
        assert_eq!(
            parse(&["claude-usage-statusline", "config", "--no-git", "--show-git"]),
            Some(true)
        );
    }

    #[test]
    fn test_show_git_takes_no_value() {
        assert!(
            Cli::try_parse_from(["claude-usage-statusline", "config", "--show-git", "true"])
                .is_err()
        );
    }
}
