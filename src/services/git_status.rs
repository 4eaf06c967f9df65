use super::{GitLookup, GitProbe};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

/// Git repository status information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GitStatus {
    pub branch: String,
    pub ahead: u32,
    pub behind: u32,
    pub has_staged: bool,
    pub has_modified: bool,
    pub has_untracked: bool,
}

impl GitStatus {
    pub fn is_dirty(&self) -> bool {
        self.has_staged || self.has_modified || self.has_untracked
    }
}

/// Persisted cache record: the lookup outcome plus when it was taken
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: GitLookup,
    cached_at: DateTime<Utc>,
}

/// TTL cache in front of a git status probe.
///
/// Entries are keyed by path with independent expiry clocks. Failed lookups
/// are cached like hits so a broken repository does not trigger a probe on
/// every render. When a cache file is configured, entries survive across
/// process invocations; the file is replaced atomically on every update.
pub struct GitStatusCache<P: GitProbe> {
    probe: P,
    cache_duration: Duration,
    cache_path: Option<PathBuf>,
    entries: HashMap<String, CacheEntry>,
}

impl<P: GitProbe> GitStatusCache<P> {
    pub fn new(probe: P, cache_duration_secs: u64, cache_path: Option<PathBuf>) -> Self {
        let entries = cache_path
            .as_deref()
            .map(load_entries)
            .unwrap_or_default();

        Self {
            probe,
            cache_duration: Duration::seconds(cache_duration_secs as i64),
            cache_path,
            entries,
        }
    }

    /// Look up git status for `path`, probing only when no fresh entry exists
    pub fn get(&mut self, path: &Path, now: DateTime<Utc>) -> GitLookup {
        let key = path.to_string_lossy().into_owned();

        if let Some(entry) = self.entries.get(&key) {
            if now.signed_duration_since(entry.cached_at) < self.cache_duration {
                return entry.value.clone();
            }
        }

        let value = self.probe.probe(path);
        self.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                cached_at: now,
            },
        );

        if let Err(e) = self.persist() {
            log::debug!("Could not persist git status cache: {}", e);
        }

        value
    }

    /// Write the cache file via a temp file and rename, so concurrent readers
    /// never observe a partial write
    fn persist(&self) -> Result<()> {
        let path = match &self.cache_path {
            Some(path) => path,
            None => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("writing cache temp file {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("replacing cache file {:?}", path))?;
        Ok(())
    }
}

/// Unreadable or malformed cache state starts over empty
fn load_entries(path: &Path) -> HashMap<String, CacheEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return HashMap::new(),
    };

    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Ignoring malformed git cache {:?}: {}", path, e);
            HashMap::new()
        }
    }
}

/// Probe that shells out to the `git` binary
pub struct SystemGitProbe;

impl GitProbe for SystemGitProbe {
    fn probe(&self, path: &Path) -> GitLookup {
        let inside = match run_git(path, &["rev-parse", "--is-inside-work-tree"]) {
            Some(output) => output,
            // git missing or the command errored outright
            None => return GitLookup::Failed,
        };

        if inside.trim() != "true" {
            return GitLookup::Miss;
        }

        let branch = match branch_name(path) {
            Some(branch) => branch,
            None => return GitLookup::Failed,
        };

        let mut status = GitStatus {
            branch,
            ..Default::default()
        };

        if let Some(output) = run_git(path, &["status", "--porcelain=v1"]) {
            apply_working_tree_status(&mut status, &output);
        }

        // Ahead/behind only makes sense on a real branch with an upstream
        if !status.branch.starts_with('(') {
            if let Some(output) = run_git(
                path,
                &["rev-list", "--left-right", "--count", "@{upstream}...HEAD"],
            ) {
                let parts: Vec<&str> = output.split_whitespace().collect();
                if parts.len() == 2 {
                    status.behind = parts[0].parse().unwrap_or(0);
                    status.ahead = parts[1].parse().unwrap_or(0);
                }
            }
        }

        GitLookup::Hit(status)
    }
}

/// A hung git command (network mount, slow hook) must not stall the render
const GIT_COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

fn run_git(path: &Path, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(path);
    run_command(cmd, GIT_COMMAND_TIMEOUT)
}

/// Run a command with a deadline, killing the child on expiry.
///
/// Stdout is drained on a helper thread so a chatty child cannot deadlock on
/// a full pipe while we poll for exit.
fn run_command(mut cmd: Command, timeout: std::time::Duration) -> Option<String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut stdout, &mut buf).ok();
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                log::debug!("Command {:?} exceeded {:?}; killing", cmd, timeout);
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return None;
            }
            Ok(None) => std::thread::sleep(std::time::Duration::from_millis(10)),
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return None;
            }
        }
    };

    let output = reader.join().ok()?;
    if status.success() {
        Some(output.trim().to_string())
    } else {
        None
    }
}

fn branch_name(path: &Path) -> Option<String> {
    if let Some(branch) = run_git(path, &["symbolic-ref", "--short", "HEAD"]) {
        return Some(branch);
    }

    // Detached HEAD: show the short commit hash in parentheses
    run_git(path, &["rev-parse", "--short", "HEAD"]).map(|commit| format!("({})", commit))
}

/// Porcelain v1 lines are `XY filename`: X is the staged column, Y the
/// working tree column.
fn apply_working_tree_status(status: &mut GitStatus, output: &str) {
    for line in output.lines() {
        let mut chars = line.chars();
        let staged = chars.next().unwrap_or(' ');
        let working = chars.next().unwrap_or(' ');

        if staged == '?' || working == '?' {
            status.has_untracked = true;
            continue;
        }

        if staged != ' ' {
            status.has_staged = true;
        }
        if working != ' ' {
            status.has_modified = true;
        }
    }
}
