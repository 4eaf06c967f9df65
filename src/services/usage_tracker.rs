use super::EventSource;
use crate::models::{EventKind, ModelKind, Session, UsageEvent, UsageSnapshot};
use chrono::{DateTime, Duration, Utc};

/// Length of the rolling prompt-quota cycle
const CYCLE_HOURS: i64 = 5;

/// Inactivity gap that starts a new session; matches the 5-hour block
/// convention used by the quota cycle
const SESSION_GAP_HOURS: i64 = 5;

/// Trailing window for weekly per-model hour totals
const WEEKLY_WINDOW_DAYS: i64 = 7;

/// Usage accounting over an event log.
///
/// Every query is a pure function of the log contents and the supplied `now`;
/// nothing is cached between calls.
pub struct UsageTracker<S: EventSource> {
    source: S,
}

impl<S: EventSource> UsageTracker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Build a fresh snapshot of cycle and weekly usage.
    ///
    /// An unreadable event log degrades to a zero snapshot rather than
    /// failing; the status line must always render.
    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageSnapshot {
        let events = match self.source.all_events() {
            Ok(events) => events,
            Err(e) => {
                log::warn!("Could not read usage event log: {}; showing zero usage", e);
                return UsageSnapshot::empty(now);
            }
        };

        let sessions = derive_sessions(&events);
        let (current_5h_start, current_5h_prompts) = cycle_window(&sessions, &events, now);
        let (weekly_sonnet_hours, weekly_opus_hours) = weekly_hours(&sessions, now);

        UsageSnapshot {
            current_5h_start,
            current_5h_prompts,
            weekly_sonnet_hours,
            weekly_opus_hours,
            sessions,
        }
    }
}

/// Group chronologically ordered events into sessions separated by
/// inactivity gaps of at least `SESSION_GAP_HOURS`.
pub fn derive_sessions(events: &[UsageEvent]) -> Vec<Session> {
    let gap = Duration::hours(SESSION_GAP_HOURS);
    let mut sessions: Vec<Session> = Vec::new();

    for event in events {
        let start_new = match sessions.last() {
            None => true,
            Some(current) => event.timestamp.signed_duration_since(current.end) >= gap,
        };

        if start_new {
            sessions.push(Session {
                start: event.timestamp,
                end: event.timestamp,
                prompt_count: 0,
                sonnet_responses: 0,
                opus_responses: 0,
            });
        }

        let current = sessions
            .last_mut()
            .expect("session pushed above when list was empty");
        current.end = event.timestamp;

        match event.kind {
            EventKind::Prompt => current.prompt_count += 1,
            EventKind::Response => match event.model {
                Some(ModelKind::Sonnet) => current.sonnet_responses += 1,
                Some(ModelKind::Opus) => current.opus_responses += 1,
                None => {}
            },
        }
    }

    sessions
}

/// Determine the active 5-hour quota window and its prompt count.
///
/// The window is anchored at the most recent session's start when that start
/// lies within 5 hours of `now`; otherwise a fresh window begins at `now`
/// with zero prompts. Prompts are counted over the closed-open interval
/// `[anchor, anchor + 5h)`.
pub fn cycle_window(
    sessions: &[Session],
    events: &[UsageEvent],
    now: DateTime<Utc>,
) -> (DateTime<Utc>, u32) {
    let cycle = Duration::hours(CYCLE_HOURS);

    let anchor = match sessions.last() {
        Some(session) if now.signed_duration_since(session.start) < cycle => session.start,
        _ => return (now, 0),
    };

    let window_end = anchor + cycle;
    let prompts = events
        .iter()
        .filter(|e| e.kind == EventKind::Prompt)
        .filter(|e| e.timestamp >= anchor && e.timestamp < window_end)
        .count() as u32;

    (anchor, prompts)
}

/// Total consumed hours per model over the trailing week ending at `now`.
///
/// Each session contributes only the part of its span inside
/// `[now - 7d, now]`, split between models in proportion to each model's
/// share of the session's responses. Sessions without responses contribute
/// nothing.
pub fn weekly_hours(sessions: &[Session], now: DateTime<Utc>) -> (f64, f64) {
    let week_start = now - Duration::days(WEEKLY_WINDOW_DAYS);

    let mut sonnet_hours = 0.0;
    let mut opus_hours = 0.0;

    for session in sessions {
        let total_responses = session.total_responses();
        if total_responses == 0 {
            continue;
        }

        let overlap_start = session.start.max(week_start);
        let overlap_end = session.end.min(now);
        if overlap_end <= overlap_start {
            continue;
        }

        let overlap = overlap_end
            .signed_duration_since(overlap_start)
            .num_seconds() as f64
            / 3600.0;

        let sonnet_share = session.sonnet_responses as f64 / total_responses as f64;
        let opus_share = session.opus_responses as f64 / total_responses as f64;

        sonnet_hours += overlap * sonnet_share;
        opus_hours += overlap * opus_share;
    }

    (sonnet_hours, opus_hours)
}
