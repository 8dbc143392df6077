use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use uuid::Uuid;
use yansi::Paint;

use crate::events::Listeners;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOptions {
    pub name: String,
    /// Total amount of work; 0 means unknown.
    pub limit: u64,
    /// Starting count.
    pub progress: u64,
    pub message: Option<String>,
    /// Minimum gap between two update notifications.
    pub update_interval: Duration,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            limit: 0,
            progress: 0,
            message: None,
            update_interval: Duration::from_millis(1000),
        }
    }
}

impl ProgressOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn limit(self, limit: u64) -> Self {
        Self { limit, ..self }
    }

    pub fn update_interval(self, update_interval: Duration) -> Self {
        Self {
            update_interval,
            ..self
        }
    }
}

/// A point-in-time view of a tracker, handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub id: Uuid,
    pub current: u64,
    pub limit: u64,
    pub percentage: u64,
    pub finished: bool,
    pub message: Option<String>,
}

struct State {
    current: u64,
    limit: u64,
    message: Option<String>,
    last_emit: Instant,
    ended: bool,
}

pub(crate) struct TrackerShared {
    id: Uuid,
    name: String,
    update_interval: Duration,
    created: Instant,
    state: Mutex<State>,
    on_update: Listeners<ProgressSnapshot>,
    on_end: Listeners<ProgressSnapshot>,
}

/// A counter towards a limit that renders itself as a bar.
///
/// The handle is owned by whoever created it. A logger only keeps a weak
/// registration, so dropping the tracker also takes it off the live region.
pub struct ProgressTracker {
    shared: Arc<TrackerShared>,
}

impl ProgressTracker {
    pub fn new(options: ProgressOptions) -> Self {
        let now = Instant::now();
        Self {
            shared: Arc::new(TrackerShared {
                id: Uuid::new_v4(),
                name: options.name,
                update_interval: options.update_interval,
                created: now,
                state: Mutex::new(State {
                    current: options.progress,
                    limit: options.limit,
                    message: options.message,
                    last_emit: now,
                    ended: false,
                }),
                on_update: Listeners::new(),
                on_end: Listeners::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn current(&self) -> u64 {
        self.lock().current
    }

    pub fn limit(&self) -> u64 {
        self.lock().limit
    }

    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.created.elapsed()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Whole percent done, clamped to 100. Always 0 while the limit is unknown.
    pub fn percentage(&self) -> u64 {
        let state = self.lock();
        percentage(state.current, state.limit)
    }

    pub fn on_update(&self, listener: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) {
        self.shared.on_update.add(listener);
    }

    /// Fires once, on the tick that reaches the limit.
    pub fn on_end(&self, listener: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) {
        self.shared.on_end.add(listener);
    }

    /// Advances by one and keeps the current message.
    pub fn tick(&self) {
        self.advance(1, None);
    }

    /// Advances by `step` and replaces the message.
    pub fn tick_with(&self, step: u64, message: Option<String>) {
        self.advance(step, Some(message));
    }

    /// Replaces the limit. Completion is only checked on the next tick.
    pub fn update_limit(&self, limit: u64) -> &Self {
        self.lock().limit = limit;
        self
    }

    /// `[current | limit]`
    pub fn status(&self) -> String {
        let state = self.lock();
        format!("[{} | {}]", state.current, limit_label(state.limit))
    }

    /// `name: <bar> [current | limit | pct%] message`, or `name: Done` once
    /// finished. `name_width` aligns the bars of several trackers.
    pub fn console_message(&self, name_width: usize, bar_length: usize, use_ansi: bool) -> String {
        let state = self.lock();
        let name = &self.shared.name;

        let line = if self.shared.finished(&state) {
            if name.is_empty() {
                "Done".to_string()
            } else {
                format!("{}: Done", name)
            }
        } else {
            let label = if name.is_empty() {
                String::new()
            } else {
                format!("{:<width$}", format!("{}: ", name), width = name_width + 2)
            };

            let percent = percentage(state.current, state.limit);
            let filled = (bar_length as u64 * percent / 100) as usize;
            let bar = format!("{}{}", "█".repeat(filled), ".".repeat(bar_length - filled));
            let info = state
                .message
                .as_deref()
                .filter(|m| !m.is_empty())
                .map(|m| format!(" {}", m))
                .unwrap_or_default();

            format!(
                "{}{} [{} | {} | {}%]{}",
                label,
                bar,
                state.current,
                limit_label(state.limit),
                percent,
                info
            )
        };

        if use_ansi {
            line.white().to_string()
        } else {
            line
        }
    }

    /// Summary without the bar for the durable logs.
    pub fn log_message(&self) -> String {
        let state = self.lock();
        let name = if self.shared.name.is_empty() {
            String::new()
        } else {
            format!("{}: ", self.shared.name)
        };
        let info = state
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(|m| format!("{} ", m))
            .unwrap_or_default();

        format!(
            "{}{}[{} | {} | {}%]",
            name,
            info,
            state.current,
            limit_label(state.limit),
            percentage(state.current, state.limit)
        )
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<TrackerShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn from_shared(shared: Arc<TrackerShared>) -> Self {
        Self { shared }
    }

    fn advance(&self, step: u64, message: Option<Option<String>>) {
        let (snapshot, emit_update, emit_end) = {
            let mut state = self.lock();
            if state.ended {
                // Ticking a finished tracker only moves the counter.
                state.current = state.current.saturating_add(step);
                return;
            }

            state.current = state.current.saturating_add(step);
            if let Some(message) = message {
                state.message = message;
            }

            let finished = self.shared.finished(&state);
            let emit_update = finished || state.last_emit.elapsed() > self.shared.update_interval;
            if emit_update {
                state.last_emit = Instant::now();
            }
            if finished {
                state.ended = true;
            }

            (self.shared.snapshot(&state), emit_update, finished)
        };

        if emit_update {
            self.shared.on_update.emit(&snapshot);
        }

        if emit_end {
            self.shared.on_end.emit(&snapshot);
            self.shared.on_update.clear();
            self.shared.on_end.clear();
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.lock()
    }
}

impl TrackerShared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finished(&self, state: &State) -> bool {
        state.limit > 0 && state.current >= state.limit
    }

    fn is_finished(&self) -> bool {
        let state = self.lock();
        self.finished(&state)
    }

    fn snapshot(&self, state: &State) -> ProgressSnapshot {
        ProgressSnapshot {
            id: self.id,
            current: state.current,
            limit: state.limit,
            percentage: percentage(state.current, state.limit),
            finished: self.finished(state),
            message: state.message.clone(),
        }
    }
}

fn percentage(current: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }

    (current.saturating_mul(100) / limit).min(100)
}

fn limit_label(limit: u64) -> String {
    if limit == 0 {
        "unknown".to_string()
    } else {
        limit.to_string()
    }
}
