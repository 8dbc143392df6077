use std::{
    cell::Cell,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Instant,
};

use eyre::Context;
use log::LevelFilter;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::{Config, Environment, Options, ProcessEnvironment},
    events::Listeners,
    live::{Compositor, SharedTerminal, StatusText, TerminalWriter},
    monitor::{Monitor, MonitorOptions, ResourceSample},
    progress::{ProgressOptions, ProgressSnapshot, ProgressTracker, TrackerShared},
    utils::render_data,
};

use super::{
    formatters::{ConsoleFormatter, ContainerFormatter, HumanFormatter, JsonFormatter},
    sinks::{ConsoleSink, FileSink, LeveledSink},
    Channel, LogFormatter, LogLevel, LogSink, MessageOptions, OutputChannel, Record,
    ResolvedChannels, Router, RunMode,
};

const BAR_LENGTH: usize = 50;

thread_local! {
    static LOGGING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside `Inner::log` until dropped.
struct LoggingScope {
    outer: bool,
}

impl LoggingScope {
    fn enter() -> Self {
        Self {
            outer: LOGGING.with(|flag| flag.replace(true)),
        }
    }

    fn nested(&self) -> bool {
        self.outer
    }

    fn active() -> bool {
        LOGGING.with(Cell::get)
    }
}

impl Drop for LoggingScope {
    fn drop(&mut self) {
        LOGGING.with(|flag| flag.set(self.outer));
    }
}

/// A failed write, as reported to `on_sink_error` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub channel: OutputChannel,
    pub sink: String,
    pub message: String,
}

struct Registration {
    id: Uuid,
    tracker: Weak<TrackerShared>,
    last_logged: Option<Instant>,
}

#[derive(Default)]
struct Sinks {
    stdout: Vec<LeveledSink>,
    human: Vec<LeveledSink>,
    json: Vec<LeveledSink>,
}

impl Sinks {
    fn all(&self) -> impl Iterator<Item = &LeveledSink> {
        self.stdout.iter().chain(&self.human).chain(&self.json)
    }

    fn push(&mut self, sink: LeveledSink) {
        match sink.channel() {
            OutputChannel::Stdout => self.stdout.push(sink),
            OutputChannel::Human => self.human.push(sink),
            OutputChannel::Json => self.json.push(sink),
        }
    }
}

struct Inner {
    config: Config,
    router: Router,
    sinks: Sinks,
    level: Mutex<LogLevel>,
    live: Option<Mutex<Compositor>>,
    monitor: Mutex<Option<Monitor>>,
    monitor_display: AtomicBool,
    last_status_logged: Mutex<Option<Instant>>,
    trackers: Mutex<Vec<Registration>>,
    sink_failures: AtomicUsize,
    error_listeners: Listeners<SinkError>,
}

/// Routes leveled messages to the console, human and JSON sinks and keeps
/// the live status region of an interactive terminal up to date.
///
/// Cloning is cheap; all clones share the same sinks and live region.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn run_mode(&self) -> RunMode {
        self.inner.router.run_mode()
    }

    pub fn level(&self) -> LogLevel {
        *lock(&self.inner.level)
    }

    /// Which sink groups a message with these channels would reach.
    pub fn resolve(&self, channels: Option<&[Channel]>) -> ResolvedChannels {
        self.inner.router.resolve(channels)
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>, options: &MessageOptions) {
        self.inner.log(level, message.as_ref(), options);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message, &MessageOptions::default());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message, &MessageOptions::default());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message, &MessageOptions::default());
    }

    pub fn verbose(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Verbose, message, &MessageOptions::default());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message, &MessageOptions::default());
    }

    pub fn silly(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Silly, message, &MessageOptions::default());
    }

    /// Sets the ephemeral status. Interactively it lands in the live region
    /// (and stays there across later log lines); in container mode it is an
    /// ordinary `status` record.
    pub fn status(&self, message: impl AsRef<str>, options: &MessageOptions) {
        self.log(LogLevel::Status, message, options);
    }

    /// Erases the live region and forgets the retained status.
    pub fn clear_status(&self) {
        if let Some(mut live) = self.inner.lock_live() {
            live.render(Vec::new(), StatusText::Clear);
        }
    }

    /// Redraws the live region with the retained status.
    pub fn refresh_status(&self, options: &MessageOptions) {
        self.inner.render_live(options);
    }

    /// Sets the global level and every sink's threshold to `level`.
    pub fn set_level(&self, level: LogLevel) {
        *lock(&self.inner.level) = level;
        for sink in self.inner.sinks.all() {
            sink.set_threshold(level);
        }
    }

    /// Runs `f` with every sink unmuted, restoring the thresholds afterwards,
    /// even when `f` panics.
    pub fn with_all_levels<T>(&self, f: impl FnOnce() -> T) -> T {
        let _restore = RestoreLevels::new(&self.inner);
        self.set_level(LogLevel::Silly);
        f()
    }

    /// Creates a tracker whose bar is drawn in the live region until it
    /// finishes or is dropped. Also brings up the resource monitor.
    pub fn progress(&self, options: ProgressOptions) -> ProgressTracker {
        let tracker = ProgressTracker::new(options);

        let weak = Arc::downgrade(&self.inner);
        tracker.on_update(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.tracker_updated(snapshot);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        tracker.on_end(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.tracker_ended(snapshot.id);
            }
        });

        lock(&self.inner.trackers).push(Registration {
            id: tracker.id(),
            tracker: tracker.downgrade(),
            last_logged: None,
        });

        self.inner.ensure_monitor();
        tracker
    }

    /// Number of trackers currently drawn in the live region.
    pub fn active_trackers(&self) -> usize {
        self.inner.live_trackers().len()
    }

    /// Shows the monitor line and starts sampling.
    pub fn start_monitor(&self) {
        self.inner.monitor_display.store(true, Ordering::SeqCst);
        self.inner.ensure_monitor();
    }

    /// Hides the monitor line and stops sampling.
    pub fn stop_monitor(&self) {
        self.inner.release_monitor();
        self.inner.monitor_display.store(false, Ordering::SeqCst);
    }

    pub fn monitor(&self) -> Option<Monitor> {
        self.inner.current_monitor()
    }

    /// The block drawn by the last render of the live region.
    pub fn live_block(&self) -> Vec<String> {
        self.inner
            .lock_live()
            .map(|live| live.last_block().to_vec())
            .unwrap_or_default()
    }

    pub fn retained_status(&self) -> Option<String> {
        self.inner
            .lock_live()
            .and_then(|live| live.retained_status().map(str::to_string))
    }

    pub fn sink_failures(&self) -> usize {
        self.inner.sink_failures.load(Ordering::SeqCst)
    }

    /// Called for every failed sink write when `emit_errors` is on.
    pub fn on_sink_error(&self, listener: impl Fn(&SinkError) + Send + Sync + 'static) {
        self.inner.error_listeners.add(listener);
    }

    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Installs this logger as the backend of the `log` facade.
    pub fn init(self) -> eyre::Result<()> {
        log::set_max_level(LevelFilter::Trace);
        log::set_boxed_logger(Box::new(self)).context("Failed registering boxed logger")?;

        Ok(())
    }

    /// Logs panics at `error` level, and exits the process afterwards when
    /// `exit_on_error` is set. No-op unless `capture_unhandled_exception`.
    pub fn capture_panics(&self) {
        if !self.inner.config.capture_unhandled_exception {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let exit_on_error = self.inner.config.exit_on_error;
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            // A panic raised while this thread is logging may hold the live
            // region or a sink lock.
            match weak.upgrade().filter(|_| !LoggingScope::active()) {
                Some(inner) => {
                    inner.log(
                        LogLevel::Error,
                        &format!("Unhandled panic: {}", info),
                        &MessageOptions::default(),
                    );
                    inner.flush();
                }
                None => previous(info),
            }

            if exit_on_error {
                std::process::exit(1);
            }
        }));
    }

    /// Puts the default panic hook back.
    pub fn release_panics(&self) {
        // Taking the registered hook reinstates the default one.
        drop(std::panic::take_hook());
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        let level = LogLevel::from(metadata.level());
        self.inner.sinks.all().any(|sink| sink.accepts(level))
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            self.inner.log(
                record.level().into(),
                &record.args().to_string(),
                &MessageOptions::default(),
            );
        }
    }

    fn flush(&self) {
        self.inner.flush()
    }
}

impl Inner {
    fn log(self: &Arc<Self>, level: LogLevel, message: &str, options: &MessageOptions) {
        let channels = self.router.resolve(options.channels.as_deref());

        let status = if level == LogLevel::Status && !message.is_empty() {
            StatusText::Set(status_text(message, options))
        } else {
            StatusText::Retain
        };

        let failures = {
            let scope = LoggingScope::enter();

            // Erase, print into scrollback, redraw: one critical section. A
            // nested call on this thread already owns the region.
            let mut live = if self.prints_locally(options) && !scope.nested() {
                self.lock_live()
            } else {
                None
            };

            if let Some(live) = live.as_mut() {
                live.erase();
            }

            let failures = self.dispatch(level, message, options, channels);

            if let Some(live) = live.as_mut() {
                live.render(self.live_sections(), status);
            }

            failures
        };

        // Listeners may log themselves, so they run with no lock held.
        for failure in &failures {
            self.error_listeners.emit(failure);
        }
    }

    fn dispatch(
        &self,
        level: LogLevel,
        message: &str,
        options: &MessageOptions,
        channels: ResolvedChannels,
    ) -> Vec<SinkError> {
        let run_mode = self.router.run_mode();
        let durable = options.logging_message.as_deref().unwrap_or(message);
        let console = match run_mode {
            RunMode::Container => durable,
            RunMode::Interactive => message,
        };

        let record = |message| Record {
            level,
            message,
            data: options.data.as_ref(),
            meta: options.meta.as_ref(),
        };

        let mut failures = Vec::new();

        // Interactively a status only lives in the live region.
        if channels.contains(OutputChannel::Stdout)
            && !console.is_empty()
            && (level != LogLevel::Status || run_mode == RunMode::Container)
        {
            self.deliver(&self.sinks.stdout, &record(console), &mut failures);
        }

        if channels.contains(OutputChannel::Human) && !durable.is_empty() {
            self.deliver(&self.sinks.human, &record(durable), &mut failures);
        }

        if channels.contains(OutputChannel::Json) && !durable.is_empty() {
            self.deliver(&self.sinks.json, &record(durable), &mut failures);
        }

        failures
    }

    fn deliver(&self, sinks: &[LeveledSink], record: &Record, failures: &mut Vec<SinkError>) {
        for sink in sinks.iter().filter(|sink| sink.accepts(record.level)) {
            if let Err(err) = sink.write_log(record) {
                self.sink_failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(target: "sherlog", "{:#}", err);

                if self.config.emit_errors {
                    failures.push(SinkError {
                        channel: sink.channel(),
                        sink: sink.name().to_string(),
                        message: format!("{:#}", err),
                    });
                }
            }
        }
    }

    fn flush(&self) {
        for sink in self.sinks.all() {
            sink.flush();
        }
    }

    fn prints_locally(&self, options: &MessageOptions) -> bool {
        self.live.is_some() && options.reaches_terminal()
    }

    fn lock_live(&self) -> Option<MutexGuard<'_, Compositor>> {
        self.live.as_ref().map(lock)
    }

    fn render_live(&self, options: &MessageOptions) {
        if !self.prints_locally(options) || LoggingScope::active() {
            return;
        }

        if let Some(mut live) = self.lock_live() {
            live.render(self.live_sections(), StatusText::Retain);
        }
    }

    /// Monitor line, then one line per tracker with aligned names.
    fn live_sections(&self) -> Vec<String> {
        let use_ansi = self.config.use_ansi;
        let mut sections = Vec::new();

        if self.monitor_display.load(Ordering::SeqCst) {
            if let Some(monitor) = self.current_monitor() {
                sections.push(monitor.console_message(use_ansi));
            }
        }

        let trackers = self.live_trackers();
        let name_width = trackers
            .iter()
            .map(|tracker| tracker.name().chars().count())
            .max()
            .unwrap_or(0);

        sections.extend(
            trackers
                .iter()
                .map(|tracker| tracker.console_message(name_width, BAR_LENGTH, use_ansi)),
        );

        sections
    }

    /// Live registrations, pruning trackers whose owner dropped them. Losing
    /// the last tracker releases a hidden monitor, as finishing it would.
    fn live_trackers(&self) -> Vec<ProgressTracker> {
        let (trackers, pruned) = {
            let mut registry = lock(&self.trackers);
            let before = registry.len();
            registry.retain(|registration| registration.tracker.strong_count() > 0);
            let trackers: Vec<ProgressTracker> = registry
                .iter()
                .filter_map(|registration| registration.tracker.upgrade())
                .map(ProgressTracker::from_shared)
                .collect();
            (trackers, registry.len() < before)
        };

        if pruned {
            self.release_unused_monitor(trackers.len());
        }

        trackers
    }

    fn release_unused_monitor(&self, remaining_trackers: usize) {
        if remaining_trackers == 0 && !self.monitor_display.load(Ordering::SeqCst) {
            self.release_monitor();
        }
    }

    fn tracker_updated(self: &Arc<Self>, snapshot: &ProgressSnapshot) {
        self.render_live(&MessageOptions::with_channels([Channel::Console]));

        let due = {
            let mut registry = lock(&self.trackers);
            registry
                .iter_mut()
                .find(|registration| registration.id == snapshot.id)
                .and_then(|registration| {
                    let due = snapshot.finished
                        || registration
                            .last_logged
                            .map_or(true, |at| at.elapsed() > self.config.monitor.max_interval);
                    if !due {
                        return None;
                    }
                    registration.last_logged = Some(Instant::now());
                    registration.tracker.upgrade()
                })
        };

        if let Some(shared) = due {
            let message = ProgressTracker::from_shared(shared).log_message();
            self.log(
                LogLevel::Status,
                &message,
                &MessageOptions::with_channels([Channel::Log]),
            );
        }
    }

    fn tracker_ended(&self, id: Uuid) {
        let remaining = {
            let mut registry = lock(&self.trackers);
            registry.retain(|registration| registration.id != id);
            registry.len()
        };

        self.release_unused_monitor(remaining);
    }

    fn current_monitor(&self) -> Option<Monitor> {
        lock(&self.monitor).clone()
    }

    fn ensure_monitor(self: &Arc<Self>) {
        let mut slot = lock(&self.monitor);
        if slot.is_some() {
            return;
        }

        let monitor = Monitor::new(MonitorOptions {
            update_interval: self.config.monitor.update_interval,
            alert_threshold: self.config.monitor.max_change,
        });

        let weak = Arc::downgrade(self);
        monitor.on_update(move |sample| {
            if let Some(inner) = weak.upgrade() {
                inner.monitor_updated(sample);
            }
        });

        if let Err(err) = monitor.start() {
            tracing::debug!(target: "sherlog", "resource sampling disabled: {:#}", err);
        }

        *lock(&self.last_status_logged) = Some(Instant::now());
        *slot = Some(monitor);
    }

    fn release_monitor(&self) {
        if let Some(monitor) = lock(&self.monitor).take() {
            monitor.stop();
        }
    }

    fn monitor_updated(self: &Arc<Self>, sample: &ResourceSample) {
        // Dropped trackers are only noticed here when nothing else renders.
        self.live_trackers();
        if self.current_monitor().is_none() {
            return;
        }

        let usage = json!({ "cpu": sample.cpu, "memory": sample.memory });

        self.render_live(&MessageOptions::with_channels([Channel::Console]).meta(usage.clone()));

        let due = {
            let mut last = lock(&self.last_status_logged);
            let due = sample.is_alert
                || last.map_or(true, |at| at.elapsed() > self.config.monitor.max_interval);
            if due {
                *last = Some(Instant::now());
            }
            due
        };

        if !due {
            return;
        }

        if let Some(monitor) = self.current_monitor() {
            self.log(
                LogLevel::Status,
                &monitor.log_message(),
                &MessageOptions::with_channels([Channel::Log]).meta(usage),
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release_monitor();
        self.flush();
    }
}

/// Saves every sink threshold and the global level; restores them on drop.
struct RestoreLevels<'a> {
    inner: &'a Inner,
    level: LogLevel,
    thresholds: Vec<LogLevel>,
}

impl<'a> RestoreLevels<'a> {
    fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            level: *lock(&inner.level),
            thresholds: inner.sinks.all().map(LeveledSink::threshold).collect(),
        }
    }
}

impl Drop for RestoreLevels<'_> {
    fn drop(&mut self) {
        *lock(&self.inner.level) = self.level;
        for (sink, threshold) in self.inner.sinks.all().zip(&self.thresholds) {
            sink.set_threshold(*threshold);
        }
    }
}

fn status_text(message: &str, options: &MessageOptions) -> String {
    match &options.data {
        Some(data) => format!("{}\n{}", message, render_data(data)),
        None => message.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Builder {
    options: Options,
    environment: Box<dyn Environment>,
    run_mode: Option<RunMode>,
    terminal: Option<SharedTerminal>,
    remote: Option<Box<dyn LogSink>>,
}

impl Builder {
    /// Starts from the process environment.
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            environment: Box::new(ProcessEnvironment),
            run_mode: None,
            terminal: None,
            remote: None,
        }
    }

    pub fn with_environment(self, environment: impl Environment + 'static) -> Self {
        Self {
            environment: Box::new(environment),
            ..self
        }
    }

    /// Explicit settings; they win over the environment.
    pub fn with_options(self, options: Options) -> Self {
        Self { options, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self {
            options: Options {
                level: Some(level),
                ..self.options
            },
            ..self
        }
    }

    pub fn with_human_log(self, path: impl Into<PathBuf>) -> Self {
        Self {
            options: Options {
                human_log_path: Some(path.into()),
                ..self.options
            },
            ..self
        }
    }

    pub fn with_json_log(self, path: impl Into<PathBuf>) -> Self {
        Self {
            options: Options {
                json_log_path: Some(path.into()),
                ..self.options
            },
            ..self
        }
    }

    pub fn with_ansi(self, use_ansi: bool) -> Self {
        Self {
            options: Options {
                use_ansi: Some(use_ansi),
                ..self.options
            },
            ..self
        }
    }

    /// Skips run-mode detection.
    pub fn with_run_mode(self, run_mode: RunMode) -> Self {
        Self {
            run_mode: Some(run_mode),
            ..self
        }
    }

    /// Replaces stdout as the console and live-region output.
    pub fn with_terminal(self, writer: impl TerminalWriter + 'static) -> Self {
        Self {
            terminal: Some(SharedTerminal::new(writer)),
            ..self
        }
    }

    /// Transport for the remote collector. Only attached when both the key
    /// file and the project identifier are configured.
    pub fn with_remote_sink(self, sink: Box<dyn LogSink>) -> Self {
        Self {
            remote: Some(sink),
            ..self
        }
    }

    /// Resolves the configuration and opens the sinks. Sinks that can't be
    /// set up are left out rather than failing the build.
    pub fn build(self) -> Logger {
        let config = Config::resolve(self.environment.as_ref(), &self.options);
        let run_mode = self.run_mode.unwrap_or_else(RunMode::detect);
        let terminal = self.terminal.unwrap_or_else(SharedTerminal::stdout);
        let level = config.level;

        let mut sinks = Sinks::default();

        if config.stdout.output {
            let formatter: Box<dyn LogFormatter> = match run_mode {
                RunMode::Interactive => Box::new(ConsoleFormatter::new(config.use_ansi)),
                RunMode::Container => Box::new(ContainerFormatter),
            };
            sinks.push(LeveledSink::new(
                OutputChannel::Stdout,
                "console",
                Box::new(ConsoleSink::new(terminal.clone(), formatter)),
                config.stdout.level.unwrap_or(level),
            ));
        }

        if let Some(path) = &config.human_log.path {
            match FileSink::new(path, Box::new(HumanFormatter::new())) {
                Ok(sink) => sinks.push(LeveledSink::new(
                    OutputChannel::Human,
                    "human file",
                    Box::new(sink),
                    config.human_log.level.unwrap_or(level),
                )),
                Err(err) => tracing::warn!(target: "sherlog", "human log disabled: {:#}", err),
            }
        }

        if let Some(path) = &config.json_log.path {
            match FileSink::new(path, Box::new(JsonFormatter)) {
                Ok(sink) => sinks.push(LeveledSink::new(
                    OutputChannel::Json,
                    "json file",
                    Box::new(sink),
                    config.json_log.level.unwrap_or(level),
                )),
                Err(err) => tracing::warn!(target: "sherlog", "json log disabled: {:#}", err),
            }
        }

        if let Some(remote) = self.remote {
            if config.remote.is_complete() {
                sinks.push(LeveledSink::new(
                    OutputChannel::Json,
                    "remote collector",
                    remote,
                    config.remote.level.unwrap_or(level),
                ));
            } else {
                tracing::debug!(
                    target: "sherlog",
                    "remote collector disabled: needs both a key file and a project id"
                );
            }
        }

        let live = (run_mode.is_interactive() && config.stdout.output)
            .then(|| Mutex::new(Compositor::new(terminal, config.use_ansi)));

        Logger {
            inner: Arc::new(Inner {
                router: Router::new(run_mode, &config),
                monitor_display: AtomicBool::new(config.monitor.display),
                level: Mutex::new(level),
                config,
                sinks,
                live,
                monitor: Mutex::new(None),
                last_status_logged: Mutex::new(None),
                trackers: Mutex::new(Vec::new()),
                sink_failures: AtomicUsize::new(0),
                error_listeners: Listeners::new(),
            }),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
