use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use eyre::Context;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use yansi::Paint;

use crate::{
    events::Listeners,
    utils::{format_bytes, format_elapsed},
};

const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

const FRAMES: [&str; 7] = ["⢄", "⢂", "⢁", "⡁", "⡈", "⡐", "⡠"];

/// Where resource readings come from.
pub trait UsageProbe: Send + Sync {
    /// CPU time consumed by the process so far.
    fn cpu_time(&self) -> Duration;
    /// Resident memory of the process.
    fn memory_bytes(&self) -> u64;
}

/// Reads the current process through `getrusage` and `/proc/self/statm`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessProbe;

impl UsageProbe for ProcessProbe {
    #[cfg(unix)]
    fn cpu_time(&self) -> Duration {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: `usage` is a valid, writable rusage struct.
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
            return Duration::ZERO;
        }

        let micros = |tv: libc::timeval| tv.tv_sec as u64 * 1_000_000 + tv.tv_usec as u64;
        Duration::from_micros(micros(usage.ru_utime) + micros(usage.ru_stime))
    }

    #[cfg(not(unix))]
    fn cpu_time(&self) -> Duration {
        Duration::ZERO
    }

    #[cfg(target_os = "linux")]
    fn memory_bytes(&self) -> u64 {
        let resident_pages = std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|statm| statm.split_whitespace().nth(1)?.parse::<u64>().ok())
            .unwrap_or(0);
        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

        resident_pages * page_size.max(0) as u64
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn memory_bytes(&self) -> u64 {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: `usage` is a valid, writable rusage struct.
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
            return 0;
        }
        usage.ru_maxrss.max(0) as u64
    }

    #[cfg(not(unix))]
    fn memory_bytes(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    pub update_interval: Duration,
    /// Absolute log-ratio of memory between two samples that raises an alert.
    pub alert_threshold: f64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(200),
            alert_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// CPU time per wall-clock time since the previous sample.
    pub cpu: f64,
    pub memory: u64,
    pub is_alert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Idle => write!(f, "idle"),
            MonitorState::Running => write!(f, "running"),
            MonitorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// `|ln(previous / current)| > threshold`; never an alert without two
/// non-zero readings.
pub fn is_alert(previous: u64, current: u64, threshold: f64) -> bool {
    if previous == 0 || current == 0 {
        return false;
    }

    (previous as f64 / current as f64).ln().abs() > threshold
}

struct State {
    phase: MonitorState,
    sample: ResourceSample,
    last_cpu: Duration,
    last_check: Instant,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    options: MonitorOptions,
    probe: Box<dyn UsageProbe>,
    started: Instant,
    frame: AtomicUsize,
    state: Mutex<State>,
    listeners: Listeners<ResourceSample>,
}

/// Periodically samples process CPU and memory.
///
/// `Idle -> Running -> Stopped`; a stopped monitor cannot be restarted. The
/// sampling task only holds a weak reference, so dropping every handle also
/// ends it at the next tick, but `stop` is the way to end it right away.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

impl Monitor {
    pub fn new(options: MonitorOptions) -> Self {
        Self::with_probe(options, Box::new(ProcessProbe))
    }

    pub fn with_probe(options: MonitorOptions, probe: Box<dyn UsageProbe>) -> Self {
        let now = Instant::now();
        let state = State {
            phase: MonitorState::Idle,
            sample: ResourceSample {
                cpu: 0.0,
                memory: probe.memory_bytes(),
                is_alert: false,
            },
            last_cpu: probe.cpu_time(),
            last_check: now,
            task: None,
        };

        Self {
            shared: Arc::new(Shared {
                options,
                probe,
                started: now,
                frame: AtomicUsize::new(0),
                state: Mutex::new(state),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn options(&self) -> MonitorOptions {
        self.shared.options
    }

    pub fn state(&self) -> MonitorState {
        self.lock().phase
    }

    /// The latest sample.
    pub fn sample(&self) -> ResourceSample {
        self.lock().sample
    }

    pub fn on_update(&self, listener: impl Fn(&ResourceSample) + Send + Sync + 'static) {
        self.shared.listeners.add(listener);
    }

    /// Spawns the sampling task on the current tokio runtime.
    pub fn start(&self) -> eyre::Result<()> {
        let mut state = self.lock();
        match state.phase {
            MonitorState::Running => return Ok(()),
            MonitorState::Stopped => {
                return Err(eyre::eyre!(
                    "Monitor was stopped and can't be restarted, create a new one"
                ))
            }
            MonitorState::Idle => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .context("Resource monitor needs a tokio runtime")?;

        let weak = Arc::downgrade(&self.shared);
        // `tokio::time::interval` panics on a zero period.
        let period = self.shared.options.update_interval.max(MIN_UPDATE_INTERVAL);
        state.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                Monitor { shared }.sample_now();
            }
        }));
        state.phase = MonitorState::Running;

        tracing::debug!(target: "sherlog", "resource monitor started, interval={:?}", period);
        Ok(())
    }

    /// Cancels the sampling task. Safe to call any number of times.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(task) = state.task.take() {
            task.abort();
            tracing::debug!(target: "sherlog", "resource monitor stopped");
        }
        state.phase = MonitorState::Stopped;
    }

    /// Takes one sample, stores it and notifies the listeners.
    pub fn sample_now(&self) -> ResourceSample {
        let cpu_time = self.shared.probe.cpu_time();
        let memory = self.shared.probe.memory_bytes();
        let now = Instant::now();

        let sample = {
            let mut state = self.lock();
            let elapsed = now.duration_since(state.last_check).as_secs_f64();
            let cpu = if elapsed > 0.0 {
                cpu_time.saturating_sub(state.last_cpu).as_secs_f64() / elapsed
            } else {
                0.0
            };

            let sample = ResourceSample {
                cpu,
                memory,
                is_alert: is_alert(
                    state.sample.memory,
                    memory,
                    self.shared.options.alert_threshold,
                ),
            };

            state.sample = sample;
            state.last_cpu = cpu_time;
            state.last_check = now;
            sample
        };

        self.shared.listeners.emit(&sample);
        sample
    }

    /// Decorated line for the live region. Every call advances the spinner.
    pub fn console_message(&self, use_ansi: bool) -> String {
        let position = (self.shared.frame.fetch_add(1, Ordering::Relaxed) + 1) % FRAMES.len();
        let spinner = FRAMES[position];
        let sample = self.sample();
        let cpu = format!("{:.2}", sample.cpu);
        let memory = format_bytes(sample.memory);
        let running = format_elapsed(self.shared.started.elapsed());

        if !use_ansi {
            return format!("{} CPU: {} Memory: {} | {}", spinner, cpu, memory, running);
        }

        format!(
            "{} {} {} {} {} {} {}",
            spinner.blue(),
            "CPU:".bright_black(),
            cpu.cyan(),
            "Memory:".bright_black(),
            memory.cyan(),
            "|".bright_black(),
            running.yellow()
        )
    }

    /// Plain line for the durable logs.
    pub fn log_message(&self) -> String {
        let sample = self.sample();
        format!(
            "CPU: {:.2} Memory: {} | {}",
            sample.cpu,
            format_bytes(sample.memory),
            format_elapsed(self.shared.started.elapsed())
        )
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
