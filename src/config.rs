use std::{collections::HashMap, io::IsTerminal, path::PathBuf, str::FromStr, time::Duration};

use crate::{logging::LogLevel, utils::booleanize};

/// Source of environment-derived settings.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOptions {
    pub key_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub level: Option<LogLevel>,
}

/// A partial configuration layer. `None` means "not set at this layer".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub capture_unhandled_exception: Option<bool>,
    pub exit_on_error: Option<bool>,
    pub emit_errors: Option<bool>,
    pub level: Option<LogLevel>,
    pub stdout_output: Option<bool>,
    pub stdout_level: Option<LogLevel>,
    pub human_log_path: Option<PathBuf>,
    pub human_log_level: Option<LogLevel>,
    pub json_log_path: Option<PathBuf>,
    pub json_log_level: Option<LogLevel>,
    pub remote: RemoteOptions,
    pub monitor_display: Option<bool>,
    pub monitor_interval: Option<Duration>,
    pub monitor_max_interval: Option<Duration>,
    pub monitor_max_change: Option<f64>,
    pub use_ansi: Option<bool>,
}

impl Options {
    /// Reads the `SHERLOG_*` variables. Malformed values are skipped.
    pub fn from_environment(env: &dyn Environment) -> Self {
        let text = |key: &str| env.var(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| text(key).map(|v| booleanize(Some(&v), false));
        let level = |key: &str| text(key).and_then(|v| parse_or_warn::<LogLevel>(key, &v));
        let path = |key: &str| text(key).map(PathBuf::from);

        let human_log_path = path("SHERLOG_HUMAN_LOG_PATH");
        let json_log_path = path("SHERLOG_JSON_LOG_PATH");

        // The collector credentials only count as a pair.
        let remote = match (
            path("SHERLOG_STACKDRIVER_KEY_FILE"),
            text("SHERLOG_STACKDRIVER_PROJECT_ID"),
        ) {
            (Some(key_file), Some(project_id)) => RemoteOptions {
                key_file: Some(key_file),
                project_id: Some(project_id),
                level: level("SHERLOG_STACKDRIVER_LOG_LEVEL"),
            },
            _ => RemoteOptions::default(),
        };

        Self {
            capture_unhandled_exception: flag("SHERLOG_CAPTURE_UNHANDLED_EXCEPTION"),
            exit_on_error: flag("SHERLOG_EXIT_ON_ERROR"),
            emit_errors: flag("SHERLOG_EMIT_ERRORS"),
            level: level("SHERLOG_LEVEL"),
            stdout_output: flag("SHERLOG_STDOUT"),
            stdout_level: level("SHERLOG_STDOUT_LEVEL"),
            human_log_level: human_log_path
                .as_ref()
                .and_then(|_| level("SHERLOG_HUMAN_LOG_LEVEL")),
            human_log_path,
            json_log_level: json_log_path
                .as_ref()
                .and_then(|_| level("SHERLOG_JSON_LOG_LEVEL")),
            json_log_path,
            remote,
            monitor_display: flag("SHERLOG_MONITOR_DISPLAY"),
            monitor_interval: text("SHERLOG_MONITOR_INTERVAL")
                .and_then(|v| parse_or_warn::<u64>("SHERLOG_MONITOR_INTERVAL", &v))
                .map(Duration::from_millis),
            monitor_max_interval: text("SHERLOG_MONITOR_LOGGING_MAX_INTERVAL")
                .and_then(|v| parse_or_warn::<u64>("SHERLOG_MONITOR_LOGGING_MAX_INTERVAL", &v))
                .map(Duration::from_secs),
            monitor_max_change: text("SHERLOG_MONITOR_LOGGING_MAX_CHANGE")
                .and_then(|v| parse_or_warn::<f64>("SHERLOG_MONITOR_LOGGING_MAX_CHANGE", &v)),
            use_ansi: None,
        }
    }

    /// Returns a layer where every value set in `over` wins.
    pub fn layered_under(self, over: &Options) -> Options {
        let over = over.clone();
        Options {
            capture_unhandled_exception: over
                .capture_unhandled_exception
                .or(self.capture_unhandled_exception),
            exit_on_error: over.exit_on_error.or(self.exit_on_error),
            emit_errors: over.emit_errors.or(self.emit_errors),
            level: over.level.or(self.level),
            stdout_output: over.stdout_output.or(self.stdout_output),
            stdout_level: over.stdout_level.or(self.stdout_level),
            human_log_path: over.human_log_path.or(self.human_log_path),
            human_log_level: over.human_log_level.or(self.human_log_level),
            json_log_path: over.json_log_path.or(self.json_log_path),
            json_log_level: over.json_log_level.or(self.json_log_level),
            remote: RemoteOptions {
                key_file: over.remote.key_file.or(self.remote.key_file),
                project_id: over.remote.project_id.or(self.remote.project_id),
                level: over.remote.level.or(self.remote.level),
            },
            monitor_display: over.monitor_display.or(self.monitor_display),
            monitor_interval: over.monitor_interval.or(self.monitor_interval),
            monitor_max_interval: over.monitor_max_interval.or(self.monitor_max_interval),
            monitor_max_change: over.monitor_max_change.or(self.monitor_max_change),
            use_ansi: over.use_ansi.or(self.use_ansi),
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(target: "sherlog", "ignoring {}={:?}: not a valid value", key, value);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StdoutConfig {
    pub output: bool,
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileLogConfig {
    pub path: Option<PathBuf>,
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub key_file: Option<PathBuf>,
    pub project_id: Option<String>,
    pub level: Option<LogLevel>,
}

impl RemoteConfig {
    /// A collector needs both the key file and the project identifier.
    pub fn is_complete(&self) -> bool {
        self.key_file.is_some() && self.project_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub display: bool,
    /// How often resource usage is sampled.
    pub update_interval: Duration,
    /// Longest gap between two monitor entries in the durable logs.
    pub max_interval: Duration,
    /// Memory change, as an absolute log-ratio, that forces a log entry.
    pub max_change: f64,
}

/// The resolved, immutable configuration of a logger.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub capture_unhandled_exception: bool,
    pub exit_on_error: bool,
    pub emit_errors: bool,
    pub level: LogLevel,
    pub stdout: StdoutConfig,
    pub human_log: FileLogConfig,
    pub json_log: FileLogConfig,
    pub remote: RemoteConfig,
    pub monitor: MonitorConfig,
    pub use_ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_unhandled_exception: true,
            exit_on_error: false,
            emit_errors: false,
            level: LogLevel::Info,
            stdout: StdoutConfig {
                output: true,
                level: None,
            },
            human_log: FileLogConfig {
                path: None,
                level: None,
            },
            json_log: FileLogConfig {
                path: None,
                level: None,
            },
            remote: RemoteConfig {
                key_file: None,
                project_id: None,
                level: None,
            },
            monitor: MonitorConfig {
                display: true,
                update_interval: Duration::from_millis(200),
                max_interval: Duration::from_secs(300),
                max_change: 0.1,
            },
            use_ansi: std::io::stdout().is_terminal(),
        }
    }
}

impl Config {
    /// Compiled defaults < environment < `overrides`.
    pub fn resolve(env: &dyn Environment, overrides: &Options) -> Self {
        let merged = Options::from_environment(env).layered_under(overrides);
        Self::default().apply(merged)
    }

    fn apply(self, layer: Options) -> Self {
        Self {
            capture_unhandled_exception: layer
                .capture_unhandled_exception
                .unwrap_or(self.capture_unhandled_exception),
            exit_on_error: layer.exit_on_error.unwrap_or(self.exit_on_error),
            emit_errors: layer.emit_errors.unwrap_or(self.emit_errors),
            level: layer.level.unwrap_or(self.level),
            stdout: StdoutConfig {
                output: layer.stdout_output.unwrap_or(self.stdout.output),
                level: layer.stdout_level.or(self.stdout.level),
            },
            human_log: FileLogConfig {
                path: non_empty(layer.human_log_path).or(self.human_log.path),
                level: layer.human_log_level.or(self.human_log.level),
            },
            json_log: FileLogConfig {
                path: non_empty(layer.json_log_path).or(self.json_log.path),
                level: layer.json_log_level.or(self.json_log.level),
            },
            remote: RemoteConfig {
                key_file: non_empty(layer.remote.key_file).or(self.remote.key_file),
                project_id: layer
                    .remote
                    .project_id
                    .filter(|id| !id.trim().is_empty())
                    .or(self.remote.project_id),
                level: layer.remote.level.or(self.remote.level),
            },
            monitor: MonitorConfig {
                display: layer.monitor_display.unwrap_or(self.monitor.display),
                update_interval: layer
                    .monitor_interval
                    .filter(|interval| !interval.is_zero())
                    .unwrap_or(self.monitor.update_interval),
                max_interval: layer.monitor_max_interval.unwrap_or(self.monitor.max_interval),
                max_change: layer.monitor_max_change.unwrap_or(self.monitor.max_change),
            },
            use_ansi: layer.use_ansi.unwrap_or(self.use_ansi),
        }
    }
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::resolve(&env(&[]), &Options::default());

        assert!(config.capture_unhandled_exception);
        assert!(!config.exit_on_error);
        assert!(!config.emit_errors);
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.stdout.output);
        assert_eq!(config.human_log.path, None);
        assert_eq!(config.json_log.path, None);
        assert!(!config.remote.is_complete());
        assert!(config.monitor.display);
        assert_eq!(config.monitor.max_interval, Duration::from_secs(300));
        assert_eq!(config.monitor.max_change, 0.1);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::resolve(
            &env(&[
                ("SHERLOG_CAPTURE_UNHANDLED_EXCEPTION", "0"),
                ("SHERLOG_EXIT_ON_ERROR", "YES"),
                ("SHERLOG_EMIT_ERRORS", "TRUE"),
                ("SHERLOG_LEVEL", "ERROR"),
                ("SHERLOG_STDOUT", "t"),
                ("SHERLOG_STDOUT_LEVEL", "Warn"),
                ("SHERLOG_HUMAN_LOG_PATH", "/tmp/human.log"),
                ("SHERLOG_HUMAN_LOG_LEVEL", "info"),
                ("SHERLOG_JSON_LOG_PATH", "/tmp/json.log"),
                ("SHERLOG_JSON_LOG_LEVEL", "verbose"),
                ("SHERLOG_STACKDRIVER_KEY_FILE", "/tmp/key"),
                ("SHERLOG_STACKDRIVER_PROJECT_ID", "acme"),
                ("SHERLOG_STACKDRIVER_LOG_LEVEL", "debug"),
                ("SHERLOG_MONITOR_DISPLAY", "no"),
                ("SHERLOG_MONITOR_LOGGING_MAX_INTERVAL", "100"),
                ("SHERLOG_MONITOR_LOGGING_MAX_CHANGE", "1"),
            ]),
            &Options::default(),
        );

        assert!(!config.capture_unhandled_exception);
        assert!(config.exit_on_error);
        assert!(config.emit_errors);
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.stdout.level, Some(LogLevel::Warn));
        assert_eq!(config.human_log.path, Some(PathBuf::from("/tmp/human.log")));
        assert_eq!(config.human_log.level, Some(LogLevel::Info));
        assert_eq!(config.json_log.level, Some(LogLevel::Verbose));
        assert!(config.remote.is_complete());
        assert_eq!(config.remote.level, Some(LogLevel::Debug));
        assert!(!config.monitor.display);
        assert_eq!(config.monitor.max_interval, Duration::from_secs(100));
        assert_eq!(config.monitor.max_change, 1.0);
    }

    #[test]
    fn explicit_options_win_over_environment() {
        let config = Config::resolve(
            &env(&[("SHERLOG_LEVEL", "error"), ("SHERLOG_STDOUT", "0")]),
            &Options {
                level: Some(LogLevel::Debug),
                ..Options::default()
            },
        );

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.stdout.output);
    }

    #[test]
    fn half_configured_remote_is_ignored() {
        let config = Config::resolve(
            &env(&[("SHERLOG_STACKDRIVER_KEY_FILE", "/tmp/key")]),
            &Options::default(),
        );

        assert_eq!(config.remote.key_file, None);
        assert!(!config.remote.is_complete());
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = Config::resolve(
            &env(&[
                ("SHERLOG_LEVEL", "loud"),
                ("SHERLOG_MONITOR_LOGGING_MAX_CHANGE", "lots"),
            ]),
            &Options::default(),
        );

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.monitor.max_change, 0.1);
    }

    #[test]
    fn empty_paths_count_as_unset() {
        let config = Config::resolve(
            &env(&[("SHERLOG_HUMAN_LOG_PATH", "")]),
            &Options {
                json_log_path: Some(PathBuf::new()),
                ..Options::default()
            },
        );

        assert_eq!(config.human_log.path, None);
        assert_eq!(config.json_log.path, None);
    }
}
