use serde_json::{json, Map, Value};
use yansi::Paint;

use crate::utils::{local_timestamp, render_data, utc_timestamp};

use super::{LogFormatter, LogLevel, Record};

/// Console lines for a watched terminal: a colored level badge, continuation
/// lines indented under it, then the structured data.
pub struct ConsoleFormatter {
    use_ansi: bool,
}

impl ConsoleFormatter {
    pub fn new(use_ansi: bool) -> Self {
        Self { use_ansi }
    }

    fn badge(&self, level: LogLevel) -> String {
        let label = format!(" {} ", level.as_str().to_uppercase());
        if !self.use_ansi {
            return label;
        }

        match level {
            LogLevel::Error => label.black().on_red().to_string(),
            LogLevel::Warn => label.black().on_yellow().to_string(),
            LogLevel::Info => label.black().on_blue().to_string(),
            LogLevel::Verbose => label.black().on_green().to_string(),
            LogLevel::Debug => label.black().on_magenta().to_string(),
            LogLevel::Status | LogLevel::Silly => label,
        }
    }

    fn data_line(&self, line: &str) -> String {
        if self.use_ansi {
            line.yellow().to_string()
        } else {
            line.to_string()
        }
    }
}

impl LogFormatter for ConsoleFormatter {
    fn format(&self, record: &Record) -> String {
        let badge = self.badge(record.level);
        let indent = " ".repeat(record.level.as_str().len() + 2);

        let mut lines: Vec<String> = record
            .message
            .lines()
            .enumerate()
            .map(|(index, chunk)| {
                if index == 0 {
                    format!("{} {}", badge, chunk)
                } else {
                    format!("{} {}", indent, chunk)
                }
            })
            .collect();

        if let Some(data) = record.data.filter(|d| has_content(d)) {
            lines.extend(render_data(data).lines().map(|l| self.data_line(l)));
        }

        lines.join("\n")
    }
}

/// Console lines for a detached process: one timestamped line per message
/// line, e.g. `2010-06-08T12:00:00.000Z [[ INFO ]] Something happened`.
pub struct ContainerFormatter;

impl LogFormatter for ContainerFormatter {
    fn format(&self, record: &Record) -> String {
        let timestamp = utc_timestamp();
        let level = record.level.as_str().to_uppercase();

        let mut lines: Vec<String> = record
            .message
            .lines()
            .map(|chunk| format!("{} [[ {} ]] {}", timestamp, level, chunk))
            .collect();

        if let Some(data) = record.data.filter(|d| has_content(d)) {
            lines.push(serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()));
        }

        lines.join("\n")
    }
}

/// Plain text for the human log file.
pub struct HumanFormatter {
    datetime_format: String,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFormatter for HumanFormatter {
    fn format(&self, record: &Record) -> String {
        let mut line = format!(
            "[{}] {}: {}",
            local_timestamp(&self.datetime_format),
            record.level.as_str().to_uppercase(),
            record.message
        );

        if let Some(data) = record.data.filter(|d| has_content(d)) {
            for data_line in render_data(data).lines() {
                line.push_str("\n    ");
                line.push_str(data_line);
            }
        }

        line
    }
}

/// One JSON object per line.
pub struct JsonFormatter;

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &Record) -> String {
        let mut object = Map::new();
        object.insert("timestamp".into(), utc_timestamp().into());
        object.insert("level".into(), record.level.as_str().into());
        object.insert("message".into(), record.message.into());
        object.insert(
            "data".into(),
            record.data.cloned().unwrap_or_else(|| json!({})),
        );
        object.insert(
            "meta".into(),
            record.meta.cloned().unwrap_or_else(|| json!({})),
        );

        Value::Object(object).to_string()
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(level: LogLevel, message: &'a str, data: Option<&'a Value>) -> Record<'a> {
        Record {
            level,
            message,
            data,
            meta: None,
        }
    }

    #[test]
    fn console_indents_continuation_lines_under_the_badge() {
        let formatted = ConsoleFormatter::new(false).format(&record(
            LogLevel::Warn,
            "first\nsecond",
            None,
        ));

        assert_eq!(formatted, " WARN  first\n       second");
    }

    #[test]
    fn console_appends_data_block() {
        let data = json!({ "attempt": 3 });
        let formatted =
            ConsoleFormatter::new(false).format(&record(LogLevel::Info, "retrying", Some(&data)));

        assert_eq!(formatted, " INFO  retrying\nattempt: 3");
    }

    #[test]
    fn container_prefixes_every_line() {
        let formatted = ContainerFormatter.format(&record(LogLevel::Error, "a\nb", None));
        let lines: Vec<&str> = formatted.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[[ ERROR ]] a"));
        assert!(lines[1].ends_with("[[ ERROR ]] b"));
    }

    #[test]
    fn json_carries_data_and_meta() {
        let data = json!({ "id": 7 });
        let meta = json!({ "host": "box" });
        let formatted = JsonFormatter.format(&Record {
            level: LogLevel::Verbose,
            message: "hello",
            data: Some(&data),
            meta: Some(&meta),
        });

        let parsed: Value = serde_json::from_str(&formatted).unwrap();
        assert_eq!(parsed["level"], "verbose");
        assert_eq!(parsed["message"], "hello");
        assert_eq!(parsed["data"]["id"], 7);
        assert_eq!(parsed["meta"]["host"], "box");
    }

    #[test]
    fn human_lines_name_the_level() {
        let formatted = HumanFormatter::new().format(&record(LogLevel::Info, "ready", None));
        assert!(formatted.ends_with("] INFO: ready"));
    }
}
