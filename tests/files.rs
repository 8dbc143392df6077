mod common;

use common::{builder, Screen};
use serde_json::{json, Value};
use sherlog::{LogLevel, MessageOptions, Options, RunMode};

#[test]
fn human_and_json_files_receive_durable_records() {
    let dir = tempfile::tempdir().unwrap();
    let human = dir.path().join("human.log");
    let json_log = dir.path().join("json.log");

    let screen = Screen::default();
    let logger = builder(
        RunMode::Interactive,
        &screen,
        Options {
            human_log_path: Some(human.clone()),
            json_log_path: Some(json_log.clone()),
            json_log_level: Some(LogLevel::Debug),
            ..Options::default()
        },
    )
    .build();

    logger.debug("only in json");
    logger.log(
        LogLevel::Warn,
        "Disk almost full",
        &MessageOptions::new()
            .logging_message("disk usage high")
            .data(json!({ "free": "2 GB" }))
            .meta(json!({ "mount": "/" })),
    );
    logger.flush();

    let human_text = std::fs::read_to_string(&human).unwrap();
    assert!(!human_text.contains("only in json"));
    assert!(human_text.contains("WARN: disk usage high"));
    assert!(human_text.contains("    free: 2 GB"));

    let entries: Vec<Value> = std::fs::read_to_string(&json_log)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["level"], "debug");
    assert_eq!(entries[1]["message"], "disk usage high");
    assert_eq!(entries[1]["data"]["free"], "2 GB");
    assert_eq!(entries[1]["meta"]["mount"], "/");
}

#[test]
fn unopenable_file_disables_only_that_sink() {
    let dir = tempfile::tempdir().unwrap();
    let screen = Screen::default();
    let logger = builder(
        RunMode::Container,
        &screen,
        Options {
            human_log_path: Some(dir.path().join("missing").join("human.log")),
            ..Options::default()
        },
    )
    .build();

    logger.error("console still works");

    assert_eq!(screen.writes(), 1);
    assert_eq!(logger.sink_failures(), 0);
}

#[test]
fn interactive_status_goes_to_files_but_not_to_scrollback() {
    let dir = tempfile::tempdir().unwrap();
    let human = dir.path().join("human.log");

    let screen = Screen::default();
    let logger = builder(
        RunMode::Interactive,
        &screen,
        Options {
            human_log_path: Some(human.clone()),
            ..Options::default()
        },
    )
    .build();

    logger.status("indexing", &MessageOptions::default());
    logger.flush();

    assert_eq!(screen.lines(), vec!["indexing".to_string()]);
    assert!(std::fs::read_to_string(&human)
        .unwrap()
        .contains("STATUS: indexing"));
}
