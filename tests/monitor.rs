mod common;

use std::time::Duration;

use common::{builder, remote_options, RecordingSink, Screen};
use sherlog::{LogLevel, MonitorState, Options, ProgressOptions, RunMode};

fn fast_monitor(options: Options) -> Options {
    Options {
        monitor_interval: Some(Duration::from_millis(10)),
        ..options
    }
}

#[tokio::test]
async fn monitor_line_is_redrawn_while_running() {
    let screen = Screen::default();
    let logger = builder(RunMode::Interactive, &screen, fast_monitor(Options::default())).build();

    logger.start_monitor();
    let monitor = logger.monitor().unwrap();
    assert_eq!(monitor.state(), MonitorState::Running);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let block = logger.live_block();
    assert_eq!(block.len(), 1);
    assert!(block[0].contains("CPU:"));
    assert!(block[0].contains("Memory:"));

    logger.stop_monitor();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(logger.monitor().is_none());
}

#[tokio::test]
async fn monitor_entries_reach_the_durable_sinks() {
    let screen = Screen::default();
    let recorder = RecordingSink::default();
    let logger = builder(
        RunMode::Interactive,
        &screen,
        fast_monitor(Options {
            monitor_max_interval: Some(Duration::ZERO),
            ..remote_options(LogLevel::Info)
        }),
    )
    .with_remote_sink(Box::new(recorder.clone()))
    .build();

    logger.start_monitor();
    tokio::time::sleep(Duration::from_millis(60)).await;
    logger.stop_monitor();

    let entries = recorder.entries();
    assert!(!entries.is_empty());
    assert_eq!(entries[0].level, LogLevel::Status);
    assert!(entries[0].message.starts_with("CPU: "));
    assert!(entries[0].meta.as_ref().unwrap().get("memory").is_some());
}

#[tokio::test]
async fn hidden_monitor_is_released_with_the_last_tracker() {
    let screen = Screen::default();
    let logger = builder(
        RunMode::Interactive,
        &screen,
        fast_monitor(Options {
            monitor_display: Some(false),
            ..Options::default()
        }),
    )
    .build();

    let tracker = logger.progress(ProgressOptions::named("copy").limit(2));
    let monitor = logger.monitor().unwrap();
    assert_eq!(monitor.state(), MonitorState::Running);

    tracker.tick();
    tracker.tick();

    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(logger.monitor().is_none());
    assert!(!logger.live_block().iter().any(|line| line.contains("CPU:")));
}

#[test]
fn monitor_without_runtime_still_renders() {
    let screen = Screen::default();
    let logger = builder(RunMode::Interactive, &screen, Options::default()).build();

    logger.start_monitor();
    let monitor = logger.monitor().unwrap();
    assert_eq!(monitor.state(), MonitorState::Idle);

    logger.info("hello");
    assert!(logger.live_block()[0].contains("CPU:"));
}

#[tokio::test]
async fn hidden_monitor_is_released_when_the_last_tracker_is_dropped() {
    let screen = Screen::default();
    let recorder = RecordingSink::default();
    let logger = builder(
        RunMode::Interactive,
        &screen,
        fast_monitor(Options {
            monitor_display: Some(false),
            monitor_max_interval: Some(Duration::ZERO),
            ..remote_options(LogLevel::Info)
        }),
    )
    .with_remote_sink(Box::new(recorder.clone()))
    .build();

    let tracker = logger.progress(ProgressOptions::named("copy").limit(10));
    let monitor = logger.monitor().unwrap();
    drop(tracker);

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(logger.monitor().is_none());
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert_eq!(logger.active_trackers(), 0);

    let written = recorder.entries().len();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(recorder.entries().len(), written);
    assert!(recorder.messages().iter().all(|m| !m.starts_with("CPU: ")));
}
