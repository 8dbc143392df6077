mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use common::{builder, remote_options, Screen};
use sherlog::{Channel, LogLevel, LogSink, MessageOptions, Options, Record, RunMode};

/// A collector that panics on every record.
struct PanickingSink;

impl LogSink for PanickingSink {
    fn write_log(&self, _record: &Record) -> eyre::Result<()> {
        panic!("collector exploded");
    }

    fn flush(&self) {}
}

// The panic hook is process-global, so everything lives in one test.
#[test]
fn captured_panics_are_logged_until_released() {
    let screen = Screen::default();
    let logger = builder(RunMode::Container, &screen, Options::default()).build();

    logger.capture_panics();
    let result = catch_unwind(|| panic!("disk on fire"));
    assert!(result.is_err());

    let logged = screen.writes();
    let text = screen.lines().join("\n");
    assert!(logged >= 1);
    assert!(text.contains("[[ ERROR ]] Unhandled panic"));
    assert!(text.contains("disk on fire"));

    logger.release_panics();
    let result = catch_unwind(|| panic!("after release"));
    assert!(result.is_err());
    assert_eq!(screen.writes(), logged);

    // A sink panicking mid-write must not wedge the hook on the live region.
    let live_screen = Screen::default();
    let live = builder(
        RunMode::Interactive,
        &live_screen,
        remote_options(LogLevel::Info),
    )
    .with_remote_sink(Box::new(PanickingSink))
    .build();

    live.capture_panics();
    let result = catch_unwind(AssertUnwindSafe(|| live.error("boom")));
    assert!(result.is_err());
    live.release_panics();

    live.status(
        "still drawing",
        &MessageOptions::with_channels([Channel::Console]),
    );
    assert_eq!(live.retained_status().as_deref(), Some("still drawing"));
}
