mod common;

use common::{builder, Screen};
use sherlog::{LogLevel, Options, RunMode};

// The facade backend is process-global, so everything lives in one test.
#[test]
fn log_macros_route_through_the_logger() {
    let screen = Screen::default();
    let logger = builder(
        RunMode::Container,
        &screen,
        Options {
            level: Some(LogLevel::Debug),
            ..Options::default()
        },
    )
    .build();

    let handle = logger.clone();
    logger.init().unwrap();

    log::warn!("queue is backing up");
    log::trace!("too chatty");
    log::debug!("detail");

    let lines = screen.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[[ WARN ]] queue is backing up"));
    assert!(lines[1].contains("[[ DEBUG ]] detail"));

    handle.set_level(LogLevel::Silly);
    log::trace!("now visible");
    assert!(screen.lines()[2].contains("[[ SILLY ]] now visible"));
}
