// Runs as its own binary: it owns RUST_LOG and the global subscriber.
use std::env;

use federa_server::observability::{apply_logging_level, current_filter, init_tracing_with_level};
use tracing_subscriber::EnvFilter;

fn directives(level: &str) -> String {
    EnvFilter::new(level).to_string()
}

#[test]
fn rust_log_wins_over_configured_level() {
    unsafe {
        env::set_var("RUST_LOG", "warn");
    }
    init_tracing_with_level("info");
    assert_eq!(current_filter(), Some(directives("warn")));

    assert!(!apply_logging_level("debug"));
    assert_eq!(current_filter(), Some(directives("warn")));

    unsafe {
        env::remove_var("RUST_LOG");
    }
    assert!(apply_logging_level("debug"));
    assert_eq!(current_filter(), Some(directives("debug")));
}
