#![allow(dead_code)]

use std::sync::Arc;

use tickstep::{ManualClock, TickDispatcher, TimerScheduler};

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A scheduler coordinated by the calling thread, driven by a manual clock.
pub fn manual_scheduler() -> (Arc<TickDispatcher>, Arc<ManualClock>, TimerScheduler) {
    init_test_logging();

    let dispatcher = Arc::new(TickDispatcher::for_current_thread());
    let clock = Arc::new(ManualClock::new());
    let scheduler = TimerScheduler::new(dispatcher.clone(), clock.clone());

    (dispatcher, clock, scheduler)
}
