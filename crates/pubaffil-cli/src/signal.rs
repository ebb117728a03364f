//! Ctrl-C handling for batch runs.

use pubaffil_ingestion::StopHandle;
use tracing::warn;

/// Exit status after a second interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Finish the current query, then stop.
    StopAfterQuery,
    /// Abort immediately.
    Exit,
}

/// What the `count`-th interrupt (1-based) does.
pub fn on_interrupt(count: u32, stop: &StopHandle) -> InterruptAction {
    if count <= 1 {
        warn!("Interrupt received, stopping after the current query (press Ctrl-C again to abort)");
        stop.request_stop();
        InterruptAction::StopAfterQuery
    } else {
        warn!("Second interrupt received, aborting");
        InterruptAction::Exit
    }
}

/// Listen for Ctrl-C until the process exits.
pub fn spawn_interrupt_listener(stop: StopHandle) {
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            if on_interrupt(count, &stop) == InterruptAction::Exit {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    });
}
