use tracing::trace;

// Lightweight metrics helpers kept trace-based so the worker build stays lean.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "quotesync.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn task_processed(kind: &'static str, success: bool) {
    trace!(
        target = "quotesync.metrics",
        kind = kind,
        success = success,
        "task_processed"
    );
}
