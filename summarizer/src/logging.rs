//! Diagnostic tracing for the summarizer.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate
//! from the session artifacts (plan, blackboard, iteration logs), which are
//! always written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// ```bash
/// RUST_LOG=summarizer=debug summarizer agent --patient-folder p --template t.txt
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
