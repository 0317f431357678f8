//! Stable exit codes for summarizer CLI commands.

/// Command succeeded (agent finished by sentinel or empty plan).
pub const OK: i32 = 0;
/// Missing template or patient folder, or an invalid config file.
pub const INVALID: i32 = 1;
/// Oracle, tool transport, session timeout or other runtime failure.
pub const FAILED: i32 = 2;
/// `summarizer agent` stopped at `max_iterations`.
pub const INCOMPLETE: i32 = 3;
