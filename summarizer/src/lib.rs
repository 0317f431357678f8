//! Clinical summary template completion driven by a local language model.
//!
//! Two entry points share one oracle abstraction:
//!
//! - [`complete::complete_template`] folds each patient document into each
//!   fragment of a fixed template, keeping the template's labels intact.
//! - [`agent::run_agent`] runs a plan-and-dispatch loop in which the oracle
//!   chooses file tools one step at a time.
//!
//! The layout mirrors a strict separation:
//!
//! - **[`core`]**: pure, deterministic logic (chunking, merging, plan and tool
//!   call parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: side effects (filesystem, HTTP oracle, tool transports),
//!   isolated behind traits so tests can script them.

pub mod agent;
pub mod complete;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
