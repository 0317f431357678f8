//! Deterministic, pure logic shared by the summarizer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; the
//! oracle and the filesystem only appear in [`crate::io`] and the
//! orchestration modules.

pub mod blackboard;
pub mod budget;
pub mod document;
pub mod merge;
pub mod plan;
pub mod reasoning;
pub mod template;
pub mod tool_call;
