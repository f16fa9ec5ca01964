//! Resolution engine: adapter orchestration, merging, and batch execution.

pub mod batch;
pub mod engine;
pub mod merge;

pub use batch::resolve_batch;
pub use engine::ResolutionEngine;
