//! Coordination primitives.
//!
//! Stages run sequentially on one task; the only cross-task coordination is the shutdown signal
//! that stops the incremental polling loop.

pub mod shutdown;
