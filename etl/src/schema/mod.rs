//! Comparison of captured schema versions.

pub mod diff;
