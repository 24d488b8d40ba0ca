//! Durable replication progress and the stage machine derived from it.

pub mod markers;
pub mod stage;
