//! Integration tests for the masterless strategy: asynchronous fan-out,
//! vector-clock conflict resolution, and startup anti-entropy, over real
//! TCP on loopback.

#[path = "../common/mod.rs"]
mod common;

mod replication;
