//! Integration tests for the storage engine: durability, atomicity of
//! bulk writes, snapshot compaction, and recovery behavior across real
//! close-and-reopen cycles.

#[path = "../common/mod.rs"]
mod common;

mod snapshots;
