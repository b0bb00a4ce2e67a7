//! Integration test suite for conductor.
//!
//! These tests drive whole batches through the conductor with a scripted
//! executor and check scheduling, failure handling, cancellation, context
//! flow and routing end to end.
//!
//! # Test Categories
//!
//! - `scheduling`: Planning, group order and concurrency
//! - `failures`: Retries, timeouts and blocked dependents
//! - `cancellation`: External cancellation and deadlines
//! - `context`: Context visibility between groups
//! - `routing`: Routing, registries, config and task files
//!
//! # CI Compatibility
//!
//! No test spawns an agent process; all execution goes through the mock.

mod fixtures;

mod cancellation;
mod context;
mod failures;
mod scheduling;
