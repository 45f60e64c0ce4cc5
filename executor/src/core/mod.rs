//! Deterministic, pure logic of the flow executor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod conditions;
pub mod conversation;
pub mod domain;
pub mod frames;
pub mod invariants;
pub mod patterns;
pub mod selector;
pub mod stack;
pub mod types;
