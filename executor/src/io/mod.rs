//! I/O helpers for executor commands.

pub mod config;
pub mod domain_store;
pub mod flows_store;
pub mod generator;
pub mod state_store;
