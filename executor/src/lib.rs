//! Stack-based executor for structured conversational flows.
//!
//! Each call to [`turn::advance_flows`] interprets flow steps on top of a
//! dialogue stack until a single externally visible action is predicted. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (stack, routing, patterns,
//!   conversation state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (catalog, domain and state files,
//!   response generation). Isolated to enable scripted collaborators in tests.
//!
//! [`step`] interprets a single flow step and [`turn`] drives the loop for a
//! whole turn.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod flows;
pub mod io;
pub mod logging;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;
