//! Stable exit codes for executor CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid input files, arguments or other errors.
pub const INVALID: i32 = 1;
/// `executor advance` aborted the turn because the step ceiling was exceeded.
pub const CIRCUIT_BREAKER: i32 = 2;
/// `executor advance` hit an invalid flow definition or dialogue stack.
pub const INTERPRETATION: i32 = 3;
