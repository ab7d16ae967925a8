//! Stable exit codes for compiler CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, configuration, or other local errors.
pub const INVALID: i32 = 1;
/// The completion service failed or stayed rate limited.
pub const SERVICE: i32 = 2;
/// `compiler find-element` got the no-response token back.
pub const NOT_FOUND: i32 = 3;
