//! CLI command implementations
//!
//! Each command returns the process exit code.

pub mod export;
pub mod status;
pub mod validate;

/// Exit codes shared by the commands
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const PARTIAL_FAILURE: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const CONNECTION: i32 = 4;
    pub const FATAL: i32 = 5;
    pub const INTERRUPTED: i32 = 130;
}
