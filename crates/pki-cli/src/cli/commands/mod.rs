//! Command implementations.

pub mod clean;
pub mod copy;
pub mod crl;
pub mod init;
pub mod issue;
pub mod revoke;
pub mod status;
pub mod verify;

use colored::Colorize;
use pki_core::Authority;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Engine bound to the configured storage root
    pub authority: Authority,

    /// Verbose output
    pub verbose: bool,
}

/// Print a success line as `+ <message>`.
pub fn success(message: impl std::fmt::Display) {
    println!("{} {message}", "+".green().bold());
}
