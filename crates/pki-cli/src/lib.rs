//! # pki-cli
//!
//! Operator command-line interface for the private certificate authority.
//! Every subcommand maps onto one lifecycle operation of [`pki_core::Authority`]
//! and shares the storage root and global lock with the portal.

pub mod cli;

pub use cli::run;
