//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pki_core::CertificateType;
use std::path::PathBuf;

/// Operator CLI for the SPARCS private certificate authority
///
/// Shares the storage root and lock with the portal, so it is safe to run
/// while the portal serves requests.
#[derive(Parser, Debug)]
#[command(name = "pki")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (or set PKI_CONFIG env var)
    #[arg(short, long, env = "PKI_CONFIG", default_value = "pki.toml", global = true)]
    pub config: PathBuf,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the storage root and the root CA
    Init,

    /// Delete the root and leaf areas. Irreversible.
    Clean(CleanArgs),

    /// Issue a certificate bundle
    Issue(IssueArgs),

    /// Revoke the certificate of a common name and regenerate the CRL
    Revoke(CnArgs),

    /// Regenerate the CRL
    Crl,

    /// Copy a bundle out of the storage root
    Copy(CopyArgs),

    /// Show the certificate state of a common name
    Status(CnArgs),

    /// Check that a bundle opens with a password
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CnArgs {
    /// Common name (user id or service name)
    #[arg(long)]
    pub cn: String,
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Common name (user id or service name)
    #[arg(long)]
    pub cn: String,

    /// Certificate profile
    #[arg(short = 't', long = "type", value_enum, default_value = "user")]
    pub kind: CertKind,

    /// Bundle password (prompted for when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Common name of the bundle
    #[arg(long)]
    pub cn: String,

    /// Destination file or directory
    #[arg(short, long, default_value = ".")]
    pub dest: PathBuf,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Common name of the bundle
    #[arg(long)]
    pub cn: String,

    /// Password to try
    #[arg(short, long)]
    pub password: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKind {
    User,
    Service,
}

impl From<CertKind> for CertificateType {
    fn from(kind: CertKind) -> Self {
        match kind {
            CertKind::User => Self::User,
            CertKind::Service => Self::Service,
        }
    }
}
