//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;
use colored::Colorize;
use pki_core::{Authority, PkiConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = PkiConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    debug!(
        config = %cli.config.display(),
        storage = %config.storage_path.display(),
        openssl = %config.openssl.display(),
        "configuration loaded"
    );

    let ctx = commands::Context {
        authority: Authority::with_openssl(config),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Init => commands::init::execute(ctx).await,
        Commands::Clean(args) => commands::clean::execute(ctx, args).await,
        Commands::Issue(args) => commands::issue::execute(ctx, args).await,
        Commands::Revoke(args) => commands::revoke::execute(ctx, args).await,
        Commands::Crl => commands::crl::execute(ctx).await,
        Commands::Copy(args) => commands::copy::execute(ctx, args).await,
        Commands::Status(args) => commands::status::execute(ctx, args).await,
        Commands::Verify(args) => commands::verify::execute(ctx, args).await,
    }
}

/// Print a failed command as `- <message>` on stderr.
pub fn report(error: &anyhow::Error) {
    eprintln!("{} {error:#}", "-".red().bold());
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}
