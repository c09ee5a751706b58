//! pki-web - certificate self-service portal

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pki-web", version, about = "Certificate self-service portal")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "PKI_CONFIG", default_value = "pki.toml")]
    config: PathBuf,

    /// Verbose logging (when RUST_LOG is unset)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let settings = pki_web::Settings::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    pki_web::server::run(&settings).await?;
    Ok(())
}
