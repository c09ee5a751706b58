//! `pki status` - Show the certificate state of a common name.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use pki_core::CertState;

use super::Context;
use crate::cli::args::CnArgs;

pub async fn execute(ctx: Context, args: CnArgs) -> Result<()> {
    let status = ctx.authority.status(&args.cn, Utc::now()).await?;
    let state = status.state.as_str();
    let state = match status.state {
        CertState::Ok => state.green(),
        CertState::Warn => state.yellow(),
        CertState::Expired | CertState::Revoked => state.red(),
        CertState::None => state.normal(),
    };

    match status.expires {
        Some(expires) => println!(
            "{}: {} (expires {})",
            args.cn,
            state.bold(),
            expires.format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("{}: {}", args.cn, state.bold()),
    }
    Ok(())
}
