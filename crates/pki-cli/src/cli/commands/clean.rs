//! `pki clean` - Delete the root and leaf areas.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

use super::{success, Context};
use crate::cli::args::CleanArgs;

pub async fn execute(ctx: Context, args: CleanArgs) -> Result<()> {
    let storage = ctx.authority.config().storage_path.display().to_string();
    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "{} Delete every key and certificate under {storage}?",
                "Irreversible:".red().bold()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    ctx.authority.clean().await?;
    success(format!("Removed certificate authority at {storage}"));
    Ok(())
}
