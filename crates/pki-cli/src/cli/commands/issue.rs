//! `pki issue` - Issue a certificate bundle.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Password;
use pki_core::CertificateType;

use super::{success, Context};
use crate::cli::args::IssueArgs;

pub async fn execute(ctx: Context, args: IssueArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Bundle password (empty uses the common name)")
            .with_confirmation("Repeat password", "Passwords do not match")
            .allow_empty_password(true)
            .interact()?,
    };

    let kind = CertificateType::from(args.kind);
    let issued = ctx
        .authority
        .issue(&args.cn, kind, Some(&password))
        .await?;

    success(format!(
        "Issued {} certificate for {}",
        issued.kind,
        issued.common_name.as_str().bold()
    ));
    println!("  Serial:  {}", issued.serial);
    println!("  Expires: {}", issued.expires.format("%Y-%m-%d %H:%M UTC"));
    println!("  Bundle:  {}", issued.bundle.display());
    Ok(())
}
