//! `pki init` - Bootstrap the storage root and the root CA.

use anyhow::Result;

use super::{success, Context};

pub async fn execute(ctx: Context) -> Result<()> {
    ctx.authority.init().await?;
    success(format!(
        "Initialized certificate authority at {}",
        ctx.authority.config().storage_path.display()
    ));
    if ctx.verbose {
        println!("  CRL: {}", ctx.authority.crl_path().display());
    }
    Ok(())
}
