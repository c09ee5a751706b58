//! `pki crl` - Regenerate the CRL.

use anyhow::Result;

use super::{success, Context};

pub async fn execute(ctx: Context) -> Result<()> {
    ctx.authority.generate_crl().await?;
    let revoked = ctx.authority.crl_revoked_serials().await?;
    success(format!(
        "Generated CRL with {} revoked certificate(s)",
        revoked.len()
    ));
    if ctx.verbose {
        for serial in &revoked {
            println!("  {serial}");
        }
    }
    Ok(())
}
