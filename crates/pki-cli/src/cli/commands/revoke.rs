//! `pki revoke` - Revoke a certificate and regenerate the CRL.

use anyhow::Result;

use super::{success, Context};
use crate::cli::args::CnArgs;

pub async fn execute(ctx: Context, args: CnArgs) -> Result<()> {
    let entry = ctx.authority.revoke(&args.cn).await?;
    success(format!("Revoked {} (serial {})", args.cn, entry.serial));
    Ok(())
}
