//! `pki verify` - Check that a bundle opens with a password.

use anyhow::Result;

use super::{success, Context};
use crate::cli::args::VerifyArgs;

pub async fn execute(ctx: Context, args: VerifyArgs) -> Result<()> {
    ctx.authority.verify_bundle(&args.cn, &args.password).await?;
    success(format!("Bundle for {} opens with the given password", args.cn));
    Ok(())
}
