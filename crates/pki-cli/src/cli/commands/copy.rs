//! `pki copy` - Copy a bundle out of the storage root.

use anyhow::Result;

use super::{success, Context};
use crate::cli::args::CopyArgs;

pub async fn execute(ctx: Context, args: CopyArgs) -> Result<()> {
    let written = ctx.authority.copy_bundle(&args.cn, &args.dest).await?;
    success(format!("Copied bundle to {}", written.display()));
    Ok(())
}
