use std::path::Path;

use anyhow::Result;

use crate::application::AddAction;
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;

fn action<'c, R: Runtime, C: CommandRunner>(ctx: &'c Context<'_, R, C>) -> AddAction<'c, R> {
    AddAction::new(
        ctx.runtime,
        &ctx.location,
        &ctx.git,
        &ctx.inspector,
        &ctx.signer,
    )
}

/// Add a package built from a git repository
#[tracing::instrument(skip(ctx))]
pub async fn add_git<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    url: &str,
    branch: &str,
    force: bool,
) -> Result<()> {
    let name = action(ctx).add_git(url, branch, force).await?;
    println!("Added {} from {} ({})", name, url, branch);
    Ok(())
}

/// Import a package file as a build
#[tracing::instrument(skip(ctx))]
pub async fn add_deb<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    file: &Path,
    force: bool,
) -> Result<()> {
    let (name, version) = action(ctx).add_deb(file, force).await?;
    println!("Added {} to build {} of {}", file.display(), version, name);
    Ok(())
}
