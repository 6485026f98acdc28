use anyhow::Result;
use log::debug;

use crate::application::RemoveAction;
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;

/// Remove a package with all its builds
#[tracing::instrument(skip(ctx))]
pub async fn remove<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    force: bool,
) -> Result<()> {
    debug!("Removing {} force={}", package, force);
    let action = RemoveAction::new(ctx.runtime, &ctx.location, &ctx.suites, &ctx.indexer);

    let unpushed = action.remove_package(package, force).await?;
    print_unpushed(package, &unpushed);
    println!("Removed {}", package);
    Ok(())
}

/// Remove a single build of a package
#[tracing::instrument(skip(ctx))]
pub async fn remove_build<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    version: &str,
    force: bool,
) -> Result<()> {
    let action = RemoveAction::new(ctx.runtime, &ctx.location, &ctx.suites, &ctx.indexer);

    let (version, unpushed) = action.remove_build(package, version, force).await?;
    print_unpushed(package, &unpushed);
    println!("Removed build {} of {}", version, package);
    Ok(())
}

fn print_unpushed(package: &str, suites: &[String]) {
    for suite in suites {
        println!("Unpushed {} from {}", package, suite);
    }
}
