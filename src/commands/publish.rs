use anyhow::Result;

use crate::application::PublishAction;
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;

/// Push a build into a suite
#[tracing::instrument(skip(ctx))]
pub async fn push<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    version: Option<&str>,
    suite: Option<&str>,
    force: bool,
) -> Result<()> {
    let action = publisher(ctx);
    let outcome = action.push(package, version, suite, force).await?;

    if outcome.replaced {
        println!("Replaced {} in {}", package, outcome.suite);
    }
    println!("Pushed {} {} into {}", package, outcome.version, outcome.suite);
    for binary in &outcome.missing {
        println!(
            "Warning: {} does not list {} {}",
            outcome.suite, binary, outcome.version
        );
    }
    Ok(())
}

/// Take a package out of a suite
#[tracing::instrument(skip(ctx))]
pub async fn unpush<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    suite: &str,
) -> Result<()> {
    let action = publisher(ctx);
    let plan = action.unpush(package, suite).await?;

    if plan.is_empty() {
        println!("{} is not in {}", package, suite);
    } else {
        println!("Removed {} from {}", plan.binaries.join(", "), suite);
    }
    Ok(())
}

fn publisher<'c, R: Runtime, C: CommandRunner>(
    ctx: &'c Context<'_, R, C>,
) -> PublishAction<'c, R> {
    PublishAction::new(
        ctx.runtime,
        &ctx.location,
        &ctx.suites,
        &ctx.indexer,
        ctx.config.default_suite.as_str(),
    )
}
