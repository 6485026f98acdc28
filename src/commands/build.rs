use anyhow::Result;

use crate::application::{BuildOutcome, BuildUseCase};
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;

/// Build a git package
#[tracing::instrument(skip(ctx))]
pub async fn build<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    branch: Option<&str>,
    force: bool,
) -> Result<()> {
    let use_case = BuildUseCase::new(
        ctx.runtime,
        &ctx.location,
        &ctx.config,
        ctx.planner(),
        &ctx.git,
        &ctx.sandbox,
        &ctx.signer,
    );

    match use_case.build(package, branch, force).await? {
        BuildOutcome::Built(version) => println!("Built {} {}", package, version),
        BuildOutcome::Unchanged(version) => println!(
            "{} {} was built from the same revision, use --force to rebuild",
            package, version
        ),
    }
    Ok(())
}
