use anyhow::Result;

use crate::application::ConfigureAction;
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;

/// Pin or reset the build environment of a package
#[tracing::instrument(skip(ctx))]
pub fn set_env<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    environment: Option<&str>,
) -> Result<()> {
    let action = ConfigureAction::new(ctx.runtime, &ctx.location, &ctx.config);
    action.set_build_environment(package, environment)?;

    match environment {
        Some(id) => println!("{} builds in {}", package, id),
        None => println!("{} builds in the repository's base OS", package),
    }
    Ok(())
}
