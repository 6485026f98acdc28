use anyhow::Result;
use log::debug;

use crate::application::{PackageKind, PackageSummary, QueryAction};
use crate::process::CommandRunner;
use crate::runtime::Runtime;
use crate::suite::Suite;

use super::context::Context;

/// List the packages of the repository, optionally only those in `suite`
#[tracing::instrument(skip(ctx))]
pub async fn list<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    suite: Option<&str>,
) -> Result<()> {
    let query = QueryAction::new(ctx.runtime, &ctx.location, &ctx.suites, &ctx.indexer, &ctx.git);
    let packages = query.packages(suite).await?;

    if packages.is_empty() {
        println!("No packages.");
        return Ok(());
    }

    debug!("Found {} package(s)", packages.len());
    for package in &packages {
        println!("{}", format_summary(package));
    }
    Ok(())
}

/// List the suites of the archive
pub fn suites<R: Runtime, C: CommandRunner>(ctx: &Context<'_, R, C>) -> Result<()> {
    for suite in &ctx.suites {
        println!("{}", format_suite(suite));
    }
    Ok(())
}

pub(crate) fn format_summary(package: &PackageSummary) -> String {
    let kind = match package.kind {
        PackageKind::Git => "git",
        PackageKind::Deb => "deb",
    };
    let latest = package
        .latest
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(no builds)".to_string());
    format!("{} [{}] {}", package.name, kind, latest)
}

pub(crate) fn format_suite(suite: &Suite) -> String {
    let mut line = suite.name.clone();
    if let Some(codename) = &suite.codename
        && codename != &suite.name
    {
        line.push_str(&format!(" ({})", codename));
    }
    if !suite.architectures.is_empty() {
        line.push_str(&format!(": {}", suite.architectures.join(" ")));
    }
    line
}
