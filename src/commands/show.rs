use anyhow::Result;

use crate::application::{BuildRecord, PackageDetails, QueryAction};
use crate::process::CommandRunner;
use crate::runtime::Runtime;

use super::context::Context;
use super::list::format_summary;

/// Show a package, or the files of one of its builds when `version` is given
#[tracing::instrument(skip(ctx))]
pub async fn show<R: Runtime, C: CommandRunner>(
    ctx: &Context<'_, R, C>,
    package: &str,
    version: Option<&str>,
) -> Result<()> {
    let query = QueryAction::new(ctx.runtime, &ctx.location, &ctx.suites, &ctx.indexer, &ctx.git);

    if let Some(version) = version {
        let (version, files) = query.build_files(package, Some(version))?;
        println!("{} {}", package, version);
        for file in files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let details = query.show(package).await?;
    print!("{}", format_details(&details));
    Ok(())
}

/// Show the builds of a package, newest first
#[tracing::instrument(skip(ctx))]
pub fn history<R: Runtime, C: CommandRunner>(ctx: &Context<'_, R, C>, package: &str) -> Result<()> {
    let query = QueryAction::new(ctx.runtime, &ctx.location, &ctx.suites, &ctx.indexer, &ctx.git);
    let records = query.history(package)?;

    if records.is_empty() {
        println!("{} has no builds.", package);
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub(crate) fn format_record(record: &BuildRecord) -> String {
    let mut line = record.version.to_string();
    if let Some(branch) = &record.metadata.branch {
        line.push_str(&format!("  {}", branch));
    }
    if let Some(revision) = &record.metadata.revision {
        let short: String = revision.chars().take(7).collect();
        line.push_str(&format!("@{}", short));
    }
    line
}

pub(crate) fn format_details(details: &PackageDetails) -> String {
    let mut out = format!("{}\n", format_summary(&details.summary));

    if let Some(source) = &details.source {
        out.push_str(&format!("  source: {} ({})\n", source.url, source.branch));
    }
    if let Some(env) = &details.build_environment {
        out.push_str(&format!("  build environment: {}\n", env));
    }

    if details.published.is_empty() {
        out.push_str("  not published\n");
    }
    for (suite, inventory) in &details.published {
        let binaries: Vec<String> = inventory
            .iter()
            .map(|(binary, version)| format!("{} {}", binary, version))
            .collect();
        out.push_str(&format!("  {}: {}\n", suite, binaries.join(", ")));
    }

    out.push_str(&format!("  builds: {}\n", details.builds.len()));
    for record in &details.builds {
        out.push_str(&format!("    {}\n", format_record(record)));
    }
    out
}
