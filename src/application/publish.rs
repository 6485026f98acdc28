//! Publish action - pushes builds into suites and takes them out again.

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::package::{PackageRepository, PkgVersion};
use crate::runtime::Runtime;
use crate::suite::{ArchiveIndexer, PublishDecision, PublishGate, RemovalPlan, Suite, SuiteInventory};

/// Result of a push
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub suite: String,
    pub version: PkgVersion,
    /// The source's earlier packages were removed first
    pub replaced: bool,
    /// Binaries the suite does not list at `version` after the push
    pub missing: Vec<String>,
}

/// What each suite publishes of one source package.
pub async fn published_versions<'s>(
    indexer: &dyn ArchiveIndexer,
    suites: &'s [Suite],
    package: &str,
) -> Result<Vec<(&'s Suite, SuiteInventory)>> {
    let mut usage = Vec::with_capacity(suites.len());
    for suite in suites {
        let inventory = indexer.list_source(suite.archive_id(), package).await?;
        usage.push((suite, inventory));
    }
    Ok(usage)
}

pub struct PublishAction<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    suites: &'a [Suite],
    indexer: &'a dyn ArchiveIndexer,
    default_suite: String,
}

impl<'a, R: Runtime> PublishAction<'a, R> {
    pub fn new(
        runtime: &'a R,
        location: impl Into<PathBuf>,
        suites: &'a [Suite],
        indexer: &'a dyn ArchiveIndexer,
        default_suite: impl Into<String>,
    ) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            suites,
            indexer,
            default_suite: default_suite.into(),
        }
    }

    /// Push a build of `package` into a suite.
    ///
    /// Without `version` the newest build is pushed, without `suite` the
    /// default suite is used. A suite holding the same or a newer version
    /// refuses the push unless `force` is set, in which case the source's
    /// packages are removed from the suite first.
    pub async fn push(
        &self,
        package: &str,
        version: Option<&str>,
        suite: Option<&str>,
        force: bool,
    ) -> Result<PublishOutcome> {
        self.repo.require_package(package)?;

        let version = match version {
            Some(v) => self.repo.find_build(package, v)?,
            None => self.repo.history(package)?.into_iter().next().ok_or_else(|| {
                Error::not_found(format!("Builds of '{}' (run a build first)", package))
            })?,
        };
        self.repo.check_build(package, &version)?;

        let gate = PublishGate::new(self.suites);
        let suite_name = suite.unwrap_or(&self.default_suite);
        let target = gate.resolve_suite(suite_name)?;

        let binaries = self.repo.binary_names(package, &version)?;
        let inventory = self.indexer.list_source(target.archive_id(), package).await?;
        debug!("Pushing {:?} over {:?}", binaries, inventory);

        let decision = gate
            .can_publish(suite_name, &binaries, &version, &inventory, force)?
            .into_result(&target.name, &version)?;

        let replaced = if let PublishDecision::ReplaceExisting { conflicts } = &decision {
            for conflict in conflicts {
                warn!(
                    "The {} suite already contains {} version {}",
                    target.name, conflict.binary, conflict.published
                );
            }
            info!("Removing {} from {} before pushing", package, target.name);
            self.indexer
                .remove_source(target.archive_id(), package)
                .await?;
            true
        } else {
            false
        };

        let files = self.repo.build_files(package, &version)?;
        info!("Pushing {} version {} into {}", package, version, target.name);
        if let Err(e) = self.indexer.insert(target.archive_id(), &files).await {
            if replaced {
                return Err(Error::BuildFailure(format!(
                    "{} was removed from {} but pushing version {} failed: {}",
                    package, target.name, version, e
                )));
            }
            return Err(e);
        }

        let mut missing = Vec::new();
        for binary in &binaries {
            match self.indexer.query(target.archive_id(), binary).await? {
                Some(published) if published == version => {}
                published => {
                    warn!(
                        "{} lists {} at {:?} after pushing {}",
                        target.name, binary, published.map(|v| v.to_string()), version
                    );
                    missing.push(binary.clone());
                }
            }
        }

        Ok(PublishOutcome {
            suite: target.name.clone(),
            version,
            replaced,
            missing,
        })
    }

    /// Take every package of `package` out of `suite`.
    ///
    /// Unpushing a package the suite does not contain is a no-op.
    pub async fn unpush(&self, package: &str, suite: &str) -> Result<RemovalPlan> {
        self.repo.require_package(package)?;

        let gate = PublishGate::new(self.suites);
        let target = gate.resolve_suite(suite)?;
        let inventory = self.indexer.list_source(target.archive_id(), package).await?;
        let plan = gate.unpublish(suite, package, &inventory)?;

        if plan.is_empty() {
            info!("{} is not in {}", package, target.name);
            return Ok(plan);
        }

        info!("Removing {} from {}", package, target.name);
        self.indexer.remove_source(&plan.suite, package).await?;
        Ok(plan)
    }
}
