//! Remove action - deletes packages and single builds from the repository.

use std::path::PathBuf;

use log::{debug, info};

use super::publish::published_versions;
use crate::error::{Error, Result};
use crate::package::{PackageRepository, PkgVersion};
use crate::runtime::Runtime;
use crate::suite::{ArchiveIndexer, Suite, SuiteInventory};

/// Removes packages and builds
pub struct RemoveAction<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    suites: &'a [Suite],
    indexer: &'a dyn ArchiveIndexer,
}

impl<'a, R: Runtime> RemoveAction<'a, R> {
    pub fn new(
        runtime: &'a R,
        location: impl Into<PathBuf>,
        suites: &'a [Suite],
        indexer: &'a dyn ArchiveIndexer,
    ) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            suites,
            indexer,
        }
    }

    /// Remove a package with all its builds.
    ///
    /// A package published in any suite is only removed with `force`, and
    /// is then taken out of those suites first. Returns the suites it was
    /// taken out of.
    pub async fn remove_package(&self, package: &str, force: bool) -> Result<Vec<String>> {
        self.repo.require_package(package)?;

        let used = self.suites_using(package, |_| true).await?;
        let unpushed = self
            .release_suites(format!("Package '{}'", package), package, used, force)
            .await?;

        info!("Removing package {}", package);
        self.repo.remove_package(package)?;
        Ok(unpushed)
    }

    /// Remove a single build. Builds that are published somewhere need
    /// `force`, just like whole packages.
    pub async fn remove_build(
        &self,
        package: &str,
        version: &str,
        force: bool,
    ) -> Result<(PkgVersion, Vec<String>)> {
        self.repo.require_package(package)?;
        let version = self.repo.find_build(package, version)?;

        let used = self
            .suites_using(package, |inventory| inventory.contains_version(&version))
            .await?;
        let unpushed = self
            .release_suites(
                format!("Build {} of '{}'", version, package),
                package,
                used,
                force,
            )
            .await?;

        info!("Removing build {} of {}", version, package);
        self.repo.remove_build(package, &version)?;
        Ok((version, unpushed))
    }

    async fn suites_using<F>(&self, package: &str, uses: F) -> Result<Vec<&'a Suite>>
    where
        F: Fn(&SuiteInventory) -> bool,
    {
        let usage = published_versions(self.indexer, self.suites, package).await?;
        Ok(usage
            .into_iter()
            .filter(|(_, inventory)| !inventory.is_empty() && uses(inventory))
            .map(|(suite, _)| suite)
            .collect())
    }

    async fn release_suites(
        &self,
        what: String,
        package: &str,
        used: Vec<&'a Suite>,
        force: bool,
    ) -> Result<Vec<String>> {
        if used.is_empty() {
            return Ok(vec![]);
        }

        let names: Vec<String> = used.iter().map(|s| s.name.clone()).collect();
        if !force {
            return Err(Error::InUse { what, suites: names });
        }

        for suite in used {
            debug!("Unpushing {} from {}", package, suite.name);
            self.indexer
                .remove_source(suite.archive_id(), package)
                .await?;
        }
        Ok(names)
    }
}
