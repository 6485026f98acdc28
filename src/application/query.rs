//! Read-only views of the repository.

use std::path::PathBuf;

use log::{debug, warn};

use super::publish::published_versions;
use crate::collab::SourceControl;
use crate::error::{Error, Result};
use crate::package::{BuildMetadata, PackageRepository, PkgVersion};
use crate::runtime::Runtime;
use crate::suite::{ArchiveIndexer, PublishGate, Suite, SuiteInventory};

/// How a package gets its builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// Built from a git mirror
    Git,
    /// Pre-built package files only
    Deb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageSummary {
    pub name: String,
    pub kind: PackageKind,
    pub latest: Option<PkgVersion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRecord {
    pub version: PkgVersion,
    pub metadata: BuildMetadata,
}

/// Where the sources of a git package come from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDetails {
    pub summary: PackageSummary,
    pub source: Option<SourceInfo>,
    pub build_environment: Option<String>,
    pub builds: Vec<BuildRecord>,
    /// Suite name and what it publishes, for suites holding the package
    pub published: Vec<(String, SuiteInventory)>,
}

pub struct QueryAction<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    suites: &'a [Suite],
    indexer: &'a dyn ArchiveIndexer,
    git: &'a dyn SourceControl,
}

impl<'a, R: Runtime> QueryAction<'a, R> {
    pub fn new(
        runtime: &'a R,
        location: impl Into<PathBuf>,
        suites: &'a [Suite],
        indexer: &'a dyn ArchiveIndexer,
        git: &'a dyn SourceControl,
    ) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            suites,
            indexer,
            git,
        }
    }

    pub fn suites(&self) -> &'a [Suite] {
        self.suites
    }

    /// All packages, or those published in `suite`.
    pub async fn packages(&self, suite: Option<&str>) -> Result<Vec<PackageSummary>> {
        let target = match suite {
            Some(name) => Some(PublishGate::new(self.suites).resolve_suite(name)?),
            None => None,
        };

        let mut packages = Vec::new();
        for name in self.repo.list_packages()? {
            if let Some(target) = target {
                let inventory = self.indexer.list_source(target.archive_id(), &name).await?;
                if inventory.is_empty() {
                    debug!("{} is not in {}", name, target.name);
                    continue;
                }
            }
            packages.push(self.summary(&name)?);
        }
        Ok(packages)
    }

    /// Builds of a package with their metadata, newest first.
    pub fn history(&self, package: &str) -> Result<Vec<BuildRecord>> {
        self.repo.require_package(package)?;

        let mut records = Vec::new();
        for version in self.repo.history(package)? {
            let metadata = match self.repo.load_build_metadata(package, &version) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Unreadable metadata of {} {}: {}", package, version, e);
                    BuildMetadata::default()
                }
            };
            records.push(BuildRecord { version, metadata });
        }
        Ok(records)
    }

    /// Package files of a build, the newest build when `version` is `None`.
    pub fn build_files(
        &self,
        package: &str,
        version: Option<&str>,
    ) -> Result<(PkgVersion, Vec<PathBuf>)> {
        self.repo.require_package(package)?;
        let version = match version {
            Some(v) => self.repo.find_build(package, v)?,
            None => self
                .repo
                .history(package)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found(format!("Builds of '{}'", package)))?,
        };
        let files = self.repo.build_files(package, &version)?;
        Ok((version, files))
    }

    /// Everything known about a package.
    pub async fn show(&self, package: &str) -> Result<PackageDetails> {
        let summary = self.summary(package)?;

        let source = if summary.kind == PackageKind::Git {
            let git_dir = self.repo.source_dir(package);
            Some(SourceInfo {
                url: self.git.remote_url(&git_dir).await?,
                branch: self.git.current_branch(&git_dir).await?,
            })
        } else {
            None
        };

        let build_environment = match self.repo.package_config(package)?.build_environment {
            Some(env) => Some(env),
            None => self.repo.repo_metadata()?.base_os,
        };

        let published = published_versions(self.indexer, self.suites, package)
            .await?
            .into_iter()
            .filter(|(_, inventory)| !inventory.is_empty())
            .map(|(suite, inventory)| (suite.name.clone(), inventory))
            .collect();

        Ok(PackageDetails {
            summary,
            source,
            build_environment,
            builds: self.history(package)?,
            published,
        })
    }

    fn summary(&self, name: &str) -> Result<PackageSummary> {
        self.repo.require_package(name)?;
        let kind = if self.repo.is_git_package(name) {
            PackageKind::Git
        } else {
            PackageKind::Deb
        };
        Ok(PackageSummary {
            name: name.to_string(),
            kind,
            latest: self.repo.history(name)?.into_iter().next(),
        })
    }
}
