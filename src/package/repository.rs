//! On-disk package repository.
//!
//! Layout below the repository location:
//!
//! ```text
//! archive/conf/distributions
//! gnupg-keyring/
//! buildroots/<env>-<arch>.tar.gz
//! metadata
//! packages/<name>/source               bare git mirror
//! packages/<name>/metadata             package configuration
//! packages/<name>/builds/<version>/    *.deb and .metadata
//! ```

use anyhow::Context;
use log::warn;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::runtime::Runtime;

use super::{BuildMetadata, BuildStore, PackageConfig, PkgVersion, RepoMetadata};

const METADATA_FILE: &str = ".metadata";

/// Repository of source packages and their builds.
pub struct PackageRepository<'a, R: Runtime> {
    runtime: &'a R,
    location: PathBuf,
}

impl<'a, R: Runtime> PackageRepository<'a, R> {
    pub fn new(runtime: &'a R, location: PathBuf) -> Self {
        Self { runtime, location }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    /// Returns: `<location>/archive`
    pub fn archive_dir(&self) -> PathBuf {
        self.location.join("archive")
    }

    /// Returns: `<location>/archive/conf/distributions`
    pub fn distributions_path(&self) -> PathBuf {
        self.archive_dir().join("conf").join("distributions")
    }

    /// Returns: `<location>/gnupg-keyring`
    pub fn keyring_dir(&self) -> PathBuf {
        self.location.join("gnupg-keyring")
    }

    /// Returns: `<location>/buildroots`
    pub fn buildroots_dir(&self) -> PathBuf {
        self.location.join("buildroots")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.location.join("packages")
    }

    /// Returns: `<location>/packages/<name>`
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    /// Returns: `<location>/packages/<name>/source`
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.package_dir(name).join("source")
    }

    /// Returns: `<location>/packages/<name>/builds`
    pub fn builds_dir(&self, name: &str) -> PathBuf {
        self.package_dir(name).join("builds")
    }

    /// Returns: `<location>/packages/<name>/builds/<version>`
    pub fn build_dir(&self, name: &str, version: &PkgVersion) -> PathBuf {
        self.builds_dir(name).join(version.to_string())
    }

    /// Scratch directory a build record is assembled in before it is moved
    /// into place. Hidden, so it never shows up in the history.
    pub fn staging_dir(&self, name: &str, version: &PkgVersion) -> PathBuf {
        self.builds_dir(name).join(format!(".{}.staging", version))
    }

    fn package_config_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join("metadata")
    }

    /// Names of all packages, sorted.
    pub fn list_packages(&self) -> Result<Vec<String>> {
        let mut names = self.dir_names(&self.packages_dir())?;
        names.sort();
        Ok(names)
    }

    pub fn package_exists(&self, name: &str) -> bool {
        self.runtime.is_dir(&self.package_dir(name))
    }

    /// Fail with `NotFound` unless the package exists.
    pub fn require_package(&self, name: &str) -> Result<()> {
        if self.package_exists(name) {
            Ok(())
        } else {
            Err(Error::not_found(format!("Package '{}'", name)))
        }
    }

    /// Whether the package is built from a git mirror.
    pub fn is_git_package(&self, name: &str) -> bool {
        self.runtime.is_dir(&self.source_dir(name))
    }

    /// Raw build directory names, used for collision checks.
    pub fn build_versions(&self, name: &str) -> Result<HashSet<String>> {
        Ok(self.dir_names(&self.builds_dir(name))?.into_iter().collect())
    }

    /// Build versions of a package, newest first.
    pub fn history(&self, name: &str) -> Result<Vec<PkgVersion>> {
        let mut versions = Vec::new();
        for entry in self.dir_names(&self.builds_dir(name))? {
            match PkgVersion::parse(&entry) {
                Ok(version) => versions.push(version),
                Err(e) => warn!("Ignoring build directory '{}' of {}: {}", entry, name, e),
            }
        }
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    pub fn build_exists(&self, name: &str, version: &PkgVersion) -> bool {
        self.runtime.is_dir(&self.build_dir(name, version))
    }

    /// Resolve a version string to a build of the package.
    pub fn find_build(&self, name: &str, version: &str) -> Result<PkgVersion> {
        let version = PkgVersion::parse(version)?;
        self.history(name)?
            .into_iter()
            .find(|v| *v == version)
            .ok_or_else(|| Error::not_found(format!("Build {} of '{}'", version, name)))
    }

    /// The `.deb` files of a build, sorted by file name.
    pub fn build_files(&self, name: &str, version: &PkgVersion) -> Result<Vec<PathBuf>> {
        let dir = self.build_dir(name, version);
        if !self.runtime.is_dir(&dir) {
            return Err(Error::not_found(format!("Build {} of '{}'", version, name)));
        }

        let mut files: Vec<PathBuf> = self
            .runtime
            .list_dir(&dir)?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "deb"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Binary package names produced by a build.
    pub fn binary_names(&self, name: &str, version: &PkgVersion) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .build_files(name, version)?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .map(crate::debian::binary_name)
            .collect();
        names.dedup();
        Ok(names)
    }

    /// A usable build holds at least one package file.
    pub fn check_build(&self, name: &str, version: &PkgVersion) -> Result<()> {
        if self.build_files(name, version)?.is_empty() {
            return Err(Error::BuildFailure(format!(
                "build {} of '{}' contains no .deb files",
                version, name
            )));
        }
        Ok(())
    }

    /// Metadata of a build. Builds without a metadata file get empty metadata.
    pub fn load_build_metadata(&self, name: &str, version: &PkgVersion) -> Result<BuildMetadata> {
        let path = self.build_dir(name, version).join(METADATA_FILE);
        if !self.runtime.exists(&path) {
            return Ok(BuildMetadata::default());
        }
        BuildMetadata::load(self.runtime, &path)
    }

    /// Write build metadata into `dir`, a build or staging directory.
    pub fn save_build_metadata(&self, dir: &Path, meta: &BuildMetadata) -> Result<()> {
        meta.save(self.runtime, &dir.join(METADATA_FILE))
    }

    /// Move an assembled staging directory into place as the build record.
    pub fn commit_build(&self, name: &str, version: &PkgVersion) -> Result<PathBuf> {
        let target = self.build_dir(name, version);
        if self.runtime.exists(&target) {
            return Err(Error::AlreadyExists(format!("Build {} of '{}'", version, name)));
        }
        self.runtime
            .rename(&self.staging_dir(name, version), &target)
            .with_context(|| format!("Failed to create build record {:?}", target))?;
        Ok(target)
    }

    pub fn package_config(&self, name: &str) -> Result<PackageConfig> {
        let path = self.package_config_path(name);
        if !self.runtime.exists(&path) {
            return Ok(PackageConfig::default());
        }
        let content = self.runtime.read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(PackageConfig::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))
    }

    pub fn save_package_config(&self, name: &str, config: &PackageConfig) -> Result<()> {
        let content = serde_yaml::to_string(config)?;
        self.runtime
            .write(&self.package_config_path(name), content.as_bytes())?;
        Ok(())
    }

    /// Repository-wide settings. A missing file yields the defaults.
    pub fn repo_metadata(&self) -> Result<RepoMetadata> {
        let path = self.location.join("metadata");
        if !self.runtime.exists(&path) {
            return Ok(RepoMetadata::default());
        }
        let content = self.runtime.read_to_string(&path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))
    }

    pub fn remove_build(&self, name: &str, version: &PkgVersion) -> Result<()> {
        let dir = self.build_dir(name, version);
        if !self.runtime.is_dir(&dir) {
            return Err(Error::not_found(format!("Build {} of '{}'", version, name)));
        }
        self.runtime.remove_dir_all(&dir)?;
        Ok(())
    }

    pub fn remove_package(&self, name: &str) -> Result<()> {
        self.require_package(name)?;
        self.runtime.remove_dir_all(&self.package_dir(name))?;
        Ok(())
    }

    /// Names of the visible subdirectories of `dir`. A missing `dir` is empty.
    fn dir_names(&self, dir: &Path) -> Result<Vec<String>> {
        if !self.runtime.exists(dir) {
            return Ok(vec![]);
        }

        let mut names = Vec::new();
        for entry in self.runtime.list_dir(dir)? {
            if let Some(name) = entry.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
                && self.runtime.is_dir(&entry)
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

impl<R: Runtime> BuildStore for PackageRepository<'_, R> {
    fn history(&self, package: &str) -> Result<Vec<PkgVersion>> {
        PackageRepository::history(self, package)
    }

    fn build_metadata(&self, package: &str, version: &PkgVersion) -> Result<BuildMetadata> {
        self.load_build_metadata(package, version)
    }
}
