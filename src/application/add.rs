//! Add action - brings new packages into the repository.

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info};

use crate::collab::{PackageInspector, Signer, SourceControl, source_identity};
use crate::debian::ControlFile;
use crate::error::{Error, Result};
use crate::package::{PackageRepository, PkgVersion};
use crate::runtime::Runtime;

pub struct AddAction<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    git: &'a dyn SourceControl,
    inspector: &'a dyn PackageInspector,
    signer: &'a dyn Signer,
}

impl<'a, R: Runtime> AddAction<'a, R> {
    pub fn new(
        runtime: &'a R,
        location: impl Into<PathBuf>,
        git: &'a dyn SourceControl,
        inspector: &'a dyn PackageInspector,
        signer: &'a dyn Signer,
    ) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            git,
            inspector,
            signer,
        }
    }

    /// Add a package built from a git repository.
    ///
    /// The package is named after the `Source` of its `debian/control`.
    /// With `force` the mirror of an existing package is replaced, its
    /// builds are kept.
    pub async fn add_git(&self, url: &str, branch: &str, force: bool) -> Result<String> {
        let runtime = self.repo.runtime();
        let packages_dir = self.repo.packages_dir();
        runtime.create_dir_all(&packages_dir)?;

        // Next to the packages so the mirror can be moved into place
        let workdir = tempfile::Builder::new()
            .prefix(".add-")
            .tempdir_in(&packages_dir)
            .context("Failed to create a temporary directory")?;
        let mirror = workdir.path().join("git");
        let checkout = workdir.path().join("src");

        self.git.clone_mirror(url, branch, &mirror).await?;
        runtime.create_dir_all(&checkout)?;
        self.git.archive(&mirror, branch, &checkout).await?;

        let control_path = checkout.join("debian").join("control");
        if !runtime.exists(&control_path) {
            return Err(Error::not_found(format!(
                "Debian packaging files in {} ({})",
                url, branch
            )));
        }
        let control = ControlFile::parse(&runtime.read_to_string(&control_path)?)?;
        let name = control.source;
        debug!("{} provides the {} source package", url, name);

        let source_dir = self.repo.source_dir(&name);
        if self.repo.package_exists(&name) {
            if !force {
                return Err(Error::AlreadyExists(format!("Package '{}'", name)));
            }
            if runtime.exists(&source_dir) {
                info!("Replacing the sources of {}", name);
                runtime.remove_dir_all(&source_dir)?;
            }
        }

        runtime.create_dir_all(&self.repo.builds_dir(&name))?;
        runtime
            .rename(&mirror, &source_dir)
            .with_context(|| format!("Failed to move the mirror to {:?}", source_dir))?;

        info!("Added package {} from {}", name, url);
        Ok(name)
    }

    /// Import a pre-built package file as a build of its source package.
    pub async fn add_deb(&self, file: &Path, force: bool) -> Result<(String, PkgVersion)> {
        let runtime = self.repo.runtime();
        if !runtime.exists(file) {
            return Err(Error::not_found(format!("{:?}", file)));
        }
        let file_name = file
            .file_name()
            .ok_or_else(|| Error::parse(file.display().to_string(), "not a file"))?;

        let (name, version) = source_identity(self.inspector, file).await?;
        let version = PkgVersion::parse(&version)?;

        let dir = self.repo.build_dir(&name, &version);
        let target = dir.join(file_name);
        if runtime.exists(&target) && !force {
            return Err(Error::AlreadyExists(format!(
                "{} in build {} of '{}'",
                file_name.to_string_lossy(),
                version,
                name
            )));
        }

        // Signed next to the packages and only then moved into the record
        let packages_dir = self.repo.packages_dir();
        runtime.create_dir_all(&packages_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix(".import-")
            .tempdir_in(&packages_dir)
            .context("Failed to create a temporary directory")?;
        let staged_dir = workdir.path().join("build");
        runtime.create_dir_all(&staged_dir)?;
        let staged = staged_dir.join(file_name);

        info!("Adding {:?} to build {} of {}", file_name, version, name);
        runtime.copy(file, &staged)?;
        self.signer.sign(&staged).await?;

        if self.repo.build_exists(&name, &version) {
            runtime.rename(&staged, &target)?;
        } else {
            info!("Creating build {} of {}", version, name);
            runtime.create_dir_all(&self.repo.builds_dir(&name))?;
            runtime
                .rename(&staged_dir, &dir)
                .with_context(|| format!("Failed to create build record {:?}", dir))?;
        }

        Ok((name, version))
    }
}
