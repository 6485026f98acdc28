//! Build use case - turns a branch of a git package into a signed build.
//!
//! Every selected architecture is compiled in its own build root. The
//! package files are collected in a staging directory next to the builds
//! and only moved into place once all of them were built and signed, so a
//! failed build never leaves a record behind.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info, warn};

use crate::collab::{BuildSandbox, Signer, SourceControl, with_build_root};
use crate::config::Config;
use crate::debian::{ControlFile, RebuildEntry, changelog_version, is_package_file};
use crate::error::{Error, Result};
use crate::package::{
    BuildMetadata, BuildPlanner, PackageRepository, PkgVersion, RevisionTracker, today,
};
use crate::pool::run_pool;
use crate::runtime::Runtime;

/// Distribution of rebuild changelog entries when the repository names no base OS
const DEFAULT_DISTRIBUTION: &str = "unstable";

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// A new build record was created
    Built(PkgVersion),
    /// A build of the same revision already exists
    Unchanged(PkgVersion),
}

impl BuildOutcome {
    pub fn version(&self) -> &PkgVersion {
        match self {
            BuildOutcome::Built(v) | BuildOutcome::Unchanged(v) => v,
        }
    }
}

/// What every architecture of one build shares.
struct BuildJob<'j> {
    package: &'j str,
    version: &'j PkgVersion,
    environment: &'j str,
    /// Root architecture-independent packages build in
    indep_arch: &'j str,
    sources: &'j Path,
    binaries: &'j [String],
    staging: &'j Path,
}

impl BuildJob<'_> {
    fn source_dir_name(&self) -> String {
        format!("{}-{}", self.package, self.version.upstream)
    }
}

pub struct BuildUseCase<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    config: &'a Config,
    planner: BuildPlanner,
    git: &'a dyn SourceControl,
    sandbox: &'a dyn BuildSandbox,
    signer: &'a dyn Signer,
}

impl<'a, R: Runtime> BuildUseCase<'a, R> {
    pub fn new(
        runtime: &'a R,
        location: impl Into<PathBuf>,
        config: &'a Config,
        planner: BuildPlanner,
        git: &'a dyn SourceControl,
        sandbox: &'a dyn BuildSandbox,
        signer: &'a dyn Signer,
    ) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            config,
            planner,
            git,
            sandbox,
            signer,
        }
    }

    /// Build `package` from `branch`, the mirror's default branch when
    /// `None`.
    ///
    /// A revision that was built before is not built again unless `force`
    /// is set.
    pub async fn build(
        &self,
        package: &str,
        branch: Option<&str>,
        force: bool,
    ) -> Result<BuildOutcome> {
        let runtime = self.repo.runtime();
        self.repo.require_package(package)?;
        if !self.repo.is_git_package(package) {
            return Err(Error::BuildFailure(format!(
                "'{}' has no git sources to build from",
                package
            )));
        }

        let git_dir = self.repo.source_dir(package);
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.git.current_branch(&git_dir).await?,
        };

        self.git.fetch(&git_dir).await?;
        let revision = self
            .git
            .revision(&git_dir, &branch)
            .await?
            .ok_or_else(|| Error::not_found(format!("Branch '{}' of '{}'", branch, package)))?;
        info!("Building {} from {} at {}", package, branch, revision);

        if !force
            && let Some(existing) =
                RevisionTracker::new(&self.repo).find_existing_build(package, &revision)?
        {
            info!("Build {} was made from the same revision", existing);
            return Ok(BuildOutcome::Unchanged(existing));
        }

        let workdir = tempfile::Builder::new()
            .prefix("dr-build")
            .tempdir()
            .context("Failed to create a temporary directory")?;
        let sources = workdir.path().join("src");
        runtime.create_dir_all(&sources)?;
        self.git.archive(&git_dir, &branch, &sources).await?;

        let version = self.prepare_sources(package, &sources, &revision)?;
        info!("Build version {}", version);

        let control =
            ControlFile::parse(&runtime.read_to_string(&sources.join("debian").join("control"))?)?;
        let environment = self.build_environment(package)?;
        let planner = self.environment_planner(&environment)?;
        let arches = planner.select_architectures(&control.architectures)?;
        let indep_arch = planner
            .architectures()
            .first()
            .cloned()
            .unwrap_or_else(|| "all".to_string());

        let staging = self.repo.staging_dir(package, &version);
        if runtime.exists(&staging) {
            runtime.remove_dir_all(&staging)?;
        }
        runtime.create_dir_all(&staging)?;

        let job = BuildJob {
            package,
            version: &version,
            environment: &environment,
            indep_arch: &indep_arch,
            sources: &sources,
            binaries: &control.packages,
            staging: &staging,
        };
        let committed = match self.assemble(&job, arches, &branch, &revision).await {
            Ok(()) => self.repo.commit_build(package, &version),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            if let Err(cleanup) = runtime.remove_dir_all(&staging) {
                warn!("Failed to remove {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }

        info!("Build {} of {} is ready", version, package);
        Ok(BuildOutcome::Built(version))
    }

    /// Allocate the build version and record the rebuild in the changelog.
    fn prepare_sources(&self, package: &str, sources: &Path, revision: &str) -> Result<PkgVersion> {
        let runtime = self.repo.runtime();
        let changelog_path = sources.join("debian").join("changelog");
        if !runtime.exists(&changelog_path) {
            return Err(Error::not_found(format!("debian/changelog of '{}'", package)));
        }

        let changelog = runtime.read_to_string(&changelog_path)?;
        let source_version = changelog_version(&changelog, package)?;
        let version = self.planner.plan_version(
            &source_version,
            today(),
            &self.repo.build_versions(package)?,
        )?;

        let distribution = self
            .repo
            .repo_metadata()?
            .base_os
            .unwrap_or_else(|| DEFAULT_DISTRIBUTION.to_string());
        let rendered = version.to_string();
        let entry = RebuildEntry {
            package,
            version: &rendered,
            distribution: &distribution,
            revision,
            maintainer: &self.config.maintainer,
            date: Local::now().fixed_offset(),
        };
        runtime.write(&changelog_path, entry.prepend_to(&changelog).as_bytes())?;

        Ok(version)
    }

    /// The package's own build environment, else the repository's base OS.
    fn build_environment(&self, package: &str) -> Result<String> {
        let id = match self.repo.package_config(package)?.build_environment {
            Some(id) => id,
            None => self.repo.repo_metadata()?.base_os.ok_or_else(|| {
                Error::not_found(format!(
                    "Build environment of '{}' (set base-os in the repository metadata)",
                    package
                ))
            })?,
        };
        Ok(id)
    }

    /// The planner for `environment`. Environments without configured
    /// architectures build for every repository architecture.
    fn environment_planner(&self, environment: &str) -> Result<BuildPlanner> {
        match self.config.build_environment(environment) {
            Ok(env) => {
                debug!("Building in {} ({})", env.name, environment);
                if env.arches.is_empty() {
                    Ok(self.planner.clone())
                } else {
                    self.planner.restricted_to(environment, &env.arches)
                }
            }
            Err(_) => {
                debug!("Building in {}", environment);
                Ok(self.planner.clone())
            }
        }
    }

    /// Build every architecture into the staging directory, then sign the
    /// results and write the build metadata.
    async fn assemble(
        &self,
        job: &BuildJob<'_>,
        arches: Vec<String>,
        branch: &str,
        revision: &str,
    ) -> Result<()> {
        let results = run_pool(arches, self.config.workers, |arch| self.build_arch(job, arch)).await;

        let mut files = Vec::new();
        for result in results {
            files.extend(result?);
        }
        files.sort();
        files.dedup();

        for file in &files {
            self.signer.sign(file).await?;
        }
        self.repo
            .save_build_metadata(job.staging, &BuildMetadata::new(branch, revision))
    }

    async fn build_arch(&self, job: &BuildJob<'_>, arch: String) -> Result<Vec<PathBuf>> {
        let root_arch = if arch == "all" {
            job.indep_arch.to_string()
        } else {
            arch.clone()
        };
        info!("Building {} {} for {}", job.package, job.version, arch);

        with_build_root(self.sandbox, job.environment, &root_arch, |root| {
            self.compile(job, root, &arch)
        })
        .await
    }

    async fn compile(&self, job: &BuildJob<'_>, root: PathBuf, arch: &str) -> Result<Vec<PathBuf>> {
        let runtime = self.repo.runtime();
        let dir_name = job.source_dir_name();
        let build_dir = root.join(&dir_name);
        runtime.copy_dir_all(job.sources, &build_dir)?;

        let orig = root.join(format!(
            "{}_{}.orig.tar.gz",
            job.package, job.version.upstream
        ));
        write_orig_tarball(&build_dir, &dir_name, &orig)?;

        self.sandbox.execute(&root, "apt-get update\n").await?;
        self.sandbox
            .execute(
                &root,
                &format!(
                    "dpkg-source -b \"/{dir}\"\n\
                     mk-build-deps *.dsc -i -t \"apt-get --no-install-recommends -y\"\n\
                     rm -rf {pkg}-build-deps_*\n",
                    dir = dir_name,
                    pkg = job.package
                ),
            )
            .await?;
        self.sandbox
            .execute(&root, &format!("cd \"/{}\"\ndebuild -i -uc -us -b\n", dir_name))
            .await?;

        let pattern = root.join("*.deb");
        let produced = glob::glob(&pattern.to_string_lossy())
            .context("Invalid package file pattern")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to list the built packages")?;

        let file_version = job.version.render(false);
        let names: Vec<String> = produced
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        for binary in job.binaries {
            if !names
                .iter()
                .any(|name| is_package_file(name, binary, &file_version))
            {
                return Err(Error::BuildFailure(format!(
                    "{} {} was not built for {}",
                    binary, file_version, arch
                )));
            }
        }

        let mut staged = Vec::with_capacity(produced.len());
        for (file, name) in produced.iter().zip(&names) {
            let target = job.staging.join(name);
            debug!("Collecting {}", name);
            runtime.copy(file, &target)?;
            staged.push(target);
        }
        Ok(staged)
    }
}

/// Pack the upstream part of a source tree, everything but `.git` and
/// `debian`, under `prefix/`. Symlinks are stored as links.
fn write_orig_tarball(source: &Path, prefix: &str, tarball: &Path) -> Result<()> {
    let file =
        File::create(tarball).with_context(|| format!("Failed to create {:?}", tarball))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    let mut entries = std::fs::read_dir(source)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name == ".git" || name == "debian" {
            continue;
        }
        let path = entry.path();
        let archived = Path::new(prefix).join(&name);
        if entry.file_type()?.is_dir() {
            builder.append_dir_all(&archived, &path)?;
        } else {
            builder.append_path_with_name(&path, &archived)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{BuildRoot, MockBuildSandbox, MockSigner, MockSourceControl};
    use crate::process::ProcessOutput;
    use crate::runtime::RealRuntime;
    use flate2::read::GzDecoder;
    use mockall::predicate::{always, eq};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const REVISION: &str = "abc123def4567890";

    const CHANGELOG: &str = "\
widget (1.0-1) unstable; urgency=low

  * Initial release

 -- Someone <someone@example.com>  Mon, 1 Jan 2024 10:00:00 +0000
";

    const CONTROL: &str = "\
Source: widget
Maintainer: Someone <someone@example.com>

Package: widget
Architecture: any

Package: widget-doc
Architecture: all
";

    fn make_repo() -> TempDir {
        let dir = tempdir().unwrap();
        let package = dir.path().join("packages/widget");
        fs::create_dir_all(package.join("source")).unwrap();
        fs::create_dir_all(package.join("builds")).unwrap();
        fs::write(dir.path().join("metadata"), "base-os: wheezy\n").unwrap();
        dir
    }

    fn git() -> MockSourceControl {
        let mut git = MockSourceControl::new();
        git.expect_current_branch()
            .returning(|_| Ok("master".to_string()));
        git.expect_fetch().returning(|_| Ok(()));
        git.expect_revision()
            .with(always(), eq("master"))
            .returning(|_, _| Ok(Some(REVISION.to_string())));
        git.expect_revision().returning(|_, _| Ok(None));
        git.expect_archive().returning(|_, _, dest| {
            fs::create_dir_all(dest.join("debian")).unwrap();
            fs::create_dir_all(dest.join("src")).unwrap();
            fs::write(dest.join("debian/changelog"), CHANGELOG).unwrap();
            fs::write(dest.join("debian/control"), CONTROL).unwrap();
            fs::write(dest.join("src/widget.c"), "int main() { return 0; }\n").unwrap();
            Ok(())
        });
        git
    }

    /// A sandbox handing out build roots under `roots`. The build step
    /// leaves package files for the names in `built`.
    fn sandbox(roots: &Path, built: &'static [&'static str]) -> MockBuildSandbox {
        let base = roots.to_path_buf();
        let mut sandbox = MockBuildSandbox::new();
        sandbox.expect_open().returning(move |_, arch| {
            let root = base.join(arch);
            fs::create_dir_all(&root).unwrap();
            Ok(BuildRoot::new(root))
        });
        sandbox.expect_execute().returning(move |root, script| {
            if script.contains("debuild") {
                let arch = root.file_name().unwrap().to_string_lossy().into_owned();
                let version = format!("1.0-1.{}", today());
                for name in built {
                    let file_arch = if name.ends_with("-doc") { "all" } else { arch.as_str() };
                    fs::write(
                        root.join(format!("{}_{}_{}.deb", name, version, file_arch)),
                        b"deb",
                    )
                    .unwrap();
                }
            }
            Ok(ProcessOutput::ok(""))
        });
        sandbox.expect_release().returning(|_| Ok(()));
        sandbox
    }

    fn config() -> Config {
        Config {
            workers: 2,
            ..Default::default()
        }
    }

    fn planner() -> BuildPlanner {
        BuildPlanner::new(vec!["amd64".to_string(), "armhf".to_string()])
    }

    #[test_log::test(tokio::test)]
    async fn test_build_creates_signed_record() {
        let repo = make_repo();
        let roots = tempdir().unwrap();
        let git = git();
        let sandbox = sandbox(roots.path(), &["widget", "widget-doc"]);
        let mut signer = MockSigner::new();
        signer
            .expect_sign()
            .withf(|p| p.to_string_lossy().contains(".staging"))
            .times(3)
            .returning(|_| Ok(()));

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        let outcome = use_case.build("widget", None, false).await.unwrap();
        let version = format!("1.0-1.{}", today());
        assert_eq!(outcome, BuildOutcome::Built(PkgVersion::parse(&version).unwrap()));

        let record = repo.path().join("packages/widget/builds").join(&version);
        let mut files: Vec<String> = fs::read_dir(&record)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                ".metadata".to_string(),
                format!("widget-doc_{}_all.deb", version),
                format!("widget_{}_amd64.deb", version),
                format!("widget_{}_armhf.deb", version),
            ]
        );

        let metadata = fs::read_to_string(record.join(".metadata")).unwrap();
        assert!(metadata.contains("branch: master"));
        assert!(metadata.contains(REVISION));

        let changelog =
            fs::read_to_string(roots.path().join("amd64/widget-1.0/debian/changelog")).unwrap();
        assert!(changelog.starts_with(&format!("widget ({}) wheezy; urgency=low", version)));
        assert!(changelog.contains("updated to revision abc123d."));
        assert!(changelog.contains("widget (1.0-1) unstable"));
    }

    #[tokio::test]
    async fn test_environment_limits_architectures() {
        let repo = make_repo();
        let roots = tempdir().unwrap();
        let git = git();
        let sandbox = sandbox(roots.path(), &["widget", "widget-doc"]);
        let mut signer = MockSigner::new();
        signer.expect_sign().times(2).returning(|_| Ok(()));

        let mut config = config();
        config.build_environments.insert(
            "wheezy".to_string(),
            crate::config::BuildEnvironment {
                name: "Raspbian Wheezy".to_string(),
                arches: vec!["armhf".to_string()],
            },
        );
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        let outcome = use_case.build("widget", None, false).await.unwrap();
        let version = outcome.version().to_string();
        let record = repo.path().join("packages/widget/builds").join(&version);
        assert!(record.join(format!("widget_{}_armhf.deb", version)).is_file());
        assert!(record.join(format!("widget-doc_{}_all.deb", version)).is_file());
        assert!(!record.join(format!("widget_{}_amd64.deb", version)).exists());
        assert!(!roots.path().join("amd64").exists());
    }

    #[tokio::test]
    async fn test_orig_tarball_leaves_out_packaging() {
        let roots = tempdir().unwrap();
        let repo = make_repo();
        let git = git();
        let sandbox = sandbox(roots.path(), &["widget", "widget-doc"]);
        let mut signer = MockSigner::new();
        signer.expect_sign().returning(|_| Ok(()));

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );
        use_case.build("widget", Some("master"), false).await.unwrap();

        let tarball = File::open(roots.path().join("armhf/widget_1.0.orig.tar.gz")).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(tarball));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n == "widget-1.0/src/widget.c"));
        assert!(!names.iter().any(|n| n.contains("debian")));
    }

    #[test]
    fn test_orig_tarball_stores_symlinks_as_links() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("widget-1.0");
        fs::create_dir_all(source.join("a")).unwrap();
        fs::write(source.join("a/widget.c"), "int main;").unwrap();
        std::os::unix::fs::symlink("..", source.join("a/up")).unwrap();
        std::os::unix::fs::symlink("missing-upstream-file", source.join("dangling")).unwrap();

        let tarball = dir.path().join("widget_1.0.orig.tar.gz");
        write_orig_tarball(&source, "widget-1.0", &tarball).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tarball).unwrap()));
        let mut links = Vec::new();
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            if entry.header().entry_type().is_symlink() {
                let target = entry.link_name().unwrap().unwrap().to_string_lossy().into_owned();
                links.push((name.clone(), target));
            }
            names.push(name);
        }

        links.sort();
        assert_eq!(
            links,
            [
                ("widget-1.0/a/up".to_string(), "..".to_string()),
                (
                    "widget-1.0/dangling".to_string(),
                    "missing-upstream-file".to_string()
                ),
            ]
        );
        assert!(names.iter().all(|n| !n.contains("up/a")));
    }

    #[tokio::test]
    async fn test_same_revision_is_not_rebuilt() {
        let repo = make_repo();
        let existing = repo.path().join("packages/widget/builds/1.0-1.20240102");
        fs::create_dir_all(&existing).unwrap();
        fs::write(
            existing.join(".metadata"),
            format!("branch: master\nrevision: {}\n", REVISION),
        )
        .unwrap();

        let mut git = MockSourceControl::new();
        git.expect_fetch().returning(|_| Ok(()));
        git.expect_revision()
            .returning(|_, _| Ok(Some(REVISION.to_string())));
        git.expect_archive().never();
        let sandbox = MockBuildSandbox::new();
        let signer = MockSigner::new();

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        let outcome = use_case.build("widget", Some("master"), false).await.unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Unchanged(PkgVersion::parse("1.0-1.20240102").unwrap())
        );
    }

    #[tokio::test]
    async fn test_unknown_branch() {
        let repo = make_repo();
        let git = git();
        let sandbox = MockBuildSandbox::new();
        let signer = MockSigner::new();

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        let err = use_case
            .build("widget", Some("feature"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_package_without_sources() {
        let repo = make_repo();
        fs::create_dir_all(repo.path().join("packages/blob/builds/1.0")).unwrap();
        let git = MockSourceControl::new();
        let sandbox = MockBuildSandbox::new();
        let signer = MockSigner::new();

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        assert!(matches!(
            use_case.build("blob", None, false).await,
            Err(Error::BuildFailure(_))
        ));
        assert!(matches!(
            use_case.build("missing", None, false).await,
            Err(Error::NotFound(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_package_file_leaves_no_record() {
        let repo = make_repo();
        let roots = tempdir().unwrap();
        let git = git();
        let sandbox = sandbox(roots.path(), &["widget"]);
        let mut signer = MockSigner::new();
        signer.expect_sign().never();

        let config = config();
        let runtime = RealRuntime;
        let use_case = BuildUseCase::new(
            &runtime,
            repo.path(),
            &config,
            planner(),
            &git,
            &sandbox,
            &signer,
        );

        let err = use_case.build("widget", None, false).await.unwrap_err();
        assert!(matches!(err, Error::BuildFailure(_)));
        assert!(err.to_string().contains("widget-doc"));

        let leftovers = fs::read_dir(repo.path().join("packages/widget/builds"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }
}
