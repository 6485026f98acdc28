use anyhow::Context;
use async_trait::async_trait;
use log::{info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation, ProcessOutput};

/// An opened build root. The directory lives until the root is released.
#[derive(Debug)]
pub struct BuildRoot {
    path: PathBuf,
    _dir: Option<TempDir>,
}

impl BuildRoot {
    /// A build root at a fixed location.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _dir: None,
        }
    }

    fn temporary(dir: TempDir) -> Self {
        Self {
            path: dir.path().to_path_buf(),
            _dir: Some(dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Isolated environments packages are compiled in.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildSandbox: Send + Sync {
    /// Prepare a fresh build root of `environment` for `arch`.
    async fn open(&self, environment: &str, arch: &str) -> Result<BuildRoot>;
    /// Run a shell script inside the build root at `root`. Fails with
    /// `BuildFailure` when the script does.
    async fn execute(&self, root: &Path, script: &str) -> Result<ProcessOutput>;
    async fn release(&self, root: BuildRoot) -> Result<()>;
}

/// Open a build root, run `f` with its path and release the root again,
/// whether `f` succeeded or not.
pub async fn with_build_root<S, F, Fut, T>(
    sandbox: &S,
    environment: &str,
    arch: &str,
    f: F,
) -> Result<T>
where
    S: BuildSandbox + ?Sized,
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let root = sandbox.open(environment, arch).await?;
    let result = f(root.path().to_path_buf()).await;
    let released = sandbox.release(root).await;

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!("Failed to release the build root: {}", release_err);
            Err(e)
        }
    }
}

/// [`BuildSandbox`] on chroots unpacked from pre-built tarballs
/// (`<buildroots>/<environment>-<arch>.tar.gz`). Needs sudo.
pub struct ChrootSandbox<'a, C: CommandRunner> {
    runner: &'a C,
    buildroots_dir: PathBuf,
}

impl<'a, C: CommandRunner> ChrootSandbox<'a, C> {
    pub fn new(runner: &'a C, buildroots_dir: &Path) -> Self {
        Self {
            runner,
            buildroots_dir: buildroots_dir.to_path_buf(),
        }
    }

    pub fn archive_path(&self, environment: &str, arch: &str) -> PathBuf {
        self.buildroots_dir
            .join(format!("{}-{}.tar.gz", environment, arch))
    }

    async fn run_checked(&self, invocation: Invocation) -> Result<ProcessOutput> {
        self.runner.run(&invocation).await?.check(&invocation)
    }

    async fn cleanup(&self, root: &Path) -> Result<()> {
        let umount = Invocation::sudo("chroot")
            .path_arg(root)
            .args(["umount", "-f", "/proc"]);
        let output = self.runner.run(&umount).await?;
        if !output.success() {
            warn!("Unmounting /proc in {:?} failed: {}", root, output.tail(3));
        }

        info!("Cleaning up the build root");
        self.run_checked(Invocation::sudo("rm").arg("-rf").path_arg(root))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<C: CommandRunner> BuildSandbox for ChrootSandbox<'_, C> {
    #[tracing::instrument(skip(self))]
    async fn open(&self, environment: &str, arch: &str) -> Result<BuildRoot> {
        let archive = self.archive_path(environment, arch);
        if !archive.exists() {
            return Err(Error::not_found(format!(
                "Build root {} (bootstrap it first)",
                archive.display()
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("dr-buildroot")
            .tempdir()
            .context("Failed to create the build root directory")?;
        let root = BuildRoot::temporary(dir);

        info!("Preparing the build root");
        self.run_checked(
            Invocation::sudo("tar")
                .args(["xz", "-C"])
                .path_arg(root.path())
                .arg("-f")
                .path_arg(&archive),
        )
        .await?;

        info!("Mounting the /proc file system");
        let mounted = self
            .run_checked(
                Invocation::sudo("chroot")
                    .path_arg(root.path())
                    .args(["mount", "-t", "proc", "none", "/proc"]),
            )
            .await;
        if let Err(e) = mounted {
            if let Err(cleanup_err) = self.cleanup(root.path()).await {
                warn!("Failed to clean up the build root: {}", cleanup_err);
            }
            return Err(e);
        }

        Ok(root)
    }

    #[tracing::instrument(skip(self, script))]
    async fn execute(&self, root: &Path, script: &str) -> Result<ProcessOutput> {
        self.run_checked(
            Invocation::sudo("chroot")
                .path_arg(root)
                .args(["/bin/sh", "-e"])
                .stdin(script),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, root: BuildRoot) -> Result<()> {
        self.cleanup(root.path()).await
    }
}
