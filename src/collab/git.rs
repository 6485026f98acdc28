use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use std::fs::File;
use std::path::Path;

use crate::error::Result;
use crate::process::{CommandRunner, Invocation};

/// Source control holding the packaging sources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Update the mirror at `git_dir` from its origin.
    async fn fetch(&self, git_dir: &Path) -> Result<()>;
    /// Commit id `reference` points at, `None` for an unknown reference.
    async fn revision(&self, git_dir: &Path, reference: &str) -> Result<Option<String>>;
    /// Extract the tree of `reference` into `dest`.
    async fn archive(&self, git_dir: &Path, reference: &str, dest: &Path) -> Result<()>;
    async fn current_branch(&self, git_dir: &Path) -> Result<String>;
    async fn remote_url(&self, git_dir: &Path) -> Result<String>;
    /// Create a bare mirror of `url` at `dest`, with `branch` as its head.
    async fn clone_mirror(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;
}

/// [`SourceControl`] on bare git mirrors.
pub struct GitMirror<'a, C: CommandRunner> {
    runner: &'a C,
}

impl<'a, C: CommandRunner> GitMirror<'a, C> {
    pub fn new(runner: &'a C) -> Self {
        Self { runner }
    }

    fn git(git_dir: &Path) -> Invocation {
        Invocation::new("git").arg("--git-dir").path_arg(git_dir)
    }

    async fn output(&self, invocation: Invocation) -> Result<String> {
        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl<C: CommandRunner> SourceControl for GitMirror<'_, C> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, git_dir: &Path) -> Result<()> {
        info!("Pulling changes from origin");
        self.output(Self::git(git_dir).args(["--bare", "fetch", "origin"]))
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn revision(&self, git_dir: &Path, reference: &str) -> Result<Option<String>> {
        let invocation = Self::git(git_dir).args(["--bare", "rev-parse", "--verify", "--quiet"]);
        let invocation = invocation.arg(format!("{}^{{commit}}", reference));
        let output = self
            .runner
            .run(&invocation)
            .await?
            .check_status(&invocation, &[0, 1, 128])?;

        let revision = output.stdout.trim();
        if output.success() && !revision.is_empty() {
            Ok(Some(revision.to_string()))
        } else {
            debug!("Reference {} not found in {:?}", reference, git_dir);
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self))]
    async fn archive(&self, git_dir: &Path, reference: &str, dest: &Path) -> Result<()> {
        info!("Extracting the sources");
        let tarball = tempfile::Builder::new()
            .prefix("dr-source")
            .suffix(".tar")
            .tempfile()
            .context("Failed to create a temporary file")?;

        self.output(
            Self::git(git_dir)
                .args(["--bare", "archive", "--format", "tar", "--output"])
                .path_arg(tarball.path())
                .arg(reference),
        )
        .await?;

        let file = File::open(tarball.path())
            .with_context(|| format!("Failed to open {:?}", tarball.path()))?;
        tar::Archive::new(file)
            .unpack(dest)
            .with_context(|| format!("Failed to extract sources into {:?}", dest))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn current_branch(&self, git_dir: &Path) -> Result<String> {
        self.output(Self::git(git_dir).args(["--bare", "symbolic-ref", "--short", "HEAD"]))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn remote_url(&self, git_dir: &Path) -> Result<String> {
        self.output(Self::git(git_dir).args(["config", "--get", "remote.origin.url"]))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn clone_mirror(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        info!("Cloning {} ({})", url, branch);
        self.output(
            Invocation::new("git")
                .args(["clone", "--mirror", "--branch", branch, url])
                .path_arg(dest),
        )
        .await?;
        Ok(())
    }
}
