//! Wiring of the collaborators a command needs.
//!
//! The context is built once per invocation from the loaded configuration
//! and the selected repository. It owns the concrete collaborators; the use
//! cases borrow them as trait objects.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use log::debug;

use crate::collab::{ChrootSandbox, DpkgDeb, GitMirror, GpgSigner};
use crate::config::Config;
use crate::package::{BuildPlanner, PackageRepository};
use crate::process::CommandRunner;
use crate::runtime::Runtime;
use crate::suite::{Reprepro, Suite, load_suites, repo_architectures};

pub struct Context<'a, R: Runtime, C: CommandRunner> {
    pub runtime: &'a R,
    pub config: Config,
    pub location: PathBuf,
    pub suites: Vec<Suite>,
    pub indexer: Reprepro<'a, C>,
    pub git: GitMirror<'a, C>,
    pub sandbox: ChrootSandbox<'a, C>,
    pub signer: GpgSigner<'a, C>,
    pub inspector: DpkgDeb<'a, C>,
}

impl<'a, R: Runtime, C: CommandRunner> Context<'a, R, C> {
    /// Open the repository `selected` by name or path, the configured
    /// default one when `None`.
    pub fn new(
        runtime: &'a R,
        runner: &'a C,
        config: Config,
        selected: Option<&str>,
    ) -> Result<Self> {
        let location = config.repository_location(selected)?;
        debug!("Using repository {:?}", location);

        if !runtime.is_dir(&location) {
            bail!("Repository {:?} does not exist", location);
        }

        let repo = PackageRepository::new(runtime, location.clone());

        let suites = load_suites(&repo)
            .with_context(|| format!("Failed to read the suites of {:?}", location))?;

        // Every suite of a repository is signed with the same key
        let key = suites
            .iter()
            .find_map(|s| s.sign_with.clone())
            .unwrap_or_default();

        Ok(Self {
            runtime,
            indexer: Reprepro::new(runner, &repo.archive_dir(), &repo.keyring_dir()),
            git: GitMirror::new(runner),
            sandbox: ChrootSandbox::new(runner, &repo.buildroots_dir()),
            signer: GpgSigner::new(runner, &repo.keyring_dir(), key),
            inspector: DpkgDeb::new(runner),
            config,
            location,
            suites,
        })
    }

    pub fn planner(&self) -> BuildPlanner {
        BuildPlanner::new(repo_architectures(&self.suites))
    }
}
