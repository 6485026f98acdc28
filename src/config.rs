//! Tool configuration.
//!
//! Configuration is read from YAML files (`/etc/dr.conf`, then
//! `~/.dr.conf`); later files override earlier ones. The resulting value is
//! built once and handed to the components that need it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

pub const SYSTEM_CONFIG: &str = "/etc/dr.conf";
pub const USER_CONFIG: &str = ".dr.conf";

const DEFAULT_SUITE: &str = "testing";
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_MAINTAINER: &str = "Repository Builder <builder@localhost>";

/// A build environment: the base distribution build roots are made from.
/// Other keys of an environment entry are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildEnvironment {
    pub name: String,
    /// Architectures the environment has build roots for, empty for all
    #[serde(default)]
    pub arches: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RepositoryEntry {
    name: String,
    location: PathBuf,
}

/// On-disk shape of a configuration file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    repositories: Vec<RepositoryEntry>,
    default_repo: Option<String>,
    default_suite: Option<String>,
    workers: Option<usize>,
    maintainer: Option<String>,
    #[serde(default)]
    build_environments: BTreeMap<String, BuildEnvironment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Repository name -> location
    pub repositories: BTreeMap<String, PathBuf>,
    pub default_repo: Option<String>,
    /// Suite used by `push` when none is given
    pub default_suite: String,
    /// Size of the per-build worker pool
    pub workers: usize,
    /// Signs the changelog entries of automated rebuilds
    pub maintainer: String,
    pub build_environments: BTreeMap<String, BuildEnvironment>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories: BTreeMap::new(),
            default_repo: None,
            default_suite: DEFAULT_SUITE.to_string(),
            workers: DEFAULT_WORKERS,
            maintainer: DEFAULT_MAINTAINER.to_string(),
            build_environments: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Default configuration file locations, lowest priority first.
    pub fn default_locations<R: Runtime>(runtime: &R) -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(SYSTEM_CONFIG)];
        if let Some(home) = runtime.home_dir() {
            locations.push(home.join(USER_CONFIG));
        }
        locations
    }

    /// Load and merge the given files. Missing files are skipped.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, locations: &[PathBuf]) -> Result<Self> {
        let mut config = Config::default();

        for path in locations {
            if !runtime.exists(path) {
                debug!("Config file {:?} not found, skipping", path);
                continue;
            }
            debug!("Loading config from {:?}", path);
            let content = runtime.read_to_string(path)?;
            let file: ConfigFile = serde_yaml::from_str(&content)
                .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?;
            config.merge(file, path, runtime.home_dir().as_deref())?;
        }

        Ok(config)
    }

    fn merge(&mut self, file: ConfigFile, path: &Path, home: Option<&Path>) -> Result<()> {
        for repo in file.repositories {
            self.repositories
                .insert(repo.name, expand_home(&repo.location, home));
        }

        if let Some(default_repo) = file.default_repo {
            if !self.repositories.contains_key(&default_repo) {
                return Err(Error::parse(
                    path.display().to_string(),
                    format!("default repo '{}' doesn't exist", default_repo),
                ));
            }
            self.default_repo = Some(default_repo);
        }

        if let Some(suite) = file.default_suite {
            self.default_suite = suite;
        }

        if let Some(workers) = file.workers {
            if workers == 0 {
                return Err(Error::parse(
                    path.display().to_string(),
                    "workers must be at least 1",
                ));
            }
            self.workers = workers;
        }

        if let Some(maintainer) = file.maintainer {
            self.maintainer = maintainer;
        }

        self.build_environments.extend(file.build_environments);
        Ok(())
    }

    /// Resolve the repository to operate on.
    ///
    /// `selected` is either a configured repository name or a path. Without
    /// a selection the default repository is used.
    pub fn repository_location(&self, selected: Option<&str>) -> Result<PathBuf> {
        match selected {
            Some(name) => Ok(self
                .repositories
                .get(name)
                .cloned()
                .unwrap_or_else(|| PathBuf::from(name))),
            None => self
                .default_repo
                .as_ref()
                .and_then(|name| self.repositories.get(name))
                .cloned()
                .ok_or_else(|| Error::not_found("Default repository (use --repo)")),
        }
    }

    pub fn build_environment(&self, id: &str) -> Result<&BuildEnvironment> {
        self.build_environments
            .get(id)
            .ok_or_else(|| Error::not_found(format!("Build environment '{}'", id)))
    }
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
