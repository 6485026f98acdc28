//! Filesystem and environment access behind a trait.
//!
//! The repository, configuration and build code only touch the host through
//! [`Runtime`], so they run against [`MockRuntime`] in unit tests and against
//! [`RealRuntime`] everywhere else.
//!
//! - `env` - home directory lookup
//! - `fs` - files and directory trees of the repository

mod env;
mod fs;

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    /// Home directory of the invoking user, used for `~/.dr.conf`.
    fn home_dir(&self) -> Option<PathBuf>;

    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Copy the tree under `from` to `to`, creating `to` as needed.
    fn copy_dir_all(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Entries of `path`, sorted by path.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        self.copy_impl(from, to)
    }

    fn copy_dir_all(&self, from: &Path, to: &Path) -> Result<()> {
        self.copy_dir_all_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.list_dir_impl(path)
    }
}
