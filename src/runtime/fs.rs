use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))
    }

    #[tracing::instrument(skip(self, contents), fields(len = contents.len()))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("Cannot write {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn rename_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| format!("Cannot move {:?} to {:?}", from, to))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_impl(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to).with_context(|| format!("Cannot copy {:?} to {:?}", from, to))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_dir_all_impl(&self, from: &Path, to: &Path) -> Result<()> {
        let entries = self.list_dir_impl(from)?;
        self.create_dir_all_impl(to)?;
        for entry in entries {
            let Some(name) = entry.file_name() else {
                continue;
            };
            let target = to.join(name);
            let file_type = fs::symlink_metadata(&entry)
                .with_context(|| format!("Cannot inspect {:?}", entry))?
                .file_type();
            if file_type.is_symlink() {
                let link = fs::read_link(&entry)
                    .with_context(|| format!("Cannot read link {:?}", entry))?;
                symlink(&link, &target)
                    .with_context(|| format!("Cannot link {:?} to {:?}", target, link))?;
            } else if file_type.is_dir() {
                self.copy_dir_all_impl(&entry, &target)?;
            } else {
                self.copy_impl(&entry, &target)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Cannot create directory {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        debug!("Removing {:?}", path);
        fs::remove_dir_all(path).with_context(|| format!("Cannot remove {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn list_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Cannot list {:?}", path))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("Cannot list {:?}", path))?;
        entries.sort();
        Ok(entries)
    }
}
