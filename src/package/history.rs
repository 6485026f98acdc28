//! Lookup of earlier builds by source revision.

use log::{debug, warn};

use super::{BuildMetadata, PkgVersion};
use crate::error::Result;

/// Read access to the build records of a package.
#[cfg_attr(test, mockall::automock)]
pub trait BuildStore {
    /// Build versions of `package`, newest first.
    fn history(&self, package: &str) -> Result<Vec<PkgVersion>>;
    fn build_metadata(&self, package: &str, version: &PkgVersion) -> Result<BuildMetadata>;
}

/// Finds builds that were made from a given source revision, so an
/// unchanged source does not get rebuilt.
pub struct RevisionTracker<'a, S: BuildStore> {
    store: &'a S,
}

impl<'a, S: BuildStore> RevisionTracker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The newest build of `package` made from `revision`, if any.
    ///
    /// Builds whose metadata cannot be read are skipped.
    pub fn find_existing_build(&self, package: &str, revision: &str) -> Result<Option<PkgVersion>> {
        for version in self.store.history(package)? {
            match self.store.build_metadata(package, &version) {
                Ok(meta) if meta.revision.as_deref() == Some(revision) => {
                    debug!("Build {} of {} matches revision {}", version, package, revision);
                    return Ok(Some(version));
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping build {} of {}: {}", version, package, e),
            }
        }
        Ok(None)
    }
}
