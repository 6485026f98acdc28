//! Source packages and their builds.
//!
//! This module covers version handling, allocation of new build versions,
//! the on-disk build history and the lookup of builds by source revision.

mod history;
mod meta;
mod planner;
mod repository;
mod version;

pub use history::{BuildStore, RevisionTracker};
pub use meta::{BuildMetadata, PackageConfig, RepoMetadata};
pub use planner::{BuildPlanner, today};
pub use repository::PackageRepository;
pub use version::PkgVersion;

#[cfg(test)]
pub use history::MockBuildStore;
