//! Build version allocation and architecture selection.

use std::collections::HashSet;

use chrono::Local;
use log::debug;

use super::PkgVersion;
use crate::error::{Error, Result};

/// Today's date as a `YYYYMMDD` number.
pub fn today() -> u32 {
    Local::now()
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default()
}

/// Plans the version and target architectures of a new build.
///
/// The planner works on an explicit list of the architectures the
/// repository supports, taken from the suite configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildPlanner {
    architectures: Vec<String>,
}

impl BuildPlanner {
    pub fn new(architectures: Vec<String>) -> Self {
        Self { architectures }
    }

    pub fn architectures(&self) -> &[String] {
        &self.architectures
    }

    /// A planner limited to the repository architectures a build
    /// environment provides roots for.
    pub fn restricted_to(&self, environment: &str, supported: &[String]) -> Result<Self> {
        let architectures: Vec<String> = self
            .architectures
            .iter()
            .filter(|a| supported.contains(a))
            .cloned()
            .collect();
        if architectures.is_empty() {
            return Err(Error::BuildFailure(format!(
                "build environment {} [{}] shares no architecture with this repository [{}]",
                environment,
                supported.join(" "),
                self.architectures.join(" ")
            )));
        }
        Ok(Self { architectures })
    }

    /// Allocate the next free build version for `source_version`.
    ///
    /// `existing` holds the rendered versions of the builds already present
    /// for the package. Collisions are resolved by bumping the build number.
    pub fn plan_version(
        &self,
        source_version: &str,
        today: u32,
        existing: &HashSet<String>,
    ) -> Result<PkgVersion> {
        let mut version = PkgVersion::parse(source_version)?;
        version.add_build_tag(today);

        while existing.contains(&version.to_string()) {
            debug!("Build {} already exists", version);
            version.increment(today);
        }

        Ok(version)
    }

    /// Pick the architectures to build for, given the `Architecture:` values
    /// of the source package.
    pub fn select_architectures(&self, package_arches: &[String]) -> Result<Vec<String>> {
        let arches: Vec<String> = if package_arches.iter().any(|a| a == "any") {
            self.architectures.clone()
        } else if package_arches.iter().any(|a| a == "all") {
            vec!["all".to_string()]
        } else {
            self.architectures
                .iter()
                .filter(|a| package_arches.contains(a))
                .cloned()
                .collect()
        };

        if arches.is_empty() {
            return Err(Error::BuildFailure(format!(
                "package architectures [{}] are not supported by this repository [{}]",
                package_arches.join(" "),
                self.architectures.join(" ")
            )));
        }

        Ok(arches)
    }
}
