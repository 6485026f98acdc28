//! Publish authorization.
//!
//! A suite only moves forward: a build may be published when every binary
//! package it contains is newer than what the suite already holds. Forced
//! publishes replace the source's packages instead.

use log::debug;

use super::{Suite, SuiteInventory};
use crate::error::{Error, Result};
use crate::package::PkgVersion;

/// A binary already published at a version equal to or above the candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub binary: String,
    pub published: PkgVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishDecision {
    /// Publish directly
    Insert,
    /// Remove the source's packages from the suite, then publish
    ReplaceExisting { conflicts: Vec<Conflict> },
    /// Publishing would move the suite backwards
    Refused { conflicts: Vec<Conflict> },
}

impl PublishDecision {
    /// Turn a refusal into a `PublishConflict` error naming the first conflict.
    pub fn into_result(self, suite: &str, candidate: &PkgVersion) -> Result<Self> {
        match self {
            PublishDecision::Refused { conflicts } => {
                let first = conflicts.into_iter().next();
                Err(match first {
                    Some(c) => Error::PublishConflict {
                        suite: suite.to_string(),
                        binary: c.binary,
                        published: c.published.to_string(),
                        candidate: candidate.to_string(),
                    },
                    None => Error::AlreadyExists(format!("{} in {}", candidate, suite)),
                })
            }
            decision => Ok(decision),
        }
    }
}

/// Packages to take out of a suite.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalPlan {
    /// Archive identifier of the suite
    pub suite: String,
    pub source: String,
    pub binaries: Vec<String>,
}

impl RemovalPlan {
    /// Nothing of the source is published in the suite.
    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }
}

/// Decides whether builds may enter or leave the suites of an archive.
pub struct PublishGate<'a> {
    suites: &'a [Suite],
}

impl<'a> PublishGate<'a> {
    pub fn new(suites: &'a [Suite]) -> Self {
        Self { suites }
    }

    /// Look up a suite by name or codename.
    pub fn resolve_suite(&self, name: &str) -> Result<&'a Suite> {
        self.suites
            .iter()
            .find(|s| s.matches(name))
            .ok_or_else(|| Error::not_found(format!("Suite '{}'", name)))
    }

    /// Check whether `candidate` may be published into `suite`.
    ///
    /// `binaries` are the binary packages of the build, `inventory` the
    /// versions `suite` currently publishes for the same source.
    pub fn can_publish(
        &self,
        suite: &str,
        binaries: &[String],
        candidate: &PkgVersion,
        inventory: &SuiteInventory,
        force: bool,
    ) -> Result<PublishDecision> {
        self.resolve_suite(suite)?;

        let conflicts: Vec<Conflict> = binaries
            .iter()
            .filter_map(|binary| {
                inventory
                    .get(binary)
                    .filter(|published| *published >= candidate)
                    .map(|published| Conflict {
                        binary: binary.clone(),
                        published: published.clone(),
                    })
            })
            .collect();

        let decision = if conflicts.is_empty() {
            PublishDecision::Insert
        } else if force {
            PublishDecision::ReplaceExisting { conflicts }
        } else {
            PublishDecision::Refused { conflicts }
        };
        debug!("Publishing {} into {}: {:?}", candidate, suite, decision);
        Ok(decision)
    }

    /// Plan the removal of everything `source` publishes in `suite`.
    ///
    /// Always allowed. An empty plan means there is nothing to remove.
    pub fn unpublish(
        &self,
        suite: &str,
        source: &str,
        inventory: &SuiteInventory,
    ) -> Result<RemovalPlan> {
        let suite = self.resolve_suite(suite)?;
        Ok(RemovalPlan {
            suite: suite.archive_id().to_string(),
            source: source.to_string(),
            binaries: inventory.binaries().cloned().collect(),
        })
    }
}
