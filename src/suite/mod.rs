//! Distribution suites of the archive.
//!
//! Suites are configured in `archive/conf/distributions` (reprepro format).
//! Each suite publishes binary packages at one version each.

mod gate;
mod indexer;

use std::collections::BTreeMap;

use log::debug;

use crate::debian::parse_paragraphs;
use crate::error::{Error, Result};
use crate::package::{PackageRepository, PkgVersion};
use crate::runtime::Runtime;

pub use gate::{Conflict, PublishDecision, PublishGate, RemovalPlan};
pub use indexer::{ArchiveIndexer, Reprepro};

#[cfg(test)]
pub use indexer::MockArchiveIndexer;

/// A distribution suite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Suite {
    pub name: String,
    pub codename: Option<String>,
    pub architectures: Vec<String>,
    /// Key the suite's index is signed with
    pub sign_with: Option<String>,
}

impl Suite {
    /// Whether `name` refers to this suite, by name or by codename.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.codename.as_deref() == Some(name)
    }

    /// The identifier the archive indexer knows the suite by.
    pub fn archive_id(&self) -> &str {
        self.codename.as_deref().unwrap_or(&self.name)
    }
}

/// Parse the contents of a `distributions` file.
pub fn parse_distributions(input: &str) -> Result<Vec<Suite>> {
    let mut suites = Vec::new();

    for mut paragraph in parse_paragraphs(input)? {
        let codename = paragraph.remove("Codename");
        let name = paragraph
            .remove("Suite")
            .or_else(|| codename.clone())
            .ok_or_else(|| Error::parse("distributions", "suite without Suite or Codename"))?;

        let architectures = paragraph
            .get("Architectures")
            .map(|a| a.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        suites.push(Suite {
            name,
            codename,
            architectures,
            sign_with: paragraph.remove("SignWith"),
        });
    }

    Ok(suites)
}

/// Load the suites of a repository.
pub fn load_suites<R: Runtime>(repo: &PackageRepository<'_, R>) -> Result<Vec<Suite>> {
    let path = repo.distributions_path();
    if !repo.runtime().exists(&path) {
        return Err(Error::not_found(format!(
            "Suite configuration {}",
            path.display()
        )));
    }
    let content = repo.runtime().read_to_string(&path)?;
    let suites = parse_distributions(&content)?;
    debug!("Loaded {} suites from {:?}", suites.len(), path);
    Ok(suites)
}

/// Binary architectures supported by the repository, in configuration order.
pub fn repo_architectures(suites: &[Suite]) -> Vec<String> {
    let mut arches: Vec<String> = Vec::new();
    for arch in suites.iter().flat_map(|s| &s.architectures) {
        if arch != "source" && !arches.contains(arch) {
            arches.push(arch.clone());
        }
    }
    arches
}

/// Binary package versions published in one suite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuiteInventory {
    versions: BTreeMap<String, PkgVersion>,
}

impl SuiteInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binary: impl Into<String>, version: PkgVersion) {
        self.versions.insert(binary.into(), version);
    }

    pub fn get(&self, binary: &str) -> Option<&PkgVersion> {
        self.versions.get(binary)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn contains_version(&self, version: &PkgVersion) -> bool {
        self.versions.values().any(|v| v == version)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PkgVersion)> {
        self.versions.iter()
    }

    pub fn binaries(&self) -> impl Iterator<Item = &String> {
        self.versions.keys()
    }
}

impl FromIterator<(String, PkgVersion)> for SuiteInventory {
    fn from_iter<I: IntoIterator<Item = (String, PkgVersion)>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISTRIBUTIONS: &str = "\
Origin: Example
Label: Example
Suite: stable
Codename: apple
Architectures: armhf amd64 source
Components: main
SignWith: 0123ABCD

Suite: testing
Codename: banana
Architectures: armhf i386
Components: main

# unreleased
Codename: cherry
Architectures: armhf
Components: main
";

    #[test]
    fn test_parse_distributions() {
        let suites = parse_distributions(DISTRIBUTIONS).unwrap();
        assert_eq!(suites.len(), 3);

        assert_eq!(suites[0].name, "stable");
        assert_eq!(suites[0].codename.as_deref(), Some("apple"));
        assert_eq!(suites[0].sign_with.as_deref(), Some("0123ABCD"));
        assert_eq!(suites[0].archive_id(), "apple");
        assert!(suites[1].matches("testing"));
        assert!(suites[1].matches("banana"));
        assert!(!suites[1].matches("apple"));

        assert_eq!(suites[2].name, "cherry");
        assert_eq!(suites[2].sign_with, None);
    }

    #[test]
    fn test_parse_distributions_needs_a_name() {
        assert!(matches!(
            parse_distributions("Architectures: armhf\n"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_repo_architectures() {
        let suites = parse_distributions(DISTRIBUTIONS).unwrap();
        assert_eq!(repo_architectures(&suites), vec!["armhf", "amd64", "i386"]);
    }

    #[test]
    fn test_load_suites() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = crate::runtime::RealRuntime;
        let repo = PackageRepository::new(&runtime, dir.path().to_path_buf());
        assert!(matches!(load_suites(&repo), Err(Error::NotFound(_))));

        std::fs::create_dir_all(dir.path().join("archive/conf")).unwrap();
        std::fs::write(repo.distributions_path(), DISTRIBUTIONS).unwrap();
        assert_eq!(load_suites(&repo).unwrap().len(), 3);
    }

    #[test]
    fn test_inventory() {
        let inventory: SuiteInventory = vec![
            ("foo".to_string(), PkgVersion::parse("1.0").unwrap()),
            ("foo-dev".to_string(), PkgVersion::parse("1.0").unwrap()),
        ]
        .into_iter()
        .collect();

        assert!(inventory.contains_version(&PkgVersion::parse("1.0").unwrap()));
        assert!(!inventory.contains_version(&PkgVersion::parse("1.1").unwrap()));
        assert_eq!(inventory.binaries().count(), 2);
        assert!(SuiteInventory::new().is_empty());
    }
}
