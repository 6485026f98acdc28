use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::runtime::Runtime;

/// Metadata stored with every build record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BuildMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Keys written by other tools are kept as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl BuildMetadata {
    pub fn new(branch: &str, revision: &str) -> Self {
        BuildMetadata {
            branch: Some(branch.to_string()),
            revision: Some(revision.to_string()),
            extra: BTreeMap::new(),
        }
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    #[tracing::instrument(skip(runtime, self))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        runtime.write(path, content.as_bytes())?;
        Ok(())
    }
}

/// Per-package configuration, `packages/<name>/metadata`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PackageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_environment: Option<String>,
}

/// Repository-wide settings, `<location>/metadata`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RepoMetadata {
    #[serde(rename = "base-os", default, skip_serializing_if = "Option::is_none")]
    pub base_os: Option<String>,
}
