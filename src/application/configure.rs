//! Per-package settings.

use std::path::PathBuf;

use log::info;

use crate::config::Config;
use crate::error::Result;
use crate::package::{PackageConfig, PackageRepository};
use crate::runtime::Runtime;

pub struct ConfigureAction<'a, R: Runtime> {
    repo: PackageRepository<'a, R>,
    config: &'a Config,
}

impl<'a, R: Runtime> ConfigureAction<'a, R> {
    pub fn new(runtime: &'a R, location: impl Into<PathBuf>, config: &'a Config) -> Self {
        Self {
            repo: PackageRepository::new(runtime, location.into()),
            config,
        }
    }

    /// Pin the build environment of a package, or go back to the
    /// repository's base OS with `None`.
    pub fn set_build_environment(
        &self,
        package: &str,
        environment: Option<&str>,
    ) -> Result<PackageConfig> {
        self.repo.require_package(package)?;
        if let Some(id) = environment {
            self.config.build_environment(id)?;
        }

        let mut settings = self.repo.package_config(package)?;
        settings.build_environment = environment.map(str::to_string);
        self.repo.save_package_config(package, &settings)?;

        match environment {
            Some(id) => info!("{} now builds in {}", package, id),
            None => info!("{} now builds in the base OS", package),
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildEnvironment;
    use crate::error::Error;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    fn config_with(environment: &str) -> Config {
        let mut config = Config::default();
        config.build_environments.insert(
            environment.to_string(),
            BuildEnvironment {
                name: "Debian Bookworm".to_string(),
                arches: vec!["amd64".to_string()],
            },
        );
        config
    }

    #[test]
    fn test_set_and_clear_build_environment() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("packages/widget/builds")).unwrap();
        let runtime = RealRuntime;
        let config = config_with("bookworm");
        let action = ConfigureAction::new(&runtime, dir.path(), &config);

        let settings = action
            .set_build_environment("widget", Some("bookworm"))
            .unwrap();
        assert_eq!(settings.build_environment.as_deref(), Some("bookworm"));
        let saved = fs::read_to_string(dir.path().join("packages/widget/metadata")).unwrap();
        assert!(saved.contains("build_environment: bookworm"));

        let settings = action.set_build_environment("widget", None).unwrap();
        assert_eq!(settings.build_environment, None);
        let repo = PackageRepository::new(&runtime, dir.path().to_path_buf());
        assert_eq!(repo.package_config("widget").unwrap(), PackageConfig::default());
    }

    #[test]
    fn test_unknown_environment_or_package() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("packages/widget/builds")).unwrap();
        let runtime = RealRuntime;
        let config = config_with("bookworm");
        let action = ConfigureAction::new(&runtime, dir.path(), &config);

        let err = action
            .set_build_environment("widget", Some("trixie"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!dir.path().join("packages/widget/metadata").exists());

        let err = action
            .set_build_environment("gizmo", Some("bookworm"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
