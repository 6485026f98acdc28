use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation};

/// Control fields of a binary package file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageInspector: Send + Sync {
    /// Value of `field`, `None` when the package does not set it.
    async fn field(&self, deb: &Path, field: &str) -> Result<Option<String>>;
}

/// Source package name and version of a `.deb`.
///
/// Packages without a `Source` field are their own source.
pub async fn source_identity<I: PackageInspector + ?Sized>(
    inspector: &I,
    deb: &Path,
) -> Result<(String, String)> {
    let name = match inspector.field(deb, "Source").await? {
        // "Source: name (version)" is allowed when the versions differ
        Some(source) => source
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
        None => inspector
            .field(deb, "Package")
            .await?
            .ok_or_else(|| Error::parse(deb.display().to_string(), "no Package field"))?,
    };
    let version = inspector
        .field(deb, "Version")
        .await?
        .ok_or_else(|| Error::parse(deb.display().to_string(), "no Version field"))?;
    Ok((name, version))
}

/// [`PackageInspector`] using `dpkg-deb`.
pub struct DpkgDeb<'a, C: CommandRunner> {
    runner: &'a C,
}

impl<'a, C: CommandRunner> DpkgDeb<'a, C> {
    pub fn new(runner: &'a C) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<C: CommandRunner> PackageInspector for DpkgDeb<'_, C> {
    #[tracing::instrument(skip(self))]
    async fn field(&self, deb: &Path, field: &str) -> Result<Option<String>> {
        let invocation = Invocation::new("dpkg-deb")
            .arg("--field")
            .path_arg(deb)
            .arg(field);
        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        let value = output.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockCommandRunner, ProcessOutput};
    use mockall::predicate::{always, eq};

    #[tokio::test]
    async fn test_dpkg_deb_field() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.to_string() == "dpkg-deb --field /tmp/foo.deb Version")
            .returning(|_| Ok(ProcessOutput::ok("1.0-2\n")));
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::ok("\n")));

        let dpkg = DpkgDeb::new(&runner);
        let deb = Path::new("/tmp/foo.deb");
        assert_eq!(dpkg.field(deb, "Version").await.unwrap().as_deref(), Some("1.0-2"));
        assert_eq!(dpkg.field(deb, "Source").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_source_identity_falls_back_to_package() {
        let mut inspector = MockPackageInspector::new();
        inspector
            .expect_field()
            .with(always(), eq("Source"))
            .returning(|_, _| Ok(None));
        inspector
            .expect_field()
            .with(always(), eq("Package"))
            .returning(|_, _| Ok(Some("foo".into())));
        inspector
            .expect_field()
            .with(always(), eq("Version"))
            .returning(|_, _| Ok(Some("1.0".into())));

        let identity = source_identity(&inspector, Path::new("/tmp/foo.deb"))
            .await
            .unwrap();
        assert_eq!(identity, ("foo".to_string(), "1.0".to_string()));
    }

    #[tokio::test]
    async fn test_source_identity_strips_source_version() {
        let mut inspector = MockPackageInspector::new();
        inspector
            .expect_field()
            .with(always(), eq("Source"))
            .returning(|_, _| Ok(Some("foo-src (1.0-1)".into())));
        inspector
            .expect_field()
            .with(always(), eq("Version"))
            .returning(|_, _| Ok(Some("1.0-1+b1".into())));

        let identity = source_identity(&inspector, Path::new("/tmp/foo.deb"))
            .await
            .unwrap();
        assert_eq!(identity.0, "foo-src");
    }
}
