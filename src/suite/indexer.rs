use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::SuiteInventory;
use crate::error::Result;
use crate::package::PkgVersion;
use crate::process::{CommandRunner, Invocation};

/// The archive that publishes packages into suites.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveIndexer: Send + Sync {
    /// Version of a binary package published in `suite`.
    async fn query(&self, suite: &str, package: &str) -> Result<Option<PkgVersion>>;
    /// Binary packages built from `source` (or named `source`) in `suite`.
    async fn list_source(&self, suite: &str, source: &str) -> Result<SuiteInventory>;
    async fn insert(&self, suite: &str, files: &[PathBuf]) -> Result<()>;
    async fn remove_source(&self, suite: &str, source: &str) -> Result<()>;
}

/// [`ArchiveIndexer`] backed by `reprepro`.
pub struct Reprepro<'a, C: CommandRunner> {
    runner: &'a C,
    basedir: PathBuf,
    gnupghome: PathBuf,
}

impl<'a, C: CommandRunner> Reprepro<'a, C> {
    pub fn new(runner: &'a C, basedir: &Path, gnupghome: &Path) -> Self {
        Self {
            runner,
            basedir: basedir.to_path_buf(),
            gnupghome: gnupghome.to_path_buf(),
        }
    }

    fn read_command(&self) -> Invocation {
        Invocation::new("reprepro")
            .arg("--basedir")
            .path_arg(&self.basedir)
    }

    fn write_command(&self) -> Invocation {
        self.read_command()
            .arg("--gnupghome")
            .path_arg(&self.gnupghome)
    }
}

#[async_trait]
impl<C: CommandRunner> ArchiveIndexer for Reprepro<'_, C> {
    #[tracing::instrument(skip(self))]
    async fn query(&self, suite: &str, package: &str) -> Result<Option<PkgVersion>> {
        let invocation = self
            .read_command()
            .args(["--list-format", "${version}\\n", "list", suite, package]);
        let output = self.runner.run(&invocation).await?.check(&invocation)?;

        match output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(version) => Ok(Some(PkgVersion::parse(version)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_source(&self, suite: &str, source: &str) -> Result<SuiteInventory> {
        let filter = format!("Source (== {0}) | Package (== {0})", source);
        let invocation = self.read_command().args([
            "--list-format",
            "${package} ${version}\\n",
            "listfilter",
            suite,
            filter.as_str(),
        ]);
        let output = self.runner.run(&invocation).await?.check(&invocation)?;

        let mut inventory = SuiteInventory::new();
        for line in output.stdout.lines() {
            if let Some((binary, version)) = line.trim().split_once(' ') {
                inventory.insert(binary, PkgVersion::parse(version.trim())?);
            }
        }
        debug!("{} in {}: {:?}", source, suite, inventory);
        Ok(inventory)
    }

    #[tracing::instrument(skip(self, files))]
    async fn insert(&self, suite: &str, files: &[PathBuf]) -> Result<()> {
        info!("Including {} package(s) into {}", files.len(), suite);
        let invocation = self
            .write_command()
            .args(["includedeb", suite])
            .args(files.iter().map(|f| f.to_string_lossy().into_owned()));
        self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_source(&self, suite: &str, source: &str) -> Result<()> {
        info!("Removing {} from {}", source, suite);
        let invocation = self.write_command().args(["removesrc", suite, source]);
        self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::process::{MockCommandRunner, ProcessOutput};

    fn reprepro(runner: &MockCommandRunner) -> Reprepro<'_, MockCommandRunner> {
        Reprepro::new(
            runner,
            Path::new("/repo/archive"),
            Path::new("/repo/gnupg-keyring"),
        )
    }

    #[tokio::test]
    async fn test_list_source() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| {
                inv.program == "reprepro"
                    && inv.args[..2] == ["--basedir", "/repo/archive"]
                    && inv.args.contains(&"listfilter".to_string())
                    && inv.args.last().map(String::as_str)
                        == Some("Source (== foo) | Package (== foo)")
            })
            .returning(|_| {
                Ok(ProcessOutput::ok(
                    "foo 1.0-1.20240101\nfoo-dev 1.0-1.20240101\nfoo 1.0-1.20240101\n",
                ))
            });

        let inventory = reprepro(&runner).list_source("stable", "foo").await.unwrap();
        assert_eq!(inventory.binaries().count(), 2);
        assert_eq!(
            inventory.get("foo-dev").map(|v| v.to_string()),
            Some("1.0-1.20240101".to_string())
        );
    }

    #[tokio::test]
    async fn test_query() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.args.ends_with(&["list".to_string(), "stable".into(), "foo".into()]))
            .returning(|_| Ok(ProcessOutput::ok("2:1.0\n2:1.0\n")));
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::ok("")));

        let indexer = reprepro(&runner);
        assert_eq!(
            indexer.query("stable", "foo").await.unwrap().map(|v| v.to_string()),
            Some("2:1.0".to_string())
        );
        assert_eq!(indexer.query("stable", "bar").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_uses_keyring() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| {
                inv.to_string()
                    == "reprepro --basedir /repo/archive --gnupghome /repo/gnupg-keyring \
                        includedeb testing /b/foo_1.0_all.deb /b/foo-doc_1.0_all.deb"
            })
            .times(1)
            .returning(|_| Ok(ProcessOutput::ok("")));

        reprepro(&runner)
            .insert(
                "testing",
                &[
                    PathBuf::from("/b/foo_1.0_all.deb"),
                    PathBuf::from("/b/foo-doc_1.0_all.deb"),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_source_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::failed(255, "Cannot find distribution 'nope'")));

        let err = reprepro(&runner)
            .remove_source("nope", "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BuildFailure(_)));
        assert!(err.to_string().contains("removesrc nope foo"));
    }
}
