use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation};

/// Signs package files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, file: &Path) -> Result<()>;
}

/// [`Signer`] using `dpkg-sig` with a key from the repository keyring.
pub struct GpgSigner<'a, C: CommandRunner> {
    runner: &'a C,
    keyring: PathBuf,
    key: String,
    key_id: OnceCell<String>,
}

impl<'a, C: CommandRunner> GpgSigner<'a, C> {
    /// `key` is anything gpg can select a key by, usually the `SignWith`
    /// value of the suites.
    pub fn new(runner: &'a C, keyring: &Path, key: impl Into<String>) -> Self {
        Self {
            runner,
            keyring: keyring.to_path_buf(),
            key: key.into(),
            key_id: OnceCell::new(),
        }
    }

    /// Long key id of the signing key, looked up once.
    pub async fn key_id(&self) -> Result<&str> {
        let id = self
            .key_id
            .get_or_try_init(|| async {
                let invocation = Invocation::new("gpg")
                    .arg("--homedir")
                    .path_arg(&self.keyring)
                    .args(["--with-colons", "--list-public-keys", self.key.as_str()]);
                let output = self.runner.run(&invocation).await?.check(&invocation)?;
                parse_key_id(&output.stdout)
                    .ok_or_else(|| Error::not_found(format!("Signing key '{}'", self.key)))
            })
            .await?;
        Ok(id.as_str())
    }
}

/// Key id field of the first `pub` record in `gpg --with-colons` output.
fn parse_key_id(listing: &str) -> Option<String> {
    listing
        .lines()
        .find(|l| l.starts_with("pub:"))
        .and_then(|l| l.split(':').nth(4))
        .filter(|id| !id.is_empty())
        .map(String::from)
}

#[async_trait]
impl<C: CommandRunner> Signer for GpgSigner<'_, C> {
    #[tracing::instrument(skip(self))]
    async fn sign(&self, file: &Path) -> Result<()> {
        let key_id = self.key_id().await?.to_string();
        info!(
            "Signing the {} package",
            file.file_name().unwrap_or_default().to_string_lossy()
        );

        let invocation = Invocation::new("dpkg-sig")
            .args(["-k", key_id.as_str(), "-s", "builder", "-g"])
            .arg(format!("--homedir {}", self.keyring.display()))
            .path_arg(file);
        self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockCommandRunner, ProcessOutput};

    const LISTING: &str = "\
tru::1:1700000000:0:3:1:5
pub:u:2048:1:89ABCDEF01234567:1400000000:::u:::scESC:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF01234567:
uid:u::::1400000000::ABCDEF::Repository Builder <builder@example.com>:
";

    #[test]
    fn test_parse_key_id() {
        assert_eq!(parse_key_id(LISTING), Some("89ABCDEF01234567".to_string()));
        assert_eq!(parse_key_id("uid:::\n"), None);
    }

    #[tokio::test]
    async fn test_sign_looks_up_key_once() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.program == "gpg")
            .times(1)
            .returning(|_| Ok(ProcessOutput::ok(LISTING)));
        runner
            .expect_run()
            .withf(|inv| {
                inv.to_string()
                    == "dpkg-sig -k 89ABCDEF01234567 -s builder -g --homedir /repo/gnupg-keyring /b/foo_1.0_all.deb"
                    && inv.args[5] == "--homedir /repo/gnupg-keyring"
            })
            .times(2)
            .returning(|_| Ok(ProcessOutput::ok("Signed deb")));

        let signer = GpgSigner::new(&runner, Path::new("/repo/gnupg-keyring"), "builder@example.com");
        signer.sign(Path::new("/b/foo_1.0_all.deb")).await.unwrap();
        signer.sign(Path::new("/b/foo_1.0_all.deb")).await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_unknown_key() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::ok("tru::1:1700000000:0:3:1:5\n")));

        let signer = GpgSigner::new(&runner, Path::new("/k"), "nobody");
        let err = signer.sign(Path::new("/b/x.deb")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
