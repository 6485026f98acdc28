use assert_cmd::Command;
use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const DISTRIBUTIONS: &str = "\
Origin: Test
Suite: stable
Codename: apple
Architectures: amd64 armhf source
Components: main
SignWith: builder@example.com

Origin: Test
Suite: testing
Codename: banana
Architectures: amd64 armhf source
Components: main
SignWith: builder@example.com
";

fn add_build(root: &Path, package: &str, version: &str, metadata: Option<&str>) {
    let dir = root.join("packages").join(package).join("builds").join(version);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}_{}_all.deb", package, version)), b"deb").unwrap();
    if let Some(metadata) = metadata {
        fs::write(dir.join(".metadata"), metadata).unwrap();
    }
}

/// A repository with a git package `widget` and a deb package `blob`.
fn make_repo() -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("archive/conf")).unwrap();
    fs::write(root.join("archive/conf/distributions"), DISTRIBUTIONS).unwrap();
    fs::write(root.join("metadata"), "base-os: wheezy\n").unwrap();

    fs::create_dir_all(root.join("packages/widget/source")).unwrap();
    add_build(
        root,
        "widget",
        "1.0-1.20240101",
        Some("branch: master\nrevision: 0123456789abcdef\n"),
    );
    add_build(
        root,
        "widget",
        "1.0-1.20240102",
        Some("branch: master\nrevision: abcdef0123456789\n"),
    );
    add_build(root, "blob", "0.1", None);

    dir
}

/// A configuration naming `repo` as the default repository.
fn write_config(dir: &Path, repo: &Path) -> std::path::PathBuf {
    let path = dir.join("dr.conf");
    fs::write(
        &path,
        format!(
            "repositories:\n  - name: test\n    location: {}\ndefault_repo: test\n\
             build_environments:\n  wheezy:\n    name: Debian Wheezy\n    arches: [amd64]\n",
            repo.display()
        ),
    )
    .unwrap();
    path
}

fn dr(home: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("dr"));
    cmd.env("HOME", home).env_remove("DR_REPO");
    cmd
}

#[test]
fn test_help_and_version() {
    let home = tempdir().unwrap();

    dr(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Debian package repository manager"));

    dr(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("dr "));
}

#[test]
fn test_list_packages() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let config = write_config(home.path(), repo.path());

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("blob [deb] 0.1"))
        .stdout(predicate::str::contains("widget [git] 1.0-1.20240102"));
}

#[test]
fn test_suites() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let config = write_config(home.path(), repo.path());

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .arg("suites")
        .assert()
        .success()
        .stdout(predicate::str::contains("stable (apple)"))
        .stdout(predicate::str::contains("testing (banana)"));
}

#[test]
fn test_history_and_build_files() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let location = repo.path().to_string_lossy().into_owned();

    dr(home.path())
        .args(["--repo", location.as_str(), "history", "widget"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1.0-1.20240102  master@abcdef0\n1.0-1.20240101  master@0123456\n",
        ));

    dr(home.path())
        .env("DR_REPO", repo.path())
        .args(["show", "widget", "--version", "1.0-1.20240101"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget_1.0-1.20240101_all.deb"));
}

#[test]
fn test_unknown_package() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let config = write_config(home.path(), repo.path());

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .args(["history", "gizmo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Package 'gizmo' not found"));

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "widget", "--version", "9.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_missing_repository() {
    let home = tempdir().unwrap();

    dr(home.path())
        .args(["--repo", "/nonexistent/dr-repo", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));

    dr(home.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Default repository"));
}

#[test]
fn test_remove_unknown_build() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let config = write_config(home.path(), repo.path());

    // Unknown builds are rejected before the archive is consulted
    dr(home.path())
        .arg("--config")
        .arg(&config)
        .args(["remove-build", "widget", "9.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build 9.9 of 'widget' not found"));

    assert!(repo.path().join("packages/widget/builds/1.0-1.20240101").is_dir());
}

#[test]
fn test_set_env() {
    let repo = make_repo();
    let home = tempdir().unwrap();
    let config = write_config(home.path(), repo.path());

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .args(["set-env", "widget", "wheezy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget builds in wheezy"));

    let metadata = fs::read_to_string(repo.path().join("packages/widget/metadata")).unwrap();
    assert!(metadata.contains("build_environment: wheezy"));

    dr(home.path())
        .arg("--config")
        .arg(&config)
        .args(["set-env", "widget", "plan9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build environment 'plan9' not found"));
}
