//! External collaborators: source control, build sandboxes, signing and
//! package inspection.
//!
//! Each collaborator is a trait so the application layer can be tested
//! against mocks; the implementations drive the usual Debian tooling through
//! a [`CommandRunner`](crate::process::CommandRunner).

mod dpkg;
mod git;
mod sandbox;
mod signing;

pub use dpkg::{DpkgDeb, PackageInspector, source_identity};
pub use git::{GitMirror, SourceControl};
pub use sandbox::{BuildRoot, BuildSandbox, ChrootSandbox, with_build_root};
pub use signing::{GpgSigner, Signer};

#[cfg(test)]
pub use dpkg::MockPackageInspector;
#[cfg(test)]
pub use git::MockSourceControl;
#[cfg(test)]
pub use sandbox::MockBuildSandbox;
#[cfg(test)]
pub use signing::MockSigner;
