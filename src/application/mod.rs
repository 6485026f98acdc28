//! Application layer - Use cases that coordinate the repository, the suites
//! and the external collaborators.
//!
//! Use cases return plain values and core errors; printing is left to the
//! `commands` layer.

mod add;
mod build;
mod configure;
mod publish;
mod query;
mod remove;

pub use add::AddAction;
pub use build::{BuildOutcome, BuildUseCase};
pub use configure::ConfigureAction;
pub use publish::{PublishAction, PublishOutcome, published_versions};
pub use query::{BuildRecord, PackageDetails, PackageKind, PackageSummary, QueryAction, SourceInfo};
pub use remove::RemoveAction;
