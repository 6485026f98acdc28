//! Presentation layer - one function per CLI command.
//!
//! Commands build the use cases from a [`Context`], run them and print the
//! results.

mod add;
mod build;
mod configure;
mod context;
mod list;
mod publish;
mod remove;
mod show;

pub use add::{add_deb, add_git};
pub use build::build;
pub use configure::set_env;
pub use context::Context;
pub use list::{list, suites};
pub use publish::{push, unpush};
pub use remove::{remove, remove_build};
pub use show::{history, show};
