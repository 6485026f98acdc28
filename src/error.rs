use thiserror::Error;

/// Errors raised by the repository core.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed version string or malformed upstream metadata file
    #[error("Parse error in '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// Unknown package, build, branch or suite
    #[error("{0} not found")]
    NotFound(String),

    /// Version or build collision encountered without force
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Target suite already holds an equal or higher version
    #[error(
        "The {suite} suite already contains {binary} version {published} (pushing {candidate})"
    )]
    PublishConflict {
        suite: String,
        binary: String,
        published: String,
        candidate: String,
    },

    /// Package or build is still published somewhere
    #[error("{what} is still used in suite(s): {}", suites.join(", "))]
    InUse { what: String, suites: Vec<String> },

    /// External compile/package step failed or an expected artifact is missing
    #[error("Build failure: {0}")]
    BuildFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

/// Result type alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;
