use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir().filter(|home| !home.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};

    #[test]
    fn test_home_dir_is_never_empty() {
        // Containers may run without a home directory
        if let Some(home) = RealRuntime.home_dir() {
            assert!(!home.as_os_str().is_empty());
        }
    }
}
