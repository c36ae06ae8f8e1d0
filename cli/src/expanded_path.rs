use std::{
    env::VarError,
    fmt::Display,
    ops::Deref,
    path::{Path, PathBuf},
    str::FromStr,
};

use shellexpand::LookupError;

/// A command-line path with `~` and environment variables already expanded.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExpandedPath(PathBuf);

impl Deref for ExpandedPath {
    type Target = PathBuf;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for ExpandedPath {
    type Err = LookupError<VarError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        shellexpand::full(s).map(|expanded| ExpandedPath(PathBuf::from(expanded.as_ref())))
    }
}

impl AsRef<Path> for ExpandedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for ExpandedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display().fmt(f)
    }
}
