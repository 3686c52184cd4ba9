// Typed errors for extension resolution and build planning

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Unknown extension: {0}")]
    UnknownExtension(String),

    #[error("Duplicate extension: {0}")]
    DuplicateExtension(String),

    #[error("Invalid extension name: {0:?}")]
    InvalidName(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Source file not found for extension '{extension}': {}", path.display())]
    MissingSource { extension: String, path: PathBuf },
}
