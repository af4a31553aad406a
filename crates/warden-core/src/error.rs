use thiserror::Error;

use crate::app::builder::BuildError;
use crate::app::submit::SubmitError;
use crate::config::ConfigError;
use crate::domain::{ArtifactId, ErrorKind, IntegrityError, StorageError, StoreRejection};

/// Crate-level error for callers that drive the whole app.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Rejected(#[from] StoreRejection),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("artifact {0} disappeared before it could be read")]
    Vanished(ArtifactId),
}

impl WardenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Rejected(e) => e.kind(),
            WardenError::Integrity(_) | WardenError::Vanished(_) => ErrorKind::Integrity,
            WardenError::Submit(e) => e.kind(),
            WardenError::Config(_) | WardenError::Build(_) | WardenError::Storage(_) => {
                ErrorKind::Storage
            }
        }
    }
}
