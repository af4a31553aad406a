//! Errors - エラー型と分類
//!
//! Store / Validation / Integrity の三系統に分けて、
//! 呼び出し側が扱いを変えられるようにしています。
//!
//! - ValidationError: 入力の拒否（部分的な登録は残らない）
//! - IntegrityError: fail-closed（信頼できない artifact として扱う）
//! - StorageError: I/O 障害（ログに残し、bool / Option で返す）

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::artifact::MediaType;
use super::ids::ArtifactId;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Integrity,
    Storage,
    RateLimited,
    External,
}

/// What the user can do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    Reupload,
    Regenerate,
    WaitAndRetry,
    CheckManually,
}

/// Reasons an untrusted upload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no data supplied")]
    Empty,

    #[error("payload is {size} bytes, limit is {max}")]
    Oversize { size: u64, max: u64 },

    #[error("payload type {found} is not allowed")]
    DisallowedType { found: String },

    #[error("image is {width}x{height}, limit is {max}x{max}")]
    BadDimensions { width: u32, height: u32, max: u32 },

    #[error("payload failed to decode as {media}: {detail}")]
    Corrupt { media: MediaType, detail: String },
}

impl ValidationError {
    /// Short reason suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::Empty => "No file uploaded".to_string(),
            ValidationError::Oversize { max, .. } => format!(
                "File size exceeds maximum allowed ({}MB)",
                max / (1024 * 1024)
            ),
            ValidationError::DisallowedType { .. } => {
                "File does not appear to be a valid image".to_string()
            }
            ValidationError::BadDimensions { max, .. } => {
                format!("Image dimensions too large (max {max}x{max})")
            }
            ValidationError::Corrupt { .. } => "Invalid image file".to_string(),
        }
    }
}

/// Reasons an integrity check fails. Every variant means "do not use".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{0} is not registered")]
    Unknown(ArtifactId),

    #[error("backing bytes for {0} are missing or unreadable")]
    Missing(ArtifactId),

    #[error("{0} has no recorded digest")]
    MissingDigest(ArtifactId),

    #[error("{id} digest mismatch (expected {expected}, found {actual})")]
    Mismatch {
        id: ArtifactId,
        expected: String,
        actual: String,
    },
}

/// Failures of the backing storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to prepare storage directory: {0}")]
    Directory(#[source] io::Error),

    #[error("failed to write {op} for {artifact}: {source}")]
    Write {
        op: &'static str,
        artifact: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {artifact}: {source}")]
    Read {
        artifact: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {artifact}: {source}")]
    Remove {
        artifact: String,
        #[source]
        source: io::Error,
    },

    #[error("{failed} artifact(s) could not be purged")]
    Sweep { failed: usize },

    #[error("sweep task aborted: {0}")]
    Aborted(String),
}

/// Why `validate_and_store` did not return a handle.
#[derive(Debug, Error)]
pub enum StoreRejection {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreRejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreRejection::Invalid(_) => ErrorKind::Validation,
            StoreRejection::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            StoreRejection::Invalid(e) => e.user_message(),
            StoreRejection::Storage(_) => "Failed to securely store file".to_string(),
        }
    }

    pub fn fallback(&self) -> Fallback {
        match self {
            StoreRejection::Invalid(_) => Fallback::Reupload,
            StoreRejection::Storage(_) => Fallback::WaitAndRetry,
        }
    }

    /// The validation reason, if this was a validation rejection.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            StoreRejection::Invalid(e) => Some(e),
            StoreRejection::Storage(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_message_names_the_limit_in_megabytes() {
        let e = ValidationError::Oversize {
            size: 6 * 1024 * 1024,
            max: 5 * 1024 * 1024,
        };
        assert_eq!(e.user_message(), "File size exceeds maximum allowed (5MB)");
    }

    #[test]
    fn rejection_maps_to_kind_and_fallback() {
        let r = StoreRejection::from(ValidationError::Empty);
        assert_eq!(r.kind(), ErrorKind::Validation);
        assert_eq!(r.fallback(), Fallback::Reupload);
        assert_eq!(r.validation(), Some(&ValidationError::Empty));

        let r = StoreRejection::from(StorageError::Sweep { failed: 1 });
        assert_eq!(r.kind(), ErrorKind::Storage);
        assert_eq!(r.fallback(), Fallback::WaitAndRetry);
        assert!(r.validation().is_none());
    }
}
