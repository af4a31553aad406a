//! Domain model (ids, artifacts, poll states, quotas, errors).
//!
//! I/O を持たない純粋な型だけを置きます。

pub mod artifact;
pub mod backoff;
pub mod errors;
pub mod ids;
pub mod poll;
pub mod quota;

pub use artifact::{
    ArtifactInfo, ArtifactLocation, ArtifactOrigin, Digest, MediaType, NamedArtifact,
};
pub use backoff::Backoff;
pub use errors::{
    ErrorKind, Fallback, IntegrityError, StorageError, StoreRejection, ValidationError,
};
pub use ids::{ArtifactId, Id, IdMarker, ParseIdError};
pub use poll::{
    Observation, PollOutcome, PollPhase, PollProgress, PollState, PollTarget, TaskHandle,
    TaskStatus,
};
pub use quota::{OperationCategory, QuotaStatus};
