//! Artifact record: registry entry for one stored artifact.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{ArtifactId, ArtifactInfo, ArtifactLocation, ArtifactOrigin, Digest, MediaType};

/// Metadata + location for one artifact.
///
/// Design:
/// - The registry owns records; callers only ever see `ArtifactId`.
/// - Everything but `last_accessed_at` is fixed at registration.
/// - `last_accessed_at` is refreshed by readers holding the registry's
///   read lock, hence the per-record mutex.
#[derive(Debug)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    pub digest: Digest,
    pub location: ArtifactLocation,
    pub media_type: MediaType,
    pub origin: ArtifactOrigin,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    last_accessed_at: Mutex<DateTime<Utc>>,
}

impl ArtifactRecord {
    pub fn new(
        id: ArtifactId,
        digest: Digest,
        location: ArtifactLocation,
        media_type: MediaType,
        origin: ArtifactOrigin,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            digest,
            location,
            media_type,
            origin,
            size_bytes,
            created_at: now,
            last_accessed_at: Mutex::new(now),
        }
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        *self.last_accessed_at.lock()
    }

    /// Record a successful read. Never moves the timestamp backwards.
    pub fn touch(&self, now: DateTime<Utc>) {
        let mut last = self.last_accessed_at.lock();
        if now > *last {
            *last = now;
        }
    }

    /// Idle since before `cutoff`.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_accessed_at() < cutoff
    }

    /// Display name: the stored file's base name, or `file.<ext>` in memory.
    pub fn file_name(&self) -> String {
        match &self.location {
            ArtifactLocation::OnDisk(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.fallback_name()),
            ArtifactLocation::InMemory(_) => self.fallback_name(),
        }
    }

    fn fallback_name(&self) -> String {
        format!("file.{}", self.media_type.extension())
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            id: self.id,
            digest: self.digest.clone(),
            media_type: self.media_type,
            origin: self.origin,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at(),
            on_disk: self.location.is_on_disk(),
            file_name: self.file_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;
    use ulid::Ulid;

    fn record(location: ArtifactLocation) -> ArtifactRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ArtifactRecord::new(
            ArtifactId::from_ulid(Ulid::new()),
            Digest::from_hex("00ff"),
            location,
            MediaType::Png,
            ArtifactOrigin::Uploaded,
            2,
            now,
        )
    }

    #[test]
    fn touch_is_monotonic() {
        let r = record(ArtifactLocation::InMemory(vec![1, 2]));
        let created = r.created_at;

        r.touch(created + Duration::hours(2));
        r.touch(created + Duration::hours(1));
        assert_eq!(r.last_accessed_at(), created + Duration::hours(2));
        assert!(!r.is_expired(created + Duration::hours(2)));
        assert!(r.is_expired(created + Duration::hours(3)));
    }

    #[test]
    fn file_name_never_exposes_directory() {
        let r = record(ArtifactLocation::OnDisk(PathBuf::from("/srv/secret/00ff_abc.png")));
        assert_eq!(r.file_name(), "00ff_abc.png");
        assert!(r.info().on_disk);

        let r = record(ArtifactLocation::InMemory(vec![1, 2]));
        assert_eq!(r.file_name(), "file.png");
    }
}
