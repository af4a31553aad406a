//! Secure artifact store.
//!
//! Content-addressed registry of validated uploads and generated artifacts.
//!
//! # 排他制御
//! - registry: `RwLock<HashMap<ArtifactId, ArtifactRecord>>`
//! - 登録と削除は write lock（削除は wipe → unlink → 登録解除まで保持）
//! - 読み出しは read lock（並行可）。`last_accessed_at` は record ごとの Mutex
//!
//! # 整合性
//! - digest は保存したバイト列から store 自身が計算する
//! - on-disk のバイト列が正（メモリ上のコピーは持たない）
//! - 不一致は修復せず「信頼できない」として扱う（fail-closed）

mod layout;
mod record;

pub use layout::DiskLayout;
pub use record::ArtifactRecord;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::config::{StorageMode, StoreConfig};
use crate::domain::{
    ArtifactId, ArtifactInfo, ArtifactLocation, ArtifactOrigin, IntegrityError, MediaType,
    NamedArtifact, StorageError, StoreRejection,
};
use crate::ports::clock::to_chrono;
use crate::ports::{Clock, IdGenerator, Prunable, SweepReport, SystemClock, UlidGenerator};
use crate::validation;

/// Digest characters shown in log lines.
const LOG_DIGEST_LEN: usize = 12;

pub struct SecureArtifactStore {
    config: StoreConfig,
    /// `None` in memory mode.
    layout: Option<DiskLayout>,
    registry: RwLock<HashMap<ArtifactId, ArtifactRecord>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl SecureArtifactStore {
    /// Store on the wall clock with ULID handles.
    pub fn open(config: StoreConfig) -> Result<Self, StorageError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_clock(config, clock)
    }

    /// Store on `clock`; handles take their timestamp from the same clock.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        Self::new(config, clock, ids)
    }

    pub fn new(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, StorageError> {
        let layout = match config.mode {
            StorageMode::Disk => {
                let layout = DiskLayout::prepare(&config.dir).map_err(StorageError::Directory)?;
                info!(mode = "disk", "artifact store ready");
                Some(layout)
            }
            StorageMode::Memory => {
                info!(mode = "memory", "artifact store ready");
                None
            }
        };
        Ok(Self {
            config,
            layout,
            registry: RwLock::new(HashMap::new()),
            clock,
            ids,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Validate untrusted bytes, then persist and register them.
    ///
    /// Nothing is registered unless every check passes.
    pub fn validate_and_store(&self, raw: &[u8]) -> Result<ArtifactId, StoreRejection> {
        let facts = validation::validate_image(raw, &self.config).inspect_err(|e| {
            warn!(op = "validate", size = raw.len(), reason = %e, "upload rejected");
        })?;
        debug!(
            op = "validate",
            media = %facts.media_type,
            width = facts.width,
            height = facts.height,
            "upload validated"
        );
        Ok(self.persist(raw, facts.media_type, ArtifactOrigin::Uploaded)?)
    }

    /// Register bytes from a trusted producer. The digest is still computed here.
    pub fn store_generated(&self, bytes: &[u8], media_type: MediaType) -> Option<ArtifactId> {
        if bytes.is_empty() {
            warn!(op = "store_generated", "refusing empty artifact");
            return None;
        }
        self.persist(bytes, media_type, ArtifactOrigin::Generated)
            .inspect_err(|e| warn!(op = "store_generated", error = %e, "failed to store artifact"))
            .ok()
    }

    fn persist(
        &self,
        bytes: &[u8],
        media_type: MediaType,
        origin: ArtifactOrigin,
    ) -> Result<ArtifactId, StorageError> {
        let digest = validation::digest(bytes);
        let id = self.ids.generate_artifact_id();
        let now = self.clock.now();

        let mut registry = self.registry.write();
        let location = match &self.layout {
            Some(layout) => {
                let path = layout.path_for(&digest, id, media_type);
                if let Err(source) = layout.write_new(&path, bytes) {
                    // a partially written file must not outlive the failure
                    if let Err(e) = layout::wipe_file(&path) {
                        warn!(
                            op = "persist",
                            artifact = %id,
                            error = %e,
                            "failed to wipe partially written file"
                        );
                    }
                    return Err(StorageError::Write {
                        op: "persist",
                        artifact: id.to_string(),
                        source,
                    });
                }
                ArtifactLocation::OnDisk(path)
            }
            None => ArtifactLocation::InMemory(bytes.to_vec()),
        };

        info!(
            op = "persist",
            artifact = %id,
            digest = digest.prefix(LOG_DIGEST_LEN),
            ?origin,
            size = bytes.len(),
            "artifact stored"
        );
        let record = ArtifactRecord::new(
            id,
            digest,
            location,
            media_type,
            origin,
            bytes.len() as u64,
            now,
        );
        registry.insert(id, record);
        Ok(id)
    }

    /// Bytes for `id`, refreshing its last access. `None` if unknown or unreadable.
    pub fn get_data(&self, id: ArtifactId) -> Option<Vec<u8>> {
        let registry = self.registry.read();
        let Some(record) = registry.get(&id) else {
            debug!(op = "get_data", artifact = %id, "unknown artifact");
            return None;
        };
        match read_bytes(record) {
            Ok(bytes) => {
                record.touch(self.clock.now());
                Some(bytes)
            }
            Err(e) => {
                warn!(op = "get_data", artifact = %id, error = %e, "artifact unreadable");
                None
            }
        }
    }

    /// Bytes for `id` only if they still match the registered digest.
    pub fn get_verified(&self, id: ArtifactId) -> Option<Vec<u8>> {
        let registry = self.registry.read();
        let record = registry.get(&id)?;
        match verified_bytes(record) {
            Ok(bytes) => {
                record.touch(self.clock.now());
                Some(bytes)
            }
            Err(e) => {
                warn!(op = "get_verified", artifact = %id, reason = %e, "integrity check failed");
                None
            }
        }
    }

    /// Recompute the digest of the stored bytes and compare. Fail-closed.
    pub fn verify_integrity(&self, id: ArtifactId) -> bool {
        match self.check_integrity(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(op = "verify", artifact = %id, reason = %e, "integrity check failed");
                false
            }
        }
    }

    /// Like [`verify_integrity`](Self::verify_integrity), with the reason.
    pub fn check_integrity(&self, id: ArtifactId) -> Result<(), IntegrityError> {
        let registry = self.registry.read();
        let record = registry.get(&id).ok_or(IntegrityError::Unknown(id))?;
        verified_bytes(record).map(|_| ())
    }

    /// Bytes plus a display file name.
    pub fn open_named(&self, id: ArtifactId) -> Option<NamedArtifact> {
        let registry = self.registry.read();
        let record = registry.get(&id)?;
        let bytes = read_bytes(record)
            .inspect_err(|e| {
                warn!(op = "open_named", artifact = %id, error = %e, "artifact unreadable")
            })
            .ok()?;
        record.touch(self.clock.now());
        Some(NamedArtifact {
            file_name: record.file_name(),
            media_type: record.media_type,
            bytes,
        })
    }

    pub fn info(&self, id: ArtifactId) -> Option<ArtifactInfo> {
        self.registry.read().get(&id).map(ArtifactRecord::info)
    }

    /// Metadata for every registered artifact, oldest first.
    pub fn list(&self) -> Vec<ArtifactInfo> {
        let mut infos: Vec<_> = self.registry.read().values().map(ArtifactRecord::info).collect();
        infos.sort_by_key(|i| (i.created_at, i.id));
        infos
    }

    pub fn contains(&self, id: ArtifactId) -> bool {
        self.registry.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Zero-fill, remove, then deregister.
    ///
    /// Returns `Ok(false)` for an unknown id. If the wipe fails the artifact
    /// stays registered so a later sweep retries it.
    pub fn delete(&self, id: ArtifactId) -> Result<bool, StorageError> {
        self.delete_if(id, |_| true)
    }

    /// `delete`, but only if `eligible` still holds under the write lock.
    fn delete_if(
        &self,
        id: ArtifactId,
        eligible: impl Fn(&ArtifactRecord) -> bool,
    ) -> Result<bool, StorageError> {
        let mut registry = self.registry.write();
        let Some(record) = registry.get_mut(&id) else {
            debug!(op = "delete", artifact = %id, "nothing to delete");
            return Ok(false);
        };
        if !eligible(&*record) {
            debug!(op = "delete", artifact = %id, "artifact no longer eligible, kept");
            return Ok(false);
        }
        match &mut record.location {
            ArtifactLocation::OnDisk(path) => {
                layout::wipe_file(path).map_err(|source| StorageError::Remove {
                    artifact: id.to_string(),
                    source,
                })?;
            }
            ArtifactLocation::InMemory(bytes) => bytes.zeroize(),
        }
        if let Some(record) = registry.remove(&id) {
            info!(
                op = "delete",
                artifact = %id,
                digest = record.digest.prefix(LOG_DIGEST_LEN),
                "artifact deleted"
            );
        }
        Ok(true)
    }

    fn expired_ids(&self, cutoff: DateTime<Utc>) -> (usize, Vec<ArtifactId>) {
        let registry = self.registry.read();
        let expired = registry
            .values()
            .filter(|r| r.is_expired(cutoff))
            .map(|r| r.id)
            .collect();
        (registry.len(), expired)
    }

    fn delete_each(
        &self,
        ids: &[ArtifactId],
        op: &'static str,
        eligible: impl Fn(&ArtifactRecord) -> bool,
    ) -> (usize, usize) {
        let mut deleted = 0;
        let mut failed = 0;
        for id in ids {
            match self.delete_if(*id, &eligible) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(op, artifact = %id, error = %e, "failed to purge artifact");
                    failed += 1;
                }
            }
        }
        (deleted, failed)
    }

    /// Wipe layout-named files in the storage directory that no record points at.
    fn wipe_orphans(&self) -> Result<(usize, usize), StorageError> {
        let Some(layout) = &self.layout else {
            return Ok((0, 0));
        };
        // write lock: no registration can race the directory scan
        let registry = self.registry.write();
        let known: HashSet<&PathBuf> = registry
            .values()
            .filter_map(|r| match &r.location {
                ArtifactLocation::OnDisk(path) => Some(path),
                ArtifactLocation::InMemory(_) => None,
            })
            .collect();

        let mut wiped = 0;
        let mut failed = 0;
        for path in layout.artifact_files().map_err(StorageError::Directory)? {
            if known.contains(&path) {
                continue;
            }
            match layout::wipe_file(&path) {
                Ok(()) => wiped += 1,
                Err(e) => {
                    warn!(op = "purge_all", error = %e, "failed to wipe orphan file");
                    failed += 1;
                }
            }
        }
        Ok((wiped, failed))
    }
}

impl Prunable for SecureArtifactStore {
    fn purge_expired(&self, horizon: Duration) -> Result<SweepReport, StorageError> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(to_chrono(horizon))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (scanned, expired) = self.expired_ids(cutoff);
        // a read between collection and deletion refreshes the record
        let (deleted, failed) =
            self.delete_each(&expired, "purge_expired", |r| r.is_expired(cutoff));

        info!(op = "purge_expired", scanned, deleted, failed, "retention sweep finished");
        if failed > 0 {
            return Err(StorageError::Sweep { failed });
        }
        Ok(SweepReport {
            scanned,
            deleted,
            orphans: 0,
        })
    }

    fn purge_all(&self) -> Result<SweepReport, StorageError> {
        let ids: Vec<ArtifactId> = self.registry.read().keys().copied().collect();
        let (deleted, mut failed) = self.delete_each(&ids, "purge_all", |_| true);
        let (orphans, orphans_failed) = self.wipe_orphans()?;
        failed += orphans_failed;

        info!(op = "purge_all", deleted, orphans, failed, "store purged");
        if failed > 0 {
            return Err(StorageError::Sweep { failed });
        }
        Ok(SweepReport {
            scanned: ids.len(),
            deleted,
            orphans,
        })
    }
}

fn read_bytes(record: &ArtifactRecord) -> Result<Vec<u8>, StorageError> {
    match &record.location {
        ArtifactLocation::InMemory(bytes) => Ok(bytes.clone()),
        ArtifactLocation::OnDisk(path) => {
            layout::read_file(path).map_err(|source| StorageError::Read {
                artifact: record.id.to_string(),
                source,
            })
        }
    }
}

fn verified_bytes(record: &ArtifactRecord) -> Result<Vec<u8>, IntegrityError> {
    if record.digest.is_empty() {
        return Err(IntegrityError::MissingDigest(record.id));
    }
    let bytes = read_bytes(record).map_err(|_| IntegrityError::Missing(record.id))?;
    let actual = validation::digest(&bytes);
    if actual != record.digest {
        return Err(IntegrityError::Mismatch {
            id: record.id,
            expected: record.digest.prefix(LOG_DIGEST_LEN).to_string(),
            actual: actual.prefix(LOG_DIGEST_LEN).to_string(),
        });
    }
    Ok(bytes)
}
