//! Artifact model: media types, digests, locations and metadata views.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ArtifactId;

/// Media types the store knows how to validate.
///
/// The allow-list in `StoreConfig` is a subset of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
}

impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Png, MediaType::Jpeg];

    /// File extension used in on-disk names.
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpeg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    /// Parse a file extension (as found on disk or in config).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(MediaType::Png),
            "jpeg" | "jpg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            MediaType::Png => image::ImageFormat::Png,
            MediaType::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Hex-encoded SHA-256 digest of an artifact's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short prefix for log lines and file names.
    pub fn prefix(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an artifact's bytes live.
///
/// Exactly one variant is authoritative for a record; there is no
/// "maybe loaded" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    InMemory(Vec<u8>),
    OnDisk(PathBuf),
}

impl ArtifactLocation {
    pub fn is_on_disk(&self) -> bool {
        matches!(self, ArtifactLocation::OnDisk(_))
    }
}

/// How the bytes entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Untrusted caller-supplied bytes that passed full validation.
    Uploaded,
    /// Bytes produced by a trusted internal producer.
    Generated,
}

/// Serialisable snapshot of an artifact's metadata.
///
/// Carries the file name only, never the full storage path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: ArtifactId,
    pub digest: Digest,
    pub media_type: MediaType,
    pub origin: ArtifactOrigin,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub on_disk: bool,
    pub file_name: String,
}

/// Bytes plus a display name, for handing an artifact to a consumer that
/// expects a named file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArtifact {
    pub file_name: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}
