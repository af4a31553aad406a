//! On-disk layout of the artifact directory.
//!
//! - directory: mode 0700
//! - files: `<digest[..10]>_<ulid>.<ext>`, mode 0600, created with `create_new`
//! - wipe: overwrite the full length with zeros, sync, then unlink

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use ulid::Ulid;

use crate::domain::{ArtifactId, Digest, MediaType};

const DIGEST_PREFIX_LEN: usize = 10;
const WIPE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct DiskLayout {
    dir: PathBuf,
}

impl DiskLayout {
    /// Create (or reuse) `dir` and restrict it to the owner.
    pub fn prepare(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, digest: &Digest, id: ArtifactId, media_type: MediaType) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            digest.prefix(DIGEST_PREFIX_LEN),
            id.as_ulid(),
            media_type.extension()
        ))
    }

    /// Write `bytes` to a path that must not exist yet.
    pub fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// Regular files in the directory named the way `path_for` names them.
    ///
    /// Anything else in the directory is left to whoever put it there.
    pub fn artifact_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_str().is_some_and(is_artifact_name) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}

/// `<10 lowercase hex>_<ulid>.<png|jpeg>`
fn is_artifact_name(name: &str) -> bool {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    if !MediaType::from_extension(ext).is_some_and(|m| m.extension() == ext) {
        return false;
    }
    let Some((prefix, ulid)) = stem.split_once('_') else {
        return false;
    };
    prefix.len() == DIGEST_PREFIX_LEN
        && prefix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && Ulid::from_string(ulid).is_ok()
}

pub fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Zero-fill then remove. A file that is already gone is not an error.
pub fn wipe_file(path: &Path) -> io::Result<()> {
    match overwrite_with_zeros(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn overwrite_with_zeros(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    let zeros = [0u8; WIPE_CHUNK];
    let mut left = len;
    while left > 0 {
        let n = left.min(WIPE_CHUNK as u64) as usize;
        file.write_all(&zeros[..n])?;
        left -= n as u64;
    }
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn file_name_uses_digest_prefix_and_ulid() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DiskLayout::prepare(tmp.path()).unwrap();
        let ulid = Ulid::new();
        let path = layout.path_for(
            &Digest::from_hex("0123456789abcdef"),
            ArtifactId::from_ulid(ulid),
            MediaType::Jpeg,
        );
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("0123456789_{ulid}.jpeg")
        );
        assert_eq!(path.parent(), Some(tmp.path()));
    }

    #[test]
    fn write_new_refuses_to_clobber() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DiskLayout::prepare(tmp.path()).unwrap();
        let path = tmp.path().join("a.png");

        layout.write_new(&path, b"first").unwrap();
        let err = layout.write_new(&path, b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(read_file(&path).unwrap(), b"first");
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");
        let layout = DiskLayout::prepare(&dir).unwrap();
        let path = dir.join("a.png");
        layout.write_new(&path, b"x").unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }

    #[test]
    fn wipe_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DiskLayout::prepare(tmp.path()).unwrap();
        let path = tmp.path().join("a.png");
        layout.write_new(&path, &vec![7u8; WIPE_CHUNK + 10]).unwrap();

        wipe_file(&path).unwrap();
        assert!(!path.exists());
        wipe_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn only_layout_named_files_are_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DiskLayout::prepare(tmp.path()).unwrap();
        let ours = layout.path_for(
            &Digest::from_hex("abcdef0123456789"),
            ArtifactId::from_ulid(Ulid::new()),
            MediaType::Png,
        );
        layout.write_new(&ours, b"x").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"keep me").unwrap();
        fs::create_dir(tmp.path().join("0123456789_sub.png")).unwrap();

        assert_eq!(layout.artifact_files().unwrap(), vec![ours]);
    }

    #[rstest]
    #[case("0123456789_01ARZ3NDEKTSV4RRFFQ69G5FAV.png", true)]
    #[case("abcdefabcd_01ARZ3NDEKTSV4RRFFQ69G5FAV.jpeg", true)]
    #[case("notes.txt", false)]
    #[case("leftover_from_last_run.png", false)]
    #[case("0123456789_01ARZ3NDEKTSV4RRFFQ69G5FAV.jpg", false)]
    #[case("0123456789_01ARZ3NDEKTSV4RRFFQ69G5FAV.gif", false)]
    #[case("ABCDEF0123_01ARZ3NDEKTSV4RRFFQ69G5FAV.png", false)]
    #[case("012345678_01ARZ3NDEKTSV4RRFFQ69G5FAV.png", false)]
    #[case("0123456789_not-a-ulid.png", false)]
    #[case("0123456789_01ARZ3NDEKTSV4RRFFQ69G5FAV", false)]
    fn artifact_names_follow_the_layout(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_artifact_name(name), expected);
    }

    #[test]
    fn zero_fill_covers_full_length() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        fs::write(&path, vec![0xEEu8; WIPE_CHUNK * 2 + 3]).unwrap();

        overwrite_with_zeros(&path).unwrap();
        let after = fs::read(&path).unwrap();
        assert_eq!(after.len(), WIPE_CHUNK * 2 + 3);
        assert!(after.iter().all(|b| *b == 0));
    }
}
