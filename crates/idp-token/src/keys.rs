//! Rotating symmetric key repository.
//!
//! Keys live on durable storage, one file per key named by rotation
//! index. File `0` is the staged key (the *next* primary), the highest
//! index is the current primary used for encryption, and everything in
//! between is a secondary retained only for decrypting previously
//! issued tokens. Rotating on one node and then syncing the directory
//! to the others is safe because every node can decrypt with any key it
//! holds.
//!
//! ## Security
//!
//! The repository directory is created `0700` and key files `0600`;
//! key material never appears in logs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{TokenError, TokenResult};

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Raw key material.
pub type KeyMaterial = [u8; KEY_LEN];

/// Ordered set of symmetric keys on durable storage.
pub struct KeyRepository {
    dir: PathBuf,
    max_active_keys: usize,
    /// Primary-first snapshot of all keys. Readers clone the `Arc`, so a
    /// validation in progress keeps the key set it started with across
    /// a concurrent rotation.
    keys: RwLock<Arc<Vec<KeyMaterial>>>,
    /// Excludes concurrent rotations; never held across reads.
    rotation: Mutex<()>,
}

impl KeyRepository {
    /// Creates a handle over `dir`, retaining at most `max_active_keys`
    /// key files across rotations.
    ///
    /// A retention below two cannot keep both a primary and a staged
    /// key and is raised to two.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_active_keys: usize) -> Self {
        if max_active_keys < 2 {
            tracing::warn!(
                max_active_keys,
                "max_active_keys below 2 cannot retain a primary and a staged key; using 2"
            );
        }
        Self {
            dir: dir.into(),
            max_active_keys: max_active_keys.max(2),
            keys: RwLock::new(Arc::new(Vec::new())),
            rotation: Mutex::new(()),
        }
    }

    /// Creates the key directory and bootstraps it with key material.
    ///
    /// A repository that already holds keys is loaded as-is. Fails if
    /// the directory cannot be created or contains files that are not
    /// rotation-index key files.
    pub fn initialize(&self) -> TokenResult<()> {
        if !self.dir.exists() {
            tracing::info!(dir = %self.dir.display(), "creating key repository");
            fs::create_dir_all(&self.dir).map_err(|e| {
                TokenError::key_repository(format!(
                    "cannot create {}: {e}",
                    self.dir.display()
                ))
            })?;
            restrict_permissions(&self.dir, 0o700)?;
        }

        let files = self.list_key_files()?;
        if files.is_empty() {
            // Bootstrap: stage a key, then rotate so we end up with a
            // primary and a fresh staged key.
            self.write_new_key()?;
            self.rotate()?;
            tracing::info!(dir = %self.dir.display(), "key repository initialized");
        } else {
            self.reload()?;
            tracing::info!(
                count = files.len(),
                dir = %self.dir.display(),
                "key repository already initialized"
            );
        }
        Ok(())
    }

    /// All keys, primary first, as an owned snapshot.
    #[must_use]
    pub fn current_keys(&self) -> Arc<Vec<KeyMaterial>> {
        Arc::clone(&self.keys.read())
    }

    /// The key used for new encryption, if the repository is initialized.
    #[must_use]
    pub fn primary(&self) -> Option<KeyMaterial> {
        self.keys.read().first().copied()
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }

    /// Promotes the staged key to primary, stages a fresh key, and
    /// evicts the oldest secondaries past the retention window.
    ///
    /// Rotations exclude each other; readers observe either the pre- or
    /// post-rotation key set, never a partial one.
    pub fn rotate(&self) -> TokenResult<()> {
        let _guard = self.rotation.lock();

        let files = self.list_key_files()?;
        if !files.contains_key(&0) {
            return Err(TokenError::key_repository(
                "repository holds no staged key; not initialized".to_string(),
            ));
        }
        let current_max = files.keys().next_back().copied().unwrap_or(0);
        let new_primary = current_max + 1;

        fs::rename(self.key_path(0), self.key_path(new_primary)).map_err(|e| {
            TokenError::key_repository(format!("cannot promote staged key: {e}"))
        })?;
        tracing::info!(new_primary, "promoted staged key to primary");

        self.write_new_key()?;

        // Evict oldest secondaries beyond the retention window. The
        // staged key and the primary are never evicted.
        let mut files = self.list_key_files()?;
        while files.len() > self.max_active_keys {
            let Some(oldest) = files
                .keys()
                .copied()
                .find(|&idx| idx != 0 && idx != new_primary)
            else {
                break;
            };
            if let Some(path) = files.remove(&oldest) {
                fs::remove_file(&path).map_err(|e| {
                    TokenError::key_repository(format!("cannot evict key {oldest}: {e}"))
                })?;
                tracing::info!(index = oldest, "evicted excess key");
            }
        }

        self.reload()
    }

    fn key_path(&self, index: u64) -> PathBuf {
        self.dir.join(index.to_string())
    }

    /// Reads the directory listing, rejecting anything that is not a
    /// rotation-index key file.
    fn list_key_files(&self) -> TokenResult<BTreeMap<u64, PathBuf>> {
        let mut files = BTreeMap::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            TokenError::key_repository(format!("cannot read {}: {e}", self.dir.display()))
        })?;
        for entry in entries {
            let entry = entry
                .map_err(|e| TokenError::key_repository(format!("directory read failed: {e}")))?;
            let name = entry.file_name();
            let index = name
                .to_str()
                .and_then(|n| n.parse::<u64>().ok())
                .ok_or_else(|| {
                    TokenError::key_repository(format!(
                        "incompatible repository layout: unexpected entry {name:?}"
                    ))
                })?;
            files.insert(index, entry.path());
        }
        Ok(files)
    }

    /// Generates and stages a new key as file `0`.
    fn write_new_key(&self) -> TokenResult<()> {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        let path = self.key_path(0);
        fs::write(&path, URL_SAFE_NO_PAD.encode(key)).map_err(|e| {
            TokenError::key_repository(format!("cannot write key file: {e}"))
        })?;
        restrict_permissions(&path, 0o600)?;
        tracing::info!("staged a new key");
        Ok(())
    }

    /// Reloads the in-memory snapshot from disk, primary first.
    fn reload(&self) -> TokenResult<()> {
        let files = self.list_key_files()?;
        let mut loaded = Vec::with_capacity(files.len());
        // Descending index order: primary, secondaries, staged last.
        for (&index, path) in files.iter().rev() {
            loaded.push(read_key(path).map_err(|e| {
                TokenError::key_repository(format!("key file {index}: {e}"))
            })?);
        }
        tracing::debug!(count = loaded.len(), "loaded encryption keys");
        *self.keys.write() = Arc::new(loaded);
        Ok(())
    }
}

fn read_key(path: &Path) -> Result<KeyMaterial, String> {
    let encoded = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim())
        .map_err(|e| e.to_string())?;
    KeyMaterial::try_from(bytes.as_slice())
        .map_err(|_| format!("expected {KEY_LEN}-byte key, got {}", bytes.len()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> TokenResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        TokenError::key_repository(format!("cannot set permissions on {}: {e}", path.display()))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> TokenResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(max_active_keys: usize) -> (tempfile::TempDir, KeyRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = KeyRepository::new(dir.path().join("keys"), max_active_keys);
        (dir, repo)
    }

    #[test]
    fn initialize_creates_primary_and_staged() {
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        assert_eq!(repo.key_count(), 2);
        assert!(repo.primary().is_some());
    }

    #[test]
    fn initialize_is_idempotent() {
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        let keys = repo.current_keys();
        repo.initialize().unwrap();
        assert_eq!(*repo.current_keys(), *keys);
    }

    #[test]
    fn rotation_changes_primary_and_keeps_old_key() {
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        let old_primary = repo.primary().unwrap();

        repo.rotate().unwrap();
        let new_primary = repo.primary().unwrap();
        assert_ne!(old_primary, new_primary);
        // The demoted primary is still present for decryption.
        assert!(repo.current_keys().contains(&old_primary));
    }

    #[test]
    fn retention_evicts_oldest_secondaries() {
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        for _ in 0..5 {
            repo.rotate().unwrap();
        }
        assert_eq!(repo.key_count(), 3);
    }

    #[test]
    fn incompatible_layout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("not-a-key"), "junk").unwrap();
        let repo = KeyRepository::new(dir.path(), 3);
        assert!(matches!(
            repo.initialize(),
            Err(TokenError::KeyRepository(_))
        ));
    }

    #[test]
    fn rotate_requires_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let repo = KeyRepository::new(dir.path(), 3);
        assert!(matches!(repo.rotate(), Err(TokenError::KeyRepository(_))));
    }

    #[test]
    fn reader_snapshot_survives_rotation() {
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        let snapshot = repo.current_keys();
        let before: Vec<KeyMaterial> = snapshot.to_vec();
        repo.rotate().unwrap();
        // The pre-rotation snapshot is untouched.
        assert_eq!(*snapshot, before);
        assert_ne!(*repo.current_keys(), *snapshot);
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_tmp, repo) = repo(3);
        repo.initialize().unwrap();
        let staged = repo.key_path(0);
        let mode = fs::metadata(staged).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
