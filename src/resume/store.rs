//! Durable, append-only resume records.

use super::manifest::{self, ManifestHeader, ResumeManifest};
use super::ResumeKey;
use crate::error::{Error, Result};
use crate::segment::ByteRange;

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File extension of resume records.
pub const RECORD_EXTENSION: &str = "resume";

struct Journal {
    file: File,
    recorded: BTreeSet<ByteRange>,
}

/// Stores one record per [`ResumeKey`] in a directory.
///
/// A record is a JSON-lines file: the [`ManifestHeader`] followed by one line
/// per completed range. Every write is flushed and synced before the call
/// returns. Writers are serialized by an async mutex.
pub struct ResumeStore {
    directory: PathBuf,
    journals: Mutex<HashMap<String, Journal>>,
}

impl std::fmt::Debug for ResumeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeStore")
            .field("directory", &self.directory)
            .finish()
    }
}

impl ResumeStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            journals: Mutex::new(HashMap::new()),
        }
    }

    /// Directory the records live in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the record for `key`.
    pub fn record_path(&self, key: &ResumeKey) -> PathBuf {
        self.directory
            .join(format!("{}.{RECORD_EXTENSION}", key.name()))
    }

    /// Load the record for `key`.
    ///
    /// Returns `None` when there is no record, when it cannot be read back in
    /// full, or when it was written for a different file than the one
    /// currently at the destination.
    pub async fn load(&self, key: &ResumeKey) -> Result<Option<ResumeManifest>> {
        let path = self.record_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Ignoring unreadable resume record {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(Error::storage(path, e)),
        };

        let (header, completed) = match manifest::parse(&content) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!("Ignoring corrupt resume record {:?}: {}", path, reason);
                return Ok(None);
            }
        };

        if key.file() != Some(header.file) {
            warn!(
                "Ignoring resume record {:?}: destination {:?} was replaced",
                path,
                key.destination()
            );
            return Ok(None);
        }

        debug!(
            "Loaded resume record {:?} with {} completed ranges",
            path,
            completed.len()
        );
        Ok(Some(ResumeManifest {
            name: key.name().to_string(),
            header,
            completed,
        }))
    }

    /// Start a fresh record for `key`, replacing any previous one.
    pub async fn initialize(&self, key: &ResumeKey, header: &ManifestHeader) -> Result<()> {
        let mut journals = self.journals.lock().await;
        let path = self.record_path(key);

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| Error::storage(&self.directory, e))?;

        let line = manifest::line(header)
            .map_err(|e| Error::Internal(format!("cannot serialize resume header: {e}")))?;
        let mut file = File::create(&path)
            .await
            .map_err(|e| Error::storage(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::storage(&path, e))?;
        file.flush().await.map_err(|e| Error::storage(&path, e))?;
        file.sync_data().await.map_err(|e| Error::storage(&path, e))?;

        debug!("Initialized resume record {:?}", path);
        journals.insert(
            key.name().to_string(),
            Journal {
                file,
                recorded: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Append `range` to the record of `key`.
    ///
    /// Returns `false` without writing when the range is already recorded.
    /// The line is synced to disk before this returns.
    pub async fn record_complete(&self, key: &ResumeKey, range: ByteRange) -> Result<bool> {
        let mut journals = self.journals.lock().await;

        if !journals.contains_key(key.name()) {
            let journal = self.reopen(key).await?;
            journals.insert(key.name().to_string(), journal);
        }
        let Some(journal) = journals.get_mut(key.name()) else {
            return Err(Error::Internal("resume journal vanished".into()));
        };

        if journal.recorded.contains(&range) {
            return Ok(false);
        }

        let path = self.record_path(key);
        let line = manifest::line(&range)
            .map_err(|e| Error::Internal(format!("cannot serialize range: {e}")))?;
        journal
            .file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::storage(&path, e))?;
        journal
            .file
            .flush()
            .await
            .map_err(|e| Error::storage(&path, e))?;
        journal
            .file
            .sync_data()
            .await
            .map_err(|e| Error::storage(&path, e))?;
        journal.recorded.insert(range);

        debug!("Recorded {} as complete", range);
        Ok(true)
    }

    /// Remove the record of `key`. A missing record is not an error.
    pub async fn clear(&self, key: &ResumeKey) -> Result<()> {
        let mut journals = self.journals.lock().await;
        journals.remove(key.name());

        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Cleared resume record {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    async fn reopen(&self, key: &ResumeKey) -> Result<Journal> {
        let path = self.record_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ResumeStateInvalid(format!(
                    "no resume record at {}",
                    path.display()
                )))
            }
            Err(e) => return Err(Error::storage(path, e)),
        };
        let (_, recorded) = manifest::parse(&content)
            .map_err(|reason| Error::ResumeStateInvalid(format!("{}: {reason}", path.display())))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::storage(&path, e))?;
        Ok(Journal { file, recorded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::{FileIdentity, MANIFEST_VERSION};
    use reqwest::Url;

    async fn setup(dir: &Path) -> (ResumeStore, ResumeKey, ManifestHeader) {
        let dest = dir.join("f.bin");
        std::fs::write(&dest, vec![0u8; 100]).unwrap();
        let url = Url::parse("https://example.com/f.bin").unwrap();
        let key = ResumeKey::derive(&url, &dest).await.unwrap();
        let header = ManifestHeader {
            version: MANIFEST_VERSION,
            url: url.to_string(),
            destination: dest.display().to_string(),
            total_size: 100,
            chunk_size: 40,
            algorithm: "none".into(),
            file: key.file().unwrap(),
            etag: None,
            last_modified: None,
        };
        (ResumeStore::new(dir.join("state")), key, header)
    }

    #[tokio::test]
    async fn test_absent_record() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, _) = setup(dir.path()).await;
        assert!(store.load(&key).await.unwrap().is_none());
        store.clear(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, header) = setup(dir.path()).await;
        store.initialize(&key, &header).await.unwrap();
        assert!(store.record_complete(&key, ByteRange::new(0, 39)).await.unwrap());
        assert!(store.record_complete(&key, ByteRange::new(80, 99)).await.unwrap());

        let manifest = store.load(&key).await.unwrap().unwrap();
        assert_eq!(manifest.header, header);
        assert_eq!(manifest.completed_bytes(), 60);
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, header) = setup(dir.path()).await;
        store.initialize(&key, &header).await.unwrap();

        assert!(store.record_complete(&key, ByteRange::new(40, 79)).await.unwrap());
        let once = std::fs::read(store.record_path(&key)).unwrap();
        assert!(!store.record_complete(&key, ByteRange::new(40, 79)).await.unwrap());
        let twice = std::fs::read(store.record_path(&key)).unwrap();
        assert_eq!(once, twice);

        // A fresh store reads the journal back before appending.
        let other = ResumeStore::new(store.directory());
        assert!(!other.record_complete(&key, ByteRange::new(40, 79)).await.unwrap());
        assert_eq!(std::fs::read(store.record_path(&key)).unwrap(), once);
    }

    #[tokio::test]
    async fn test_torn_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, header) = setup(dir.path()).await;
        store.initialize(&key, &header).await.unwrap();
        store.record_complete(&key, ByteRange::new(0, 39)).await.unwrap();

        let path = store.record_path(&key);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"start\":40,");
        std::fs::write(&path, content).unwrap();

        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_for_other_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, mut header) = setup(dir.path()).await;
        header.file = FileIdentity {
            device: u64::MAX,
            inode: u64::MAX,
            created: None,
        };
        store.initialize(&key, &header).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_for_recreated_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, mut header) = setup(dir.path()).await;
        // Same device and inode, born at another time.
        header.file.created = Some(header.file.created.unwrap_or(0).wrapping_add(1));
        store.initialize(&key, &header).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_without_initialize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, _) = setup(dir.path()).await;
        let err = store
            .record_complete(&key, ByteRange::new(0, 39))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResumeStateInvalid(_)));
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let (store, key, header) = setup(dir.path()).await;
        store.initialize(&key, &header).await.unwrap();
        store.clear(&key).await.unwrap();
        assert!(!store.record_path(&key).exists());
        assert!(store.load(&key).await.unwrap().is_none());
    }
}
