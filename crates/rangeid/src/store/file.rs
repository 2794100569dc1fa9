use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::Mutex;

use super::{DocumentStore, Precondition, StoreError, Version, VersionedValue};

const EXTENSION: &str = "json";

/// [`DocumentStore`] keeping one file per document under a directory.
///
/// Each file starts with the document version on its own line, followed by
/// the document bytes. Writes go to a temporary file that is renamed over the
/// previous one, so readers never observe a partial document.
///
/// Conditional writes are serialized within the process; the store assumes
/// it is the only process writing to its directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }

    async fn read(path: &Path) -> Result<Option<VersionedValue>, StoreError> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        decode(path, Bytes::from(contents)).map(Some)
    }
}

fn decode(path: &Path, mut contents: Bytes) -> Result<VersionedValue, StoreError> {
    let corrupt = || StoreError::Corrupt(format!("bad version header in {}", path.display()));
    let newline = contents.iter().position(|&b| b == b'\n').ok_or_else(corrupt)?;
    let header = contents.split_to(newline);
    let version = core::str::from_utf8(&header)
        .ok()
        .and_then(|header| header.trim().parse::<u64>().ok())
        .ok_or_else(corrupt)?;
    // Skip the newline itself.
    let value = contents.split_off(1);
    Ok(VersionedValue::new(Version::new(version), value))
}

impl DocumentStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let path = self.path_for(key)?;
        Self::read(&path).await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: Precondition,
    ) -> Result<Version, StoreError> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;

        let current = Self::read(&path).await?.map(|document| document.version);
        let version = precondition.check(current)?;

        let mut contents = format!("{}\n", version.value()).into_bytes();
        contents.extend_from_slice(&value);

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rangeid-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn persists_versioned_documents() {
        let dir = scratch_dir("persist");
        let store = FileStore::open(&dir).await.unwrap();

        assert!(store.get("app-1").await.unwrap().is_none());
        let v1 = store
            .put("app-1", Bytes::from_static(b"{\"a\":[1]}"), Precondition::DoesNotExist)
            .await
            .unwrap();

        let reopened = FileStore::open(&dir).await.unwrap();
        let stored = reopened.get("app-1").await.unwrap().unwrap();
        assert_eq!(stored.version, v1);
        assert_eq!(stored.value, Bytes::from_static(b"{\"a\":[1]}"));

        let stale = reopened
            .put("app-1", Bytes::from_static(b"{}"), Precondition::DoesNotExist)
            .await;
        assert!(matches!(stale, Err(StoreError::FailedPrecondition(_))));

        let v2 = reopened
            .put("app-1", Bytes::from_static(b"{}"), Precondition::MatchesVersion(v1))
            .await
            .unwrap();
        assert_eq!(v2, v1.next());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn damaged_header_is_permanent() {
        let dir = scratch_dir("corrupt");
        let store = FileStore::open(&dir).await.unwrap();

        for contents in [&b"{\"a\":[1]}"[..], b"seven\n{}"] {
            tokio::fs::write(dir.join("app.json"), contents).await.unwrap();
            let err = store.get("app").await.unwrap_err();
            assert!(matches!(err, StoreError::Corrupt(_)), "{err}");
            assert!(!err.is_retryable());
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_directory() {
        let dir = scratch_dir("keys");
        let store = FileStore::open(&dir).await.unwrap();

        for key in ["", "../etc", ".hidden", "a/b", "a b"] {
            assert!(
                matches!(store.get(key).await, Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
