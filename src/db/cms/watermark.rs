use std::{io, path::Path};

use jiff::Timestamp;
use log::info;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::utils::lib_time::parse_timestamp;

#[derive(Error, Debug)]
pub enum MetadataStoreError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },
}

// Older files hold a date-time without an offset, so reading goes through
// `parse_timestamp` rather than jiff's own deserializer.
fn deserialize_last_run<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Serialize, Deserialize)]
struct LastRun {
    #[serde(deserialize_with = "deserialize_last_run")]
    last_run: Timestamp,
}

/// Keeps the watermark of the last successful run in a small JSON file,
/// e.g. `{"last_run": "2024-01-02T00:00:00Z"}`.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    pub path: String,
}

impl MetadataStore {
    /// Read the stored watermark.  A missing file means this is the first run.
    pub async fn load(&self) -> Result<Option<Timestamp>, MetadataStoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(
                    "Metadata file {} does not exist.  Assuming first run.",
                    self.path
                );
                return Ok(None);
            }
            Err(source) => {
                return Err(MetadataStoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let last_run: LastRun =
            serde_json::from_str(&content).map_err(|e| MetadataStoreError::Parse {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(last_run.last_run))
    }

    /// Replace the stored watermark.  Written to a temporary file and renamed,
    /// so an interrupted write leaves the previous value in place.
    pub async fn store(&self, watermark: Timestamp) -> Result<(), MetadataStoreError> {
        let write_error = |source| MetadataStoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = Path::new(&self.path).parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await.map_err(write_error)?;
            }
        }
        let json = serde_json::to_string_pretty(&LastRun {
            last_run: watermark,
        })
        .map_err(|e| write_error(io::Error::other(e)))?;
        let tmp = format!("{}.tmp", self.path);
        fs::write(&tmp, json).await.map_err(write_error)?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_error(e));
        }
        info!("Stored watermark {} in {}", watermark, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs as std_fs;

    use super::*;

    fn store(dir: &tempfile::TempDir) -> MetadataStore {
        MetadataStore {
            path: dir
                .path()
                .join("out/metadata_last_update.json")
                .to_str()
                .unwrap()
                .to_string(),
        }
    }

    fn write_raw(store: &MetadataStore, content: &str) {
        std_fs::create_dir_all(Path::new(&store.path).parent().unwrap()).unwrap();
        std_fs::write(&store.path, content).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(&dir).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let ts: Timestamp = "2024-01-02T00:00:00Z".parse().unwrap();
        store.store(ts).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(ts));

        let later: Timestamp = "2024-02-01T12:30:00Z".parse().unwrap();
        store.store(later).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(later));
        assert!(!Path::new(&format!("{}.tmp", store.path)).exists());
    }

    #[tokio::test]
    async fn file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .store("2024-01-02T00:00:00Z".parse().unwrap())
            .await
            .unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std_fs::read_to_string(&store.path).unwrap()).unwrap();
        assert_eq!(v["last_run"], "2024-01-02T00:00:00Z");
    }

    #[tokio::test]
    async fn load_offset_and_naive_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        write_raw(&store, r#"{"last_run": "2024-05-06T07:08:09.123456"}"#);
        assert_eq!(
            store.load().await.unwrap(),
            Some("2024-05-06T07:08:09.123456Z".parse().unwrap())
        );
        write_raw(&store, r#"{"last_run": "2024-05-06T03:00:00-04:00"}"#);
        assert_eq!(
            store.load().await.unwrap(),
            Some("2024-05-06T07:00:00Z".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        write_raw(&store, "not json");
        assert!(matches!(
            store.load().await,
            Err(MetadataStoreError::Parse { .. })
        ));
        write_raw(&store, r#"{"last_run": "soon"}"#);
        assert!(matches!(
            store.load().await,
            Err(MetadataStoreError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn unwritable_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std_fs::write(&blocker, b"").unwrap();
        let store = MetadataStore {
            path: blocker
                .join("metadata_last_update.json")
                .to_str()
                .unwrap()
                .to_string(),
        };
        let res = store.store("2024-01-02T00:00:00Z".parse().unwrap()).await;
        assert!(matches!(res, Err(MetadataStoreError::Write { .. })));
    }
}
