// Normalized CSV files for the CMS Provider Data "Hospitals" datasets, one file
// per dataset identifier.

use std::{
    io,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use log::info;
use thiserror::Error;
use tokio::fs;

// Distinguishes the temporary files of concurrent writes to the same dataset.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid dataset identifier {0:?}")]
    InvalidId(String),
    #[error("failed to write {path}: {source}")]
    Io { path: String, source: io::Error },
}

#[derive(Clone, Debug)]
pub struct HospitalsArchive {
    pub base_dir: String,
}

impl HospitalsArchive {
    /// Path to the CSV file of a dataset.  Does not check if the file exists.
    pub fn filename(&self, id: &str) -> String {
        self.base_dir.to_owned() + "/" + id + ".csv"
    }

    /// Write the file for a dataset, replacing any previous version.  The
    /// content goes to a temporary file first and is renamed into place, so a
    /// reader never sees a partial file.
    pub async fn write(&self, id: &str, data: &[u8]) -> Result<String, ArchiveError> {
        if !is_valid_id(id) {
            return Err(ArchiveError::InvalidId(id.to_string()));
        }
        let io_err = |path: &str| {
            let path = path.to_string();
            move |source| ArchiveError::Io { path, source }
        };

        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(io_err(&self.base_dir))?;
        let path = self.filename(id);
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = format!(
            "{}/.{}.csv.{}-{}.tmp",
            self.base_dir,
            id,
            std::process::id(),
            seq
        );
        fs::write(&tmp, data).await.map_err(io_err(&tmp))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(&path)(e));
        }
        info!("Saved dataset {} as {} ({} bytes)", id, path, data.len());
        Ok(path)
    }
}

/// An identifier must be usable as a file name inside `base_dir`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.contains(['/', '\\', '\0'])
        && Path::new(id).is_relative()
}
