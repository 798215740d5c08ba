// One run of the incremental sync:
//   INIT -> LISTING -> SELECTING -> PROCESSING -> FINALIZING -> DONE
// with FAILED reached only when the catalog or the metadata store is unusable.
// Datasets that fail to download, normalize or save are reported but never
// fail the run, and never move the watermark.

use std::fmt;

use futures::{stream, StreamExt};
use itertools::Itertools;
use jiff::Timestamp;
use log::{error, info};
use thiserror::Error;

use crate::{
    api::cms::{
        catalog::{Catalog, CatalogError, DatasetDescriptor},
        download::{FetchError, Fetcher},
    },
    db::cms::{
        hospitals_archive::{ArchiveError, HospitalsArchive},
        watermark::{MetadataStore, MetadataStoreError},
    },
    sync::selector::select_modified_since,
    utils::csv_header::{normalize_csv, NormalizeError},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    Listing,
    Selecting,
    Processing,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::Listing => write!(f, "LISTING"),
            RunState::Selecting => write!(f, "SELECTING"),
            RunState::Processing => write!(f, "PROCESSING"),
            RunState::Finalizing => write!(f, "FINALIZING"),
            RunState::Done => write!(f, "DONE"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a single dataset was left out of the run.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("normalization worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("write failed: {0}")]
    Write(#[from] ArchiveError),
}

/// Errors that stop the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("metadata store error: {0}")]
    MetadataStore(#[from] MetadataStoreError),
}

#[derive(Debug)]
pub struct DatasetSuccess {
    pub id: String,
    pub modified_at: Timestamp,
    pub path: String,
}

#[derive(Debug)]
pub struct DatasetFailure {
    pub id: String,
    pub modified_at: Timestamp,
    pub error: DatasetError,
}

#[derive(Debug)]
pub struct RunReport {
    pub previous_watermark: Option<Timestamp>,
    pub watermark: Option<Timestamp>,
    /// Datasets of the theme listed by the catalog.
    pub listed: usize,
    pub selected: usize,
    pub succeeded: Vec<DatasetSuccess>,
    pub failed: Vec<DatasetFailure>,
}

impl RunReport {
    pub fn watermark_advanced(&self) -> bool {
        self.watermark != self.previous_watermark
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |w: Option<Timestamp>| w.map_or("none".to_string(), |w| w.to_string());
        write!(
            f,
            "listed: {}, selected: {}, succeeded: {}, failed: {}, watermark: {} -> {}",
            self.listed,
            self.selected,
            self.succeeded.len(),
            self.failed.len(),
            show(self.previous_watermark),
            show(self.watermark),
        )
    }
}

/// The new watermark is the latest modification time among the datasets that
/// made it to disk, and never earlier than the previous watermark.
pub fn next_watermark(
    previous: Option<Timestamp>,
    succeeded: &[DatasetSuccess],
) -> Option<Timestamp> {
    succeeded
        .iter()
        .map(|s| s.modified_at)
        .chain(previous)
        .max()
}

pub struct RunController<C, F> {
    catalog: C,
    fetcher: F,
    archive: HospitalsArchive,
    max_workers: usize,
}

impl<C: Catalog, F: Fetcher> RunController<C, F> {
    pub fn new(catalog: C, fetcher: F, archive: HospitalsArchive, max_workers: usize) -> Self {
        RunController {
            catalog,
            fetcher,
            archive,
            max_workers: max_workers.max(1),
        }
    }

    /// A complete run: read the watermark, sync, and store the new watermark.
    /// The store is written last, and only if the watermark moved.
    pub async fn run(&self, store: &MetadataStore) -> Result<RunReport, SyncError> {
        match self.run_with_store(store).await {
            Ok(report) => {
                info!("run state: {}", RunState::Done);
                Ok(report)
            }
            Err(e) => {
                error!("run state: {} ({})", RunState::Failed, e);
                Err(e)
            }
        }
    }

    async fn run_with_store(&self, store: &MetadataStore) -> Result<RunReport, SyncError> {
        info!("run state: {}", RunState::Init);
        let watermark = store.load().await?;
        let report = self.sync(watermark).await?;
        if report.watermark_advanced() {
            if let Some(w) = report.watermark {
                store.store(w).await?;
            }
        } else {
            info!("Watermark unchanged");
        }
        Ok(report)
    }

    /// Process everything modified after `watermark` and return the report,
    /// including the watermark to keep for the next run.  Nothing is persisted
    /// besides the dataset files.
    pub async fn sync(&self, watermark: Option<Timestamp>) -> Result<RunReport, SyncError> {
        info!("run state: {}", RunState::Listing);
        let descriptors = self.catalog.list_datasets().await?;
        let listed = descriptors.len();

        info!("run state: {}", RunState::Selecting);
        let selected = select_modified_since(descriptors, watermark);
        info!(
            "{} of {} datasets modified since {}",
            selected.len(),
            listed,
            watermark.map_or("the beginning".to_string(), |w| w.to_string())
        );

        info!("run state: {}", RunState::Processing);
        let n_selected = selected.len();
        let outcomes: Vec<Result<DatasetSuccess, DatasetFailure>> = stream::iter(selected)
            .map(|descriptor| self.process(descriptor))
            .buffer_unordered(self.max_workers)
            .collect()
            .await;
        let (succeeded, failed): (Vec<_>, Vec<_>) = outcomes.into_iter().partition_result();

        info!("run state: {}", RunState::Finalizing);
        let report = RunReport {
            previous_watermark: watermark,
            watermark: next_watermark(watermark, &succeeded),
            listed,
            selected: n_selected,
            succeeded,
            failed,
        };
        info!("{}", report);
        Ok(report)
    }

    async fn process(
        &self,
        descriptor: DatasetDescriptor,
    ) -> Result<DatasetSuccess, DatasetFailure> {
        match self.download_and_save(&descriptor).await {
            Ok(path) => Ok(DatasetSuccess {
                id: descriptor.id,
                modified_at: descriptor.modified_at,
                path,
            }),
            Err(error) => {
                error!("Failed to process dataset {}: {}", descriptor.id, error);
                Err(DatasetFailure {
                    id: descriptor.id,
                    modified_at: descriptor.modified_at,
                    error,
                })
            }
        }
    }

    async fn download_and_save(
        &self,
        descriptor: &DatasetDescriptor,
    ) -> Result<String, DatasetError> {
        info!("Downloading dataset: {}", descriptor.id);
        let raw = self.fetcher.fetch(&descriptor.download_url).await?;
        let normalized = tokio::task::spawn_blocking(move || normalize_csv(&raw)).await??;
        let path = self.archive.write(&descriptor.id, &normalized).await?;
        Ok(path)
    }
}
