// Dataset listing from the CMS Provider Data metastore.
// https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items

use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use log::{info, warn};
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::utils::lib_time::parse_timestamp;

pub const CMS_CATALOG_URL: &str =
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";

pub const HOSPITALS_THEME: &str = "Hospitals";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    Status(StatusCode),
    #[error("malformed catalog response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Catalog metadata about one dataset, without its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub id: String,
    pub themes: Vec<String>,
    pub modified_at: Timestamp,
    pub download_url: String,
}

/// Anything that can list the datasets of one theme.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>, CatalogError>;
}

/// The catalog publishes `theme` as an array, but a bare string is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Themes {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct Distribution {
    #[serde(rename = "downloadURL")]
    pub download_url: Option<String>,
}

/// One entry of the metastore response, as published.
#[derive(Debug, Deserialize)]
pub struct CatalogItem {
    pub identifier: Option<String>,
    #[serde(default)]
    theme: Option<Themes>,
    pub modified: Option<String>,
    #[serde(default)]
    pub distribution: Option<Vec<Distribution>>,
}

impl CatalogItem {
    pub fn themes(&self) -> Vec<String> {
        match &self.theme {
            None => vec![],
            Some(Themes::One(t)) => vec![t.clone()],
            Some(Themes::Many(ts)) => ts.clone(),
        }
    }

    /// Case-insensitive exact match against any of the item's theme tags.
    pub fn has_theme(&self, theme: &str) -> bool {
        match &self.theme {
            None => false,
            Some(Themes::One(t)) => t.eq_ignore_ascii_case(theme),
            Some(Themes::Many(ts)) => ts.iter().any(|t| t.eq_ignore_ascii_case(theme)),
        }
    }

    /// Convert to a descriptor.  Returns the reason the item can't be used
    /// if a required field is missing or invalid.
    pub fn to_descriptor(&self) -> Result<DatasetDescriptor, String> {
        let id = match self.identifier.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err("no identifier".to_string()),
        };
        let modified_at = match &self.modified {
            Some(m) => parse_timestamp(m)
                .map_err(|e| format!("dataset {}: invalid modified date {:?}: {}", id, m, e))?,
            None => return Err(format!("dataset {}: no modified date", id)),
        };
        let download_url = self
            .distribution
            .as_ref()
            .and_then(|ds| ds.first())
            .and_then(|d| d.download_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| format!("dataset {}: no download URL", id))?;
        Ok(DatasetDescriptor {
            id,
            themes: self.themes(),
            modified_at,
            download_url: download_url.to_string(),
        })
    }
}

/// Keep the items tagged with `theme` and turn them into descriptors.
/// Unusable items are logged and skipped.
pub fn theme_descriptors(items: Vec<CatalogItem>, theme: &str) -> Vec<DatasetDescriptor> {
    items
        .iter()
        .filter(|item| item.has_theme(theme))
        .filter_map(|item| match item.to_descriptor() {
            Ok(d) => Some(d),
            Err(reason) => {
                warn!("Skipping catalog item: {}", reason);
                None
            }
        })
        .collect()
}

pub struct CmsCatalog {
    client: Client,
    pub url: String,
    pub theme: String,
}

impl CmsCatalog {
    pub fn new(url: &str, theme: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(CmsCatalog {
            client,
            url: url.to_string(),
            theme: theme.to_string(),
        })
    }

    pub fn hospitals(timeout: Duration) -> Result<Self, CatalogError> {
        Self::new(CMS_CATALOG_URL, HOSPITALS_THEME, timeout)
    }
}

#[async_trait]
impl Catalog for CmsCatalog {
    async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>, CatalogError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(CatalogError::Status(response.status()));
        }
        let body = response.bytes().await?;
        let items: Vec<CatalogItem> = serde_json::from_slice(&body)?;
        let n = items.len();
        let descriptors = theme_descriptors(items, &self.theme);
        info!(
            "catalog lists {} datasets, {} with theme {}",
            n,
            descriptors.len(),
            self.theme
        );
        Ok(descriptors)
    }
}
