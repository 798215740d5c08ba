use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::api::cms::{
    catalog::{CMS_CATALOG_URL, HOSPITALS_THEME},
    download::RetryPolicy,
};

pub const DEFAULT_OUTPUT_DIR: &str = "cms_provider_hospitals_csv_output";
pub const METADATA_FILENAME: &str = "metadata_last_update.json";

#[derive(Error, Debug, PartialEq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Settings of the sync job.  See [`Config::from_env`] for the variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub catalog_url: String,
    pub theme: String,
    pub output_dir: String,
    /// Defaults to a file inside `output_dir` if not set.
    pub metadata_file: Option<String>,
    pub max_workers: usize,
    pub download_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            catalog_url: CMS_CATALOG_URL.to_string(),
            theme: HOSPITALS_THEME.to_string(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            metadata_file: None,
            max_workers: 5,
            download_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Read the settings from the process environment:
    ///  - `CMS_CATALOG_URL`, `CMS_THEME`
    ///  - `OUTPUT_DIR`, `METADATA_FILE`
    ///  - `MAX_WORKERS`, `DOWNLOAD_TIMEOUT_SECS`
    ///  - `DOWNLOAD_RETRIES`, `RETRY_BACKOFF_MS`
    ///
    /// Unset variables keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(url) = lookup("CMS_CATALOG_URL") {
            config.catalog_url = url;
        }
        if let Some(theme) = lookup("CMS_THEME") {
            config.theme = theme;
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            config.output_dir = dir;
        }
        config.metadata_file = lookup("METADATA_FILE");
        if let Some(n) = parse_var::<usize>(&lookup, "MAX_WORKERS")? {
            if n == 0 {
                return Err(ConfigError {
                    key: "MAX_WORKERS".to_string(),
                    value: n.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_workers = n;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DOWNLOAD_TIMEOUT_SECS")? {
            config.download_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "DOWNLOAD_RETRIES")? {
            config.retry.max_retries = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "RETRY_BACKOFF_MS")? {
            config.retry.backoff = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Where the watermark of the last run is kept.
    pub fn metadata_path(&self) -> String {
        match &self.metadata_file {
            Some(path) => path.clone(),
            None => format!("{}/{}", self.output_dir, METADATA_FILENAME),
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(ConfigError {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.theme, "Hospitals");
        assert_eq!(
            config.metadata_path(),
            "cms_provider_hospitals_csv_output/metadata_last_update.json"
        );
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OUTPUT_DIR", "/data/cms"),
            ("MAX_WORKERS", "8"),
            ("DOWNLOAD_TIMEOUT_SECS", "30"),
            ("DOWNLOAD_RETRIES", "0"),
            ("RETRY_BACKOFF_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.output_dir, "/data/cms");
        assert_eq!(config.metadata_path(), "/data/cms/metadata_last_update.json");
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.download_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.backoff, Duration::from_millis(250));

        let config = Config::from_lookup(lookup(&[("METADATA_FILE", "/var/lib/last.json")]))
            .unwrap();
        assert_eq!(config.metadata_path(), "/var/lib/last.json");
    }

    #[test]
    fn invalid_values() {
        let err = Config::from_lookup(lookup(&[("MAX_WORKERS", "many")])).unwrap_err();
        assert_eq!(err.key, "MAX_WORKERS");
        assert!(Config::from_lookup(lookup(&[("MAX_WORKERS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DOWNLOAD_RETRIES", "-1")])).is_err());
    }
}
