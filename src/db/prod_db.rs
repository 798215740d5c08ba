use crate::{
    config::Config,
    db::cms::{hospitals_archive::HospitalsArchive, watermark::MetadataStore},
};

pub struct ProdDb {}

impl ProdDb {
    pub fn cms_hospitals(config: &Config) -> HospitalsArchive {
        HospitalsArchive {
            base_dir: config.output_dir.clone(),
        }
    }

    pub fn cms_hospitals_watermark(config: &Config) -> MetadataStore {
        MetadataStore {
            path: config.metadata_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        let config = Config {
            output_dir: "/tmp/cms".to_string(),
            ..Config::default()
        };
        assert_eq!(
            ProdDb::cms_hospitals(&config).filename("xubh-q36u"),
            "/tmp/cms/xubh-q36u.csv"
        );
        assert_eq!(
            ProdDb::cms_hospitals_watermark(&config).path,
            "/tmp/cms/metadata_last_update.json"
        );
    }
}
