use std::{error::Error, io, path::Path};

use clap::Parser;
use cms_hospitals::{
    api::cms::{catalog::CmsCatalog, download::HttpFetcher},
    config::Config,
    db::prod_db::ProdDb,
    sync::controller::{DatasetFailure, RunController},
};
use log::{info, warn};
use tabled::{builder::Builder, settings::Style};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Directory for the CSV files, overrides OUTPUT_DIR
    #[arg(short, long)]
    output_dir: Option<String>,
}

/// Make an ASCII table with the datasets that failed
fn ascii_table(failed: &[DatasetFailure]) -> tabled::Table {
    let mut builder = Builder::new();
    builder.push_record(vec!["Dataset", "Modified", "Error"]);
    for failure in failed {
        builder.push_record(vec![
            failure.id.clone(),
            failure.modified_at.to_string(),
            failure.error.to_string(),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    table
}

/// Run this job every day at 6AM.  Exits with an error only if the catalog or
/// the metadata file can't be used; failed datasets are retried next run.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let env_file = format!(".env/{}.env", args.env);
    match dotenvy::from_path(Path::new(&env_file)) {
        Ok(_) => info!("Loaded settings from {}", env_file),
        Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            info!("No {} file, using the process environment", env_file)
        }
        Err(e) => return Err(e.into()),
    }

    let mut config = Config::from_env()?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    info!("CMS Provider Hospital ETL job started");
    let catalog = CmsCatalog::new(&config.catalog_url, &config.theme, config.download_timeout)?;
    let fetcher = HttpFetcher::new(config.download_timeout, config.retry)?;
    let controller = RunController::new(
        catalog,
        fetcher,
        ProdDb::cms_hospitals(&config),
        config.max_workers,
    );
    let report = controller
        .run(&ProdDb::cms_hospitals_watermark(&config))
        .await?;

    if !report.failed.is_empty() {
        warn!(
            "{} datasets failed:\n{}",
            report.failed.len(),
            ascii_table(&report.failed)
        );
    }
    info!(
        "CMS Provider Hospital ETL job completed.  Selected: {}, succeeded: {}, failed: {}",
        report.selected,
        report.succeeded.len(),
        report.failed.len()
    );

    Ok(())
}
