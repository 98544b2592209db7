use clap::Parser;
use pg_s3_backup::backup::backup_config::BackupConfig;
use pg_s3_backup::backup::pipeline::BackupPipeline;
use pg_s3_backup::backup::upload::s3::S3Uploader;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Dump a PostgreSQL database with the configured script and upload it to S3
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = BackupConfig::load(&args.config)
        .and_then(|config| BackupPipeline::new(config).run_with(S3Uploader::from_resolver));

    match res {
        Ok(report) => info!(
            "Backup run finished in {}s: {}",
            (*report.finished_at() - *report.started_at()).num_seconds(),
            report.outcome()
        ),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
