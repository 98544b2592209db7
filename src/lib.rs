//! # pg_s3_backup
//!
//! Dumps a PostgreSQL database with an external script and uploads the dump to S3.
//!
//! ## Features
//!
//! - **Per-branch settings**: the checked-out git branch selects the JSON variable store
//! - **External dump script**: any script that prints the path of the dump it wrote
//! - **S3 upload**: the dump lands under `pg_backups/` with a deterministic public URL
//!
//! ## Quick Start
//!
//! ```no_run
//! use pg_s3_backup::backup::backup_config::BackupConfig;
//! use pg_s3_backup::backup::pipeline::BackupPipeline;
//! use pg_s3_backup::backup::upload::s3::S3Uploader;
//!
//! let config = BackupConfig::load("backup.yml")?;
//! let pipeline = BackupPipeline::new(config);
//! let report = pipeline.run_with(S3Uploader::from_resolver)?;
//! println!("{}", report.outcome());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
