//! One backup run: dump, locate the artifact, upload it.

use crate::backup::backup_config::{BackupConfig, UploadErrorPolicy};
use crate::backup::env_store::{
    VarResolver, AWS_S3_REGION_NAME, AWS_STORAGE_BUCKET_NAME, POSTGRESQL_NAME,
    POSTGRESQL_PASSWORD, POSTGRESQL_USER,
};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::runner::{ProcessRunner, ScriptArg};
use crate::backup::upload::{ArtifactUploader, UploadTarget};
use chrono::{DateTime, Utc};
use derive_more::Display;
use getset::Getters;
use itertools::Itertools;

/// How a run ended when no error escaped it
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum BackupOutcome {
    #[display("uploaded to {url}")]
    Uploaded { url: String },
    #[display("missing variables: {}", _0.join(", "))]
    MissingVariables(Vec<String>),
    #[display("dump script produced no output")]
    NoOutput,
    #[display("no backup artifact path in dump script output")]
    NoArtifact,
    #[display("upload failed: {reason}")]
    UploadFailed { reason: String },
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupReport {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outcome: BackupOutcome,
}

/// Wires the variable store, the dump script and the uploader for one run.
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupPipeline {
    config: BackupConfig,
    resolver: VarResolver,
    runner: ProcessRunner,
}

impl BackupPipeline {
    pub fn new(config: BackupConfig) -> Self {
        let resolver = VarResolver::new(config.repo_root(), config.branch_table());
        let runner = ProcessRunner::builder()
            .maybe_interpreter(config.interpreter().clone())
            .build();
        Self {
            config,
            resolver,
            runner,
        }
    }

    /// Positional script arguments, or the names of the variables missing for them.
    fn dump_args(&self) -> std::result::Result<Vec<ScriptArg>, Vec<String>> {
        let name = self.resolver.get(POSTGRESQL_NAME);
        let user = self.resolver.get(POSTGRESQL_USER);
        let password = self.resolver.get_secret(POSTGRESQL_PASSWORD);

        match (name, user, password) {
            (Some(name), Some(user), Some(password)) => {
                let mut args = vec![
                    ScriptArg::Plain(name),
                    ScriptArg::Plain(user),
                    ScriptArg::Sensitive(password),
                ];
                if let Some(base_path) = self.config.base_path() {
                    args.push(ScriptArg::Plain(base_path.to_string_lossy().into_owned()));
                }
                Ok(args)
            }
            (name, user, password) => Err([
                (POSTGRESQL_NAME, name.is_none()),
                (POSTGRESQL_USER, user.is_none()),
                (POSTGRESQL_PASSWORD, password.is_none()),
            ]
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(var, _)| var.to_owned())
            .collect_vec()),
        }
    }

    fn upload_target(&self) -> std::result::Result<UploadTarget, Vec<String>> {
        let bucket = self
            .resolver
            .get(AWS_STORAGE_BUCKET_NAME)
            .ok_or_else(|| vec![AWS_STORAGE_BUCKET_NAME.to_owned()])?;
        let region = self.resolver.get(AWS_S3_REGION_NAME).unwrap_or_else(|| {
            tracing::warn!(
                "{AWS_S3_REGION_NAME} not set, using {}",
                self.config.default_region()
            );
            self.config.default_region().clone()
        });

        Ok(UploadTarget::builder()
            .bucket(bucket)
            .maybe_directory(self.config.s3_directory().clone())
            .region(region)
            .build())
    }

    fn run_steps<U, F>(&self, make_uploader: F) -> Result<BackupOutcome>
    where
        U: ArtifactUploader,
        F: FnOnce(&VarResolver) -> U,
    {
        let args = match self.dump_args() {
            Ok(args) => args,
            Err(missing) => return Ok(BackupOutcome::MissingVariables(missing)),
        };

        let output = match self.runner.run(self.config.script(), &args) {
            Some(output) if !output.is_empty() => output,
            _ => return Ok(BackupOutcome::NoOutput),
        };
        tracing::debug!("Script output:\n{output}");

        let Some(artifact) = self.config.artifact_pattern().first_artifact(&output) else {
            return Ok(BackupOutcome::NoArtifact);
        };
        let found = self.config.artifact_pattern().all_artifacts(&output).count();
        if found > 1 {
            tracing::warn!("Script reported {found} artifact paths, uploading the first");
        }
        tracing::info!("Found backup artifact {:?}", artifact);

        let target = match self.upload_target() {
            Ok(target) => target,
            Err(missing) => return Ok(BackupOutcome::MissingVariables(missing)),
        };

        match make_uploader(&self.resolver).upload(&artifact, &target) {
            Ok(url) => Ok(BackupOutcome::Uploaded { url }),
            Err(e)
                if e.is_upload_transport()
                    && *self.config.upload_error_policy() == UploadErrorPolicy::Propagate =>
            {
                Err(e.add_msg(format!("Uploading {:?} failed", artifact)))
            }
            Err(e) => {
                tracing::error!("Uploading {:?} failed: {e}", artifact);
                Ok(BackupOutcome::UploadFailed {
                    reason: e.root().to_string(),
                })
            }
        }
    }

    /// Runs the dump script and uploads the artifact it reports.
    ///
    /// Handled failures end up in the report's outcome. Only S3 transport
    /// errors under [`UploadErrorPolicy::Propagate`] are returned as `Err`.
    pub fn run<U: ArtifactUploader>(&self, uploader: &U) -> Result<BackupReport> {
        self.run_with(|_| uploader)
    }

    /// Like [`BackupPipeline::run`], but the uploader is built from the
    /// variable store only once an artifact is ready to upload.
    pub fn run_with<U, F>(&self, make_uploader: F) -> Result<BackupReport>
    where
        U: ArtifactUploader,
        F: FnOnce(&VarResolver) -> U,
    {
        let started_at = Utc::now();
        tracing::info!(
            "Starting backup on branch {:?} with {:?}",
            self.resolver.branch(),
            self.config.script()
        );

        let outcome = self.run_steps(make_uploader)?;
        match &outcome {
            BackupOutcome::Uploaded { .. } => tracing::info!("Backup finished: {outcome}"),
            _ => tracing::warn!("Backup stopped: {outcome}"),
        }

        Ok(BackupReport {
            started_at,
            finished_at: Utc::now(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::env_store::tests::fixture_repo;
    use crate::backup::result_error::error::Error;
    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingUploader {
        calls: RefCell<Vec<(PathBuf, UploadTarget)>>,
        fail_with: Option<fn() -> Error>,
    }

    impl ArtifactUploader for RecordingUploader {
        fn upload(&self, file: &Path, target: &UploadTarget) -> Result<String> {
            self.calls
                .borrow_mut()
                .push((file.to_path_buf(), target.clone()));
            match self.fail_with {
                Some(make_error) => Err(make_error()),
                None => Ok(target.object_url(target.object_key(file)?)),
            }
        }
    }

    struct Fixture {
        repo: TempDir,
        script: PathBuf,
        config: serde_json::Value,
    }

    impl Fixture {
        fn new(branch: &str, script_body: &str) -> Self {
            let (repo, table) = fixture_repo(branch);
            let script = repo.path().join("backup_postgres.sh");
            std::fs::write(&script, script_body).unwrap();
            let config = serde_json::json!({
                "repo_root": repo.path(),
                "branch_table": table,
                "script": &script,
                "interpreter": "sh",
            });
            Self {
                repo,
                script,
                config,
            }
        }

        fn with(mut self, key: &str, value: serde_json::Value) -> Self {
            self.config[key] = value;
            self
        }

        fn write_store(&self, name: &str, store: serde_json::Value) {
            std::fs::write(
                self.repo.path().join("secrets").join(name),
                store.to_string(),
            )
            .unwrap();
        }

        fn pipeline(&self) -> BackupPipeline {
            BackupPipeline::new(serde_json::from_value(self.config.clone()).unwrap())
        }
    }

    static DUMP_SCRIPT: &str =
        "echo \"pg_dump $1 as $2\"\necho \"Backup written to /home/ops/backup_postgres_$1.dump done\"\n";

    #[test]
    fn test_run_uploads_reported_artifact() {
        let fixture = Fixture::new("main", DUMP_SCRIPT);
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            report.outcome(),
            &BackupOutcome::Uploaded {
                url: "https://prod-bucket.s3.eu-west-1.amazonaws.com/pg_backups/backup_postgres_app.dump"
                    .to_string()
            }
        );
        assert!(report.started_at() <= report.finished_at());

        let calls = uploader.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PathBuf::from("/home/ops/backup_postgres_app.dump"));
        assert_eq!(calls[0].1.bucket(), "prod-bucket");
        assert_eq!(calls[0].1.directory().as_deref(), Some("pg_backups"));
    }

    #[test]
    fn test_no_matching_path_never_uploads() {
        let fixture = Fixture::new("main", "echo 'pg_dump finished, wrote /tmp/app.sql'\n");
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(report.outcome(), &BackupOutcome::NoArtifact);
        assert!(uploader.calls.borrow().is_empty());
    }

    #[test]
    fn test_uploader_built_only_for_found_artifact() {
        let fixture = Fixture::new("main", "echo 'pg_dump finished, wrote /tmp/app.sql'\n");
        let built = Cell::new(0);

        let report = fixture
            .pipeline()
            .run_with(|_| {
                built.set(built.get() + 1);
                RecordingUploader::default()
            })
            .unwrap();

        assert_eq!(report.outcome(), &BackupOutcome::NoArtifact);
        assert_eq!(built.get(), 0);
    }

    #[test]
    fn test_uploader_built_from_branch_store() {
        let fixture = Fixture::new("main", DUMP_SCRIPT);
        let built = Cell::new(0);

        let report = fixture
            .pipeline()
            .run_with(|resolver| {
                built.set(built.get() + 1);
                assert_eq!(
                    resolver.get(AWS_STORAGE_BUCKET_NAME).as_deref(),
                    Some("prod-bucket")
                );
                RecordingUploader::default()
            })
            .unwrap();

        assert!(matches!(report.outcome(), BackupOutcome::Uploaded { .. }));
        assert_eq!(built.get(), 1);
    }

    #[test]
    fn test_failing_script_never_uploads() {
        let fixture = Fixture::new(
            "main",
            "echo /home/ops/backup_postgres_app.dump\necho 'connection refused' >&2\nexit 1\n",
        );
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(report.outcome(), &BackupOutcome::NoOutput);
        assert!(uploader.calls.borrow().is_empty());
    }

    #[test]
    fn test_silent_script_is_no_output() {
        let fixture = Fixture::new("main", "true\n");
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(report.outcome(), &BackupOutcome::NoOutput);
    }

    #[test]
    fn test_missing_dump_variables_skip_script() {
        let fixture = Fixture::new("staging", "touch \"$0.ran\"\n");
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            report.outcome(),
            &BackupOutcome::MissingVariables(vec![
                POSTGRESQL_USER.to_string(),
                POSTGRESQL_PASSWORD.to_string()
            ])
        );
        assert!(!fixture.script.with_extension("sh.ran").exists());
        assert!(uploader.calls.borrow().is_empty());
    }

    #[test]
    fn test_unmapped_branch_reports_all_dump_variables() {
        let fixture = Fixture::new("feature/x", DUMP_SCRIPT);
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        match report.outcome() {
            BackupOutcome::MissingVariables(missing) => assert_eq!(missing.len(), 3),
            outcome => panic!("Expected MissingVariables, got {outcome}"),
        }
    }

    #[test]
    fn test_missing_bucket_stops_before_upload() {
        let fixture = Fixture::new("staging", DUMP_SCRIPT);
        fixture.write_store(
            "staging.json",
            serde_json::json!({
                "POSTGRESQL_NAME": "app_staging",
                "POSTGRESQL_USER": "backup",
                "POSTGRESQL_PASSWORD": "pw",
            }),
        );
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            report.outcome(),
            &BackupOutcome::MissingVariables(vec![AWS_STORAGE_BUCKET_NAME.to_string()])
        );
        assert!(uploader.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_region_uses_default_region() {
        let fixture = Fixture::new("staging", DUMP_SCRIPT)
            .with("default_region", "ap-south-1".into())
            .with("s3_directory", serde_json::Value::Null);
        fixture.write_store(
            "staging.json",
            serde_json::json!({
                "POSTGRESQL_NAME": "app_staging",
                "POSTGRESQL_USER": "backup",
                "POSTGRESQL_PASSWORD": "pw",
                "AWS_STORAGE_BUCKET_NAME": "staging-bucket",
            }),
        );
        let uploader = RecordingUploader::default();

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            report.outcome(),
            &BackupOutcome::Uploaded {
                url: "https://staging-bucket.s3.ap-south-1.amazonaws.com/backup_postgres_app_staging.dump"
                    .to_string()
            }
        );
    }

    #[test]
    fn test_base_path_is_fourth_argument() {
        let fixture = Fixture::new("main", "echo \"$4/backup_postgres_$1.dump\"\n")
            .with("base_path", "/home/ops/dumps".into());
        let uploader = RecordingUploader::default();

        fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            uploader.calls.borrow()[0].0,
            PathBuf::from("/home/ops/dumps/backup_postgres_app.dump")
        );
    }

    #[test]
    fn test_password_is_passed_to_script() {
        let fixture = Fixture::new("main", "echo \"/home/ops/backup_postgres_$3.dump\"\n");
        let uploader = RecordingUploader::default();

        fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            uploader.calls.borrow()[0].0,
            PathBuf::from("/home/ops/backup_postgres_pw-main.dump")
        );
    }

    fn transport_error() -> Error {
        Error::s3_upload("prod-bucket", "pg_backups/x.dump", "dispatch failure")
    }

    #[test]
    fn test_transport_error_propagates_by_default() {
        let fixture = Fixture::new("main", DUMP_SCRIPT);
        let uploader = RecordingUploader {
            fail_with: Some(transport_error),
            ..Default::default()
        };

        let err = fixture.pipeline().run(&uploader).unwrap_err();

        assert!(err.is_upload_transport());
        assert_eq!(uploader.calls.borrow().len(), 1);
    }

    #[test]
    fn test_transport_error_suppressed_by_policy() {
        let fixture =
            Fixture::new("main", DUMP_SCRIPT).with("upload_error_policy", "suppress".into());
        let uploader = RecordingUploader {
            fail_with: Some(transport_error),
            ..Default::default()
        };

        let report = fixture.pipeline().run(&uploader).unwrap();

        match report.outcome() {
            BackupOutcome::UploadFailed { reason } => assert!(reason.contains("dispatch failure")),
            outcome => panic!("Expected UploadFailed, got {outcome}"),
        }
    }

    #[test]
    fn test_preflight_upload_errors_never_propagate() {
        let fixture = Fixture::new("main", DUMP_SCRIPT);
        let uploader = RecordingUploader {
            fail_with: Some(Error::credentials_missing),
            ..Default::default()
        };

        let report = fixture.pipeline().run(&uploader).unwrap();

        assert_eq!(
            report.outcome(),
            &BackupOutcome::UploadFailed {
                reason: "AWS credentials not found".to_string()
            }
        );
    }
}
