use crate::backup::artifact::ArtifactPattern;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::upload::DEFAULT_DIRECTORY;
use crate::backup::validate::{validate_dir_exist, validate_file_exist, validate_not_blank};
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

static DEFAULT_INTERPRETER: &str = "bash";
static DEFAULT_REGION: &str = "us-east-1";

/// What to do with an S3 transport/service failure
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorPolicy {
    /// Return the error to the caller
    #[default]
    Propagate,
    /// Log the error and report the run as a failed upload
    Suppress,
}

/// Settings for one backup run
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Repository whose checked-out branch selects the variable store
    #[validate(custom(function = validate_dir_exist))]
    #[serde(default = "default_repo_root")]
    repo_root: PathBuf,
    /// JSON file mapping branch names to variable store files
    #[validate(custom(function = validate_file_exist))]
    branch_table: PathBuf,
    /// Dump script printing the produced artifact path
    #[validate(custom(function = validate_file_exist))]
    script: PathBuf,
    /// Program running the script, `null` to execute it directly
    #[serde(default = "default_interpreter")]
    interpreter: Option<PathBuf>,
    /// Extra working path handed to the script after the credentials
    base_path: Option<PathBuf>,
    #[serde(default = "default_s3_directory")]
    s3_directory: Option<String>,
    /// Region used when the variable store has none
    #[validate(custom(function = validate_not_blank))]
    #[serde(default = "default_region")]
    default_region: String,
    #[serde(default)]
    artifact_pattern: ArtifactPattern,
    #[serde(default)]
    upload_error_policy: UploadErrorPolicy,
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_interpreter() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_INTERPRETER))
}

fn default_s3_directory() -> Option<String> {
    Some(DEFAULT_DIRECTORY.to_owned())
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

impl BackupConfig {
    /// Loads and validates a YAML config file.
    #[named]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: BackupConfig = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader(f).map_err(Error::from))
            .add_msg(format!("Parse YAML config failed: {:?}", path))
            .add_fn_name(function_path!())?;

        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", path))
            .add_fn_name(function_path!())?;

        tracing::debug!("Loaded config {:?}: {:?}", path, config);
        Ok(config)
    }
}
