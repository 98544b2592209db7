use crate::backup::result_error::{AddFunctionName, AddMsg};
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error("No branch reference found in HEAD of repository {0:?}")]
    NoActiveBranch(PathBuf),
    #[error("Branch {branch:?} has no entry in branch table {table:?}")]
    BranchNotMapped { branch: String, table: PathBuf },
    #[error("Script {script:?} exited with {status}:\n{}", indent::indent_all_with("  ", stderr.to_string()))]
    ScriptFailed {
        script: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("The file {0:?} was not found")]
    ArtifactNotFound(PathBuf),
    #[error("Cannot derive an object name from {0:?}")]
    InvalidArtifactPath(PathBuf),
    #[error("AWS credentials not found")]
    CredentialsMissing,
    #[error("Incomplete AWS credentials, missing {missing}")]
    CredentialsIncomplete { missing: String },
    #[error("Upload to s3://{bucket}/{key} failed: {message}")]
    S3Upload {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    /// The innermost error, with message and function-name context peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => error.root(),
            e => e,
        }
    }

    /// Whether this is an S3 transport/service failure, as opposed to a
    /// pre-flight upload failure (missing file or credentials).
    pub fn is_upload_transport(&self) -> bool {
        matches!(self.root(), Error::S3Upload { .. })
    }
}
