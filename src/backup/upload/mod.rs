pub mod s3;

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::Getters;
use std::path::Path;

/// Default key prefix for uploaded dumps
pub static DEFAULT_DIRECTORY: &str = "pg_backups";

/// Where an artifact is uploaded to
#[derive(Clone, Debug, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct UploadTarget {
    #[builder(into)]
    bucket: String,
    #[builder(into)]
    directory: Option<String>,
    #[builder(into)]
    region: String,
}

impl UploadTarget {
    /// Object key for `file`: `directory/filename`, or `filename` without a directory.
    pub fn object_key<P: AsRef<Path>>(&self, file: P) -> Result<String> {
        let file = file.as_ref();
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_artifact_path(file))?;

        Ok(match self.directory.as_deref().map(|d| d.trim_matches('/')) {
            Some(directory) if !directory.is_empty() => format!("{directory}/{file_name}"),
            _ => file_name.to_owned(),
        })
    }

    pub fn object_url<S: AsRef<str>>(&self, key: S) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket,
            self.region,
            key.as_ref()
        )
    }
}

/// Transfers a local file to object storage.
pub trait ArtifactUploader {
    /// Uploads `file` and returns its public URL.
    fn upload(&self, file: &Path, target: &UploadTarget) -> Result<String>;
}

impl<U: ArtifactUploader + ?Sized> ArtifactUploader for &U {
    fn upload(&self, file: &Path, target: &UploadTarget) -> Result<String> {
        (**self).upload(file, target)
    }
}
