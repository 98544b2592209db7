//! Upload to AWS S3.
//!
//! Credentials come from the branch's variable store rather than the default
//! AWS provider chain, so the uploader refuses to run without them.

use crate::backup::env_store::{VarResolver, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY};
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::upload::{ArtifactUploader, UploadTarget};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bon::Builder;
use function_name::named;
use std::path::Path;

static CREDENTIALS_PROVIDER_NAME: &str = "pg_s3_backup_variable_store";

#[derive(Clone, Debug, Builder)]
pub struct S3Uploader {
    #[builder(into)]
    access_key_id: Option<String>,
    #[builder(into)]
    secret_access_key: Option<RedactedString>,
    /// Overrides the regional S3 endpoint, e.g. for an S3-compatible store
    #[builder(into)]
    endpoint_url: Option<String>,
}

impl S3Uploader {
    pub fn from_resolver(resolver: &VarResolver) -> Self {
        Self {
            access_key_id: resolver.get(AWS_ACCESS_KEY_ID),
            secret_access_key: resolver.get_secret(AWS_SECRET_ACCESS_KEY),
            endpoint_url: None,
        }
    }

    fn credentials(&self) -> Result<Credentials> {
        let access_key_id = self
            .access_key_id
            .as_deref()
            .filter(|v| !v.trim().is_empty());
        let secret_access_key = self
            .secret_access_key
            .as_ref()
            .map(|s| s.inner().as_str())
            .filter(|v| !v.trim().is_empty());

        match (access_key_id, secret_access_key) {
            (Some(id), Some(secret)) => Ok(Credentials::new(
                id,
                secret,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            )),
            (None, None) => Err(Error::credentials_missing()),
            (Some(_), None) => Err(Error::credentials_incomplete(AWS_SECRET_ACCESS_KEY)),
            (None, Some(_)) => Err(Error::credentials_incomplete(AWS_ACCESS_KEY_ID)),
        }
    }
}

impl ArtifactUploader for S3Uploader {
    #[named]
    fn upload(&self, file: &Path, target: &UploadTarget) -> Result<String> {
        if !file.is_file() {
            return Err(Error::artifact_not_found(file).add_fn_name(function_path!()));
        }
        let key = target.object_key(file).add_fn_name(function_path!())?;
        let credentials = self.credentials().add_fn_name(function_path!())?;

        tracing::info!(
            "Uploading {:?} to s3://{}/{} ({})",
            file,
            target.bucket(),
            key,
            target.region()
        );

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::from)
            .add_msg("Failed to create runtime for S3 client")
            .add_fn_name(function_path!())?;

        let upload = put_object(credentials, self.endpoint_url.as_deref(), file, target, &key);
        rt.block_on(upload).add_fn_name(function_path!())?;

        let url = target.object_url(&key);
        tracing::info!("File uploaded successfully to {url}");
        Ok(url)
    }
}

async fn put_object(
    credentials: Credentials,
    endpoint_url: Option<&str>,
    file: &Path,
    target: &UploadTarget,
    key: &str,
) -> Result<()> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(target.region().clone()))
        .credentials_provider(credentials);
    if let Some(endpoint_url) = endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    let config = loader.load().await;
    let client = aws_sdk_s3::Client::new(&config);

    let body = ByteStream::from_path(file)
        .await
        .map_err(|e| Error::s3_upload(target.bucket().as_str(), key, e.to_string()))?;

    client
        .put_object()
        .bucket(target.bucket())
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            Error::s3_upload(
                target.bucket().as_str(),
                key,
                DisplayErrorContext(&e).to_string(),
            )
        })?;

    Ok(())
}
