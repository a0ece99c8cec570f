//! Artifact bucket and the Lambda bundles uploaded into it

use crate::error::Result;
use crate::graph::{HasArn, Handle, Reference, Resource, Stack};
use ecsdeploy_config::{FunctionConfig, StorageConfig};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct S3Bucket {
    pub bucket: String,
    pub force_destroy: bool,
}

impl Resource for S3Bucket {
    const TYPE: &'static str = "aws_s3_bucket";
}
impl HasArn for S3Bucket {}

#[derive(Debug, Clone, Serialize)]
pub struct S3Object {
    pub bucket: Reference,
    pub key: String,
    pub source: String,
    /// Changes whenever the local bundle does, forcing a re-upload
    pub etag: String,
    pub content_type: &'static str,
}

impl Resource for S3Object {
    const TYPE: &'static str = "aws_s3_object";
}

/// An uploaded bundle, by bucket object and key
#[derive(Debug, Clone)]
pub struct Artifact {
    pub object: Handle<S3Object>,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pub bucket: Handle<S3Bucket>,
    pub notifier_artifact: Artifact,
    pub webhook_artifact: Artifact,
}

pub fn build(
    stack: &mut Stack,
    config: &StorageConfig,
    notifier: &FunctionConfig,
    webhook: &FunctionConfig,
) -> Result<Storage> {
    let bucket = stack.declare(
        &config.bucket_id,
        S3Bucket {
            bucket: config.bucket.clone(),
            force_destroy: config.force_destroy,
        },
    )?;
    let notifier_artifact = upload(stack, &bucket, notifier)?;
    let webhook_artifact = upload(stack, &bucket, webhook)?;
    Ok(Storage {
        bucket,
        notifier_artifact,
        webhook_artifact,
    })
}

pub fn upload(
    stack: &mut Stack,
    bucket: &Handle<S3Bucket>,
    function: &FunctionConfig,
) -> Result<Artifact> {
    let object = stack.declare(
        &format!("{}_artifact", function.id),
        S3Object {
            bucket: bucket.id(),
            key: function.artifact_key.clone(),
            source: function.artifact_source.clone(),
            etag: format!("${{filemd5(\"{}\")}}", function.artifact_source),
            content_type: "application/zip",
        },
    )?;
    Ok(Artifact {
        object,
        key: function.artifact_key.clone(),
    })
}
