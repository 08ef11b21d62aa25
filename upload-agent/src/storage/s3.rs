//! S3 (and S3-compatible) backend built on `object_store`.
//!
//! Custom metadata travels as `x-amz-meta-*` headers through
//! `Attribute::Metadata` and the storage class through
//! `Attribute::StorageClass`, so both are signed and only sent on PUT and
//! CreateMultipartUpload. Keys are passed through unchanged; a key that
//! `object_store` cannot represent verbatim fails that file.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, GetOptions, MultipartUpload, ObjectStore,
    PutMultipartOpts, PutOptions, PutPayload,
};
use tracing::debug;

use crate::config::DestinationConfig;
use crate::storage::profile::{self, ProfileCredentials, SharedFiles};
use crate::storage::{
    MultipartSession, ObjectBackend, PartFuture, RemoteObject, RemoteObjectState, UploadOptions,
};
use crate::utils::errors::{Result, SyncError};

/// Environment variables that point the S3 client at ambient credentials.
const AMBIENT_CREDENTIAL_VARS: &[&str] = &[
    "AWS_WEB_IDENTITY_TOKEN_FILE",
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
    "AWS_CONTAINER_CREDENTIALS_FULL_URI",
];

pub struct S3Backend {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl S3Backend {
    /// Wrap an existing store.
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
        }
    }

    /// Build an S3 client from the destination config, the `AWS_*`
    /// environment and the shared credentials files.
    ///
    /// # Errors
    /// `SyncError::Config` when no credentials can be found, a named profile
    /// is missing, or the client cannot be constructed.
    pub fn from_config(dest: &DestinationConfig) -> Result<Self> {
        let profile = profile::resolve(dest.profile.as_deref(), &SharedFiles::from_env())?;
        let builder = s3_builder(
            AmazonS3Builder::from_env().with_bucket_name(&dest.bucket),
            dest,
            profile,
        );
        ensure_credentials(&builder, dest)?;

        let store = builder
            .with_client_options(client_options(dest))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build S3 store: {}", e)))?;

        Ok(Self::new(dest.bucket.clone(), Arc::new(store)))
    }
}

/// Layer profile and config values over `builder`.
///
/// Precedence for keys: config file keys, then an explicitly named profile,
/// then `AWS_*` environment keys, then the `AWS_PROFILE`/`default` profile.
fn s3_builder(
    mut builder: AmazonS3Builder,
    dest: &DestinationConfig,
    profile: Option<ProfileCredentials>,
) -> AmazonS3Builder {
    if let Some(profile) = profile {
        if dest.profile.is_some() || !has_static_keys(&builder) {
            builder = builder
                .with_access_key_id(profile.access_key_id)
                .with_secret_access_key(profile.secret_access_key);
            if let Some(token) = profile.session_token {
                builder = builder.with_token(token);
            }
        }
        if builder
            .get_config_value(&AmazonS3ConfigKey::Region)
            .is_none()
        {
            if let Some(region) = profile.region {
                builder = builder.with_region(region);
            }
        }
    }

    if let Some(region) = &dest.region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = &dest.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(key) = &dest.access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = &dest.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    builder
}

fn client_options(dest: &DestinationConfig) -> ClientOptions {
    let env_allow_http = std::env::var("AWS_ALLOW_HTTP").is_ok_and(|v| v == "true");
    ClientOptions::new().with_allow_http(dest.allow_http || env_allow_http)
}

fn has_static_keys(builder: &AmazonS3Builder) -> bool {
    let configured = |key: AmazonS3ConfigKey| {
        builder
            .get_config_value(&key)
            .is_some_and(|value| !value.is_empty())
    };
    configured(AmazonS3ConfigKey::AccessKeyId) && configured(AmazonS3ConfigKey::SecretAccessKey)
}

fn ensure_credentials(builder: &AmazonS3Builder, dest: &DestinationConfig) -> Result<()> {
    let has_ambient = AMBIENT_CREDENTIAL_VARS
        .iter()
        .any(|var| std::env::var_os(var).is_some());

    if has_static_keys(builder) || has_ambient || dest.allow_instance_credentials {
        Ok(())
    } else {
        Err(SyncError::Config(
            "AWS credentials not found. Configure credentials via the config file, a shared credentials profile or AWS_* environment variables."
                .to_string(),
        ))
    }
}

fn attributes(options: &UploadOptions) -> Attributes {
    let mut attributes = Attributes::new();
    for (name, value) in &options.metadata {
        attributes.insert(
            Attribute::Metadata(name.clone().into()),
            AttributeValue::from(value.clone()),
        );
    }
    if let Some(class) = &options.storage_class {
        attributes.insert(Attribute::StorageClass, AttributeValue::from(class.clone()));
    }
    attributes
}

/// The object path for `key`, byte for byte.
fn object_path(key: &str) -> Result<ObjectPath> {
    let path = ObjectPath::parse(key).map_err(|e| SyncError::transport(key, e))?;
    if path.as_ref() != key {
        return Err(SyncError::transport(
            key,
            format!("key would be stored as '{}'", path),
        ));
    }
    Ok(path)
}

fn transport(key: &str, err: object_store::Error) -> SyncError {
    SyncError::transport(key, err)
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head(&self, key: &str) -> Result<RemoteObjectState> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        let result = match self.store.get_opts(&object_path(key)?, options).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(RemoteObjectState::Absent),
            Err(e) => return Err(transport(key, e)),
        };

        let mut metadata = HashMap::new();
        for (attribute, value) in result.attributes.iter() {
            if let Attribute::Metadata(name) = attribute {
                let value: &str = value.as_ref();
                metadata.insert(name.to_string(), value.to_string());
            }
        }

        Ok(RemoteObjectState::Present(RemoteObject::new(
            result.meta.size,
            metadata,
        )))
    }

    async fn put_object(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<()> {
        let opts = PutOptions {
            attributes: attributes(options),
            ..Default::default()
        };
        self.store
            .put_opts(&object_path(key)?, PutPayload::from(data), opts)
            .await
            .map_err(|e| transport(key, e))?;
        debug!("PUT s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn start_multipart(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn MultipartSession>> {
        let opts = PutMultipartOpts {
            attributes: attributes(options),
            ..Default::default()
        };
        let upload = self
            .store
            .put_multipart_opts(&object_path(key)?, opts)
            .await
            .map_err(|e| transport(key, e))?;
        debug!("Started multipart upload for s3://{}/{}", self.bucket, key);

        Ok(Box::new(S3Multipart {
            key: key.to_string(),
            upload,
        }))
    }
}

struct S3Multipart {
    key: String,
    upload: Box<dyn MultipartUpload>,
}

#[async_trait]
impl MultipartSession for S3Multipart {
    fn put_part(&mut self, data: Bytes) -> PartFuture {
        let key = self.key.clone();
        let part = self.upload.put_part(PutPayload::from(data));
        Box::pin(async move { part.await.map_err(|e| transport(&key, e)) })
    }

    async fn complete(&mut self) -> Result<()> {
        self.upload
            .complete()
            .await
            .map(|_| ())
            .map_err(|e| transport(&self.key, e))
    }

    async fn abort(&mut self) -> Result<()> {
        self.upload.abort().await.map_err(|e| transport(&self.key, e))
    }
}
