//! S3 implementation of the record store.
//!
//! Each record is one object in a dedicated bucket; the object key is the
//! record path. Direct-children listing uses the `/` delimiter so binding
//! records never count as instances.

use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{RecordStore, StoreFuture};

const DELIMITER: &str = "/";

/// Errors raised by [`S3RecordStore`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum S3StoreError {
    /// Raised when an S3 request fails.
    #[error("s3 {operation} of '{path}' failed: {message}")]
    Request {
        /// S3 operation name.
        operation: &'static str,
        /// Record path or bucket addressed.
        path: String,
        /// Error text including the SDK context.
        message: String,
    },
    /// Raised when an object body cannot be read as UTF-8 text.
    #[error("record '{path}' has an unreadable body: {message}")]
    Body {
        /// Record path.
        path: String,
        /// Error text.
        message: String,
    },
}

/// Connection settings for [`S3RecordStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreSettings {
    /// S3 endpoint URL.
    pub endpoint: String,
    /// Access key.
    pub access_key: String,
    /// Secret key.
    pub secret_key: String,
    /// Signing region.
    pub region: String,
    /// Bucket holding the records.
    pub bucket: String,
}

/// Record store persisting one object per record.
#[derive(Clone, Debug)]
pub struct S3RecordStore {
    client: Client,
    bucket: String,
}

impl S3RecordStore {
    /// Builds a path-style client for the configured endpoint.
    #[must_use]
    pub fn new(settings: &StoreSettings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "cosb",
        );
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(settings.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket.clone(),
        }
    }

    /// Bucket holding the records.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Creates the bucket when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`S3StoreError::Request`] when the bucket can neither be
    /// found nor created.
    pub async fn ensure_bucket(&self) -> Result<(), S3StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "record bucket present");
                return Ok(());
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(HeadBucketError::is_not_found) => {}
            Err(err) => return Err(self.request_error("head bucket", &self.bucket, &err)),
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "record bucket created");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(CreateBucketError::is_bucket_already_owned_by_you) =>
            {
                Ok(())
            }
            Err(err) => Err(self.request_error("create bucket", &self.bucket, &err)),
        }
    }

    fn request_error(
        &self,
        operation: &'static str,
        path: &str,
        err: &(dyn std::error::Error + 'static),
    ) -> S3StoreError {
        S3StoreError::Request {
            operation,
            path: path.to_owned(),
            message: format!("{} (bucket {})", DisplayErrorContext(err), self.bucket),
        }
    }
}

/// Returns whether `key` sits directly below `prefix`.
fn is_direct_child(prefix: &str, key: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains(DELIMITER))
}

impl RecordStore for S3RecordStore {
    type Error = S3StoreError;

    fn exists<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool, Self::Error> {
        Box::pin(async move {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(HeadObjectError::is_not_found) =>
                {
                    Ok(false)
                }
                Err(err) => Err(self.request_error("head object", path, &err)),
            }
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            let output = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(GetObjectError::is_no_such_key) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(self.request_error("get object", path, &err)),
            };
            let bytes = output
                .body
                .collect()
                .await
                .map_err(|err| S3StoreError::Body {
                    path: path.to_owned(),
                    message: err.to_string(),
                })?
                .into_bytes();
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|err| S3StoreError::Body {
                    path: path.to_owned(),
                    message: err.to_string(),
                })
        })
    }

    fn put<'a>(&'a self, path: &'a str, value: String) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(path)
                .content_type("application/json")
                .body(ByteStream::from(value.into_bytes()))
                .send()
                .await
                .map(drop)
                .map_err(|err| self.request_error("put object", path, &err))
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map(drop)
                .map_err(|err| self.request_error("delete object", path, &err))
        })
    }

    fn list_children<'a>(
        &'a self,
        prefix: &'a str,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<String>, Self::Error> {
        Box::pin(async move {
            let mut children = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .delimiter(DELIMITER)
                    .set_continuation_token(continuation.take());
                if let Some(remaining) = limit.map(|max| max.saturating_sub(children.len())) {
                    request = request.max_keys(i32::try_from(remaining).unwrap_or(i32::MAX));
                }
                let page = request
                    .send()
                    .await
                    .map_err(|err| self.request_error("list objects", prefix, &err))?;
                children.extend(
                    page.contents()
                        .iter()
                        .filter_map(|object| object.key())
                        .filter(|key| is_direct_child(prefix, key))
                        .map(str::to_owned),
                );
                if let Some(max) = limit.filter(|max| children.len() >= *max) {
                    children.truncate(max);
                    break;
                }
                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_owned());
                    }
                    _ => break,
                }
            }
            Ok(children)
        })
    }
}
