//! Object store implementation of BlobClient.
//!
//! Supports S3, Google Cloud Storage, local filesystem and in-memory buckets
//! via the `object_store` crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{GetOptions, ObjectStore, PutMode, PutOptions, PutPayload};

use super::{BlobClient, BucketAttrs, ObjectReader, ObjectWriter, StoreError, StoreResult};
use crate::config::PolicyLocation;

/// Blob client backed by `object_store`.
///
/// An `object_store` instance is bound to a single bucket, so the client keeps
/// one store per bucket name. Buckets that were never registered are reported
/// as missing.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreClient {
    buckets: HashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreClient {
    /// Create a client with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with a single empty in-memory bucket (for testing).
    pub fn memory(bucket: &str) -> Self {
        Self::new().with_bucket(bucket, Arc::new(object_store::memory::InMemory::new()))
    }

    /// Register a bucket, builder style.
    pub fn with_bucket(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.register(bucket, store);
        self
    }

    /// Register a bucket, replacing any store previously registered under the same name.
    pub fn register(&mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.buckets.insert(bucket.into(), store);
    }

    /// Create a client for the bucket named by a policy location.
    pub fn from_location(location: &PolicyLocation) -> StoreResult<Self> {
        let inner: Arc<dyn ObjectStore> = match location.scheme.as_str() {
            "memory" => Arc::new(object_store::memory::InMemory::new()),
            "file" => {
                let path = &location.bucket;
                // Ensure directory exists
                std::fs::create_dir_all(path).map_err(|e| StoreError::Io {
                    message: format!("failed to create policy directory {}: {}", path, e),
                })?;
                Arc::new(
                    object_store::local::LocalFileSystem::new_with_prefix(path).map_err(|e| {
                        StoreError::Io {
                            message: format!("failed to create local store at {}: {}", path, e),
                        }
                    })?,
                )
            }
            "s3" => {
                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(&location.bucket)
                    .with_allow_http(false);

                if let Some(region) = &location.region {
                    builder = builder.with_region(region);
                }

                Arc::new(builder.build().map_err(|e| StoreError::NotConfigured {
                    message: format!("failed to create S3 client: {}", e),
                })?)
            }
            "gs" => Arc::new(
                object_store::gcp::GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&location.bucket)
                    .build()
                    .map_err(|e| StoreError::NotConfigured {
                        message: format!("failed to create GCS client: {}", e),
                    })?,
            ),
            scheme => {
                return Err(StoreError::InvalidSpec {
                    spec: location.to_string(),
                    reason: format!("unsupported scheme: {}", scheme),
                })
            }
        };

        Ok(Self::new().with_bucket(location.bucket.clone(), inner))
    }

    fn store(&self, bucket: &str) -> StoreResult<&Arc<dyn ObjectStore>> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
                source: None,
            })
    }
}

#[async_trait]
impl BlobClient for ObjectStoreClient {
    async fn bucket_attrs(&self, bucket: &str) -> StoreResult<BucketAttrs> {
        let store = self.store(bucket)?;

        // A root listing is the cheapest call every backend supports; it fails
        // for missing buckets and bad credentials alike.
        store
            .list_with_delimiter(None)
            .await
            .map_err(|e| StoreError::from_bucket_check(e, bucket))?;

        Ok(BucketAttrs {
            name: bucket.to_string(),
        })
    }

    async fn open_reader(&self, bucket: &str, key: &str) -> StoreResult<ObjectReader> {
        let store = self.store(bucket)?;
        let path = Path::from(key);

        let result = store
            .get_opts(&path, GetOptions::default())
            .await
            .map_err(|e| StoreError::from_object_store(e, bucket, key))?;

        let location = format!("{}/{}", bucket, key);
        Ok(result
            .into_stream()
            .map_err(move |e| StoreError::Io {
                message: format!("failed to read {}: {}", location, e),
            })
            .boxed())
    }

    async fn open_writer(&self, bucket: &str, key: &str) -> StoreResult<Box<dyn ObjectWriter>> {
        let store = self.store(bucket)?;
        Ok(Box::new(ObjectStoreWriter::new(
            Arc::clone(store),
            bucket,
            key,
        )))
    }
}

/// Writer that buffers the whole object and replaces it with a single put.
///
/// `object_store` puts are atomic: readers see either the previous content or
/// the complete new content, never a prefix of it.
#[derive(Debug)]
pub struct ObjectStoreWriter {
    inner: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    buf: BytesMut,
    finished: bool,
}

impl ObjectStoreWriter {
    pub fn new(inner: Arc<dyn ObjectStore>, bucket: &str, key: &str) -> Self {
        Self {
            inner,
            bucket: bucket.to_string(),
            key: key.to_string(),
            buf: BytesMut::new(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::WriterClosed {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for ObjectStoreWriter {
    async fn write(&mut self, chunk: Bytes) -> StoreResult<()> {
        self.ensure_open()?;
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> StoreResult<()> {
        self.ensure_open()?;

        let payload = PutPayload::from_bytes(self.buf.split().freeze());
        let opts = PutOptions {
            mode: PutMode::Overwrite,
            ..Default::default()
        };

        self.inner
            .put_opts(&Path::from(self.key.as_str()), payload, opts)
            .await
            .map_err(|e| StoreError::from_object_store(e, &self.bucket, &self.key))?;

        self.finished = true;
        Ok(())
    }
}
