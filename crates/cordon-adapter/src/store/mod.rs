//! Blob storage abstraction used by the policy adapter.
//!
//! The adapter only ever needs three things from a storage client: check that
//! a bucket is reachable, stream one object out, and replace one object. The
//! [`BlobClient`] trait captures exactly that, so any backend (or a test
//! double) can sit behind the adapter.
//!
//! # Write semantics
//!
//! Content handed to an [`ObjectWriter`] is not visible until
//! [`ObjectWriter::finish`] returns. A writer dropped before `finish` leaves
//! the object untouched.

pub mod error;
pub mod object_store_backend;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use error::{StoreError, StoreResult};
pub use object_store_backend::{ObjectStoreClient, ObjectStoreWriter};

/// Byte-chunk stream of one object's content.
pub type ObjectReader = BoxStream<'static, StoreResult<Bytes>>;

/// Attributes of a bucket, as returned by [`BlobClient::bucket_attrs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAttrs {
    pub name: String,
}

/// Writable stream against one object.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append a chunk to the pending content.
    async fn write(&mut self, chunk: Bytes) -> StoreResult<()>;

    /// Make the written content durable and visible, replacing any previous
    /// content of the object.
    async fn finish(&mut self) -> StoreResult<()>;
}

/// Storage client that can open streams against named objects in named buckets.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Look up a bucket.
    ///
    /// # Returns
    ///
    /// - `Ok(BucketAttrs)` if the bucket exists and is accessible
    /// - `Err(StoreError::BucketNotFound)` if it doesn't exist
    /// - `Err(StoreError::...)` for auth or network failures
    async fn bucket_attrs(&self, bucket: &str) -> StoreResult<BucketAttrs>;

    /// Open a read stream on an object.
    ///
    /// # Returns
    ///
    /// - `Err(StoreError::ObjectNotFound)` if the object doesn't exist
    async fn open_reader(&self, bucket: &str, key: &str) -> StoreResult<ObjectReader>;

    /// Open a write stream that replaces the object on [`ObjectWriter::finish`].
    async fn open_writer(&self, bucket: &str, key: &str) -> StoreResult<Box<dyn ObjectWriter>>;
}
