//! Error types for blob storage operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bucket is unknown to the client or does not exist remotely.
    #[error("bucket doesn't exist: {bucket}")]
    BucketNotFound {
        bucket: String,
        #[source]
        source: Option<object_store::Error>,
    },

    /// The object does not exist in the bucket.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Access denied to the storage backend.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Invalid policy location (URL parsing failed).
    #[error("invalid policy location '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Storage backend is not configured.
    #[error("store not configured: {message}")]
    NotConfigured { message: String },

    /// Network or I/O error.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// A write was attempted on a writer that was already finalized.
    #[error("writer for {key} is already finished")]
    WriterClosed { key: String },

    /// Generic error from the underlying object store.
    #[error("object store error: {0}")]
    ObjectStore(object_store::Error),
}

impl StoreError {
    /// Returns true if the bucket could not be found.
    pub fn is_bucket_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound { .. })
    }

    /// Returns true if the object could not be found.
    pub fn is_object_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }

    /// Returns true if this is an access/permission error.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Map an object_store error raised while checking a bucket.
    pub fn from_bucket_check(err: object_store::Error, bucket: &str) -> Self {
        match &err {
            object_store::Error::NotFound { .. } => StoreError::BucketNotFound {
                bucket: bucket.to_string(),
                source: Some(err),
            },
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => StoreError::AccessDenied {
                message: err.to_string(),
            },
            _ => StoreError::ObjectStore(err),
        }
    }

    /// Map an object_store error raised while accessing an object.
    pub fn from_object_store(err: object_store::Error, bucket: &str, key: &str) -> Self {
        match &err {
            object_store::Error::NotFound { .. } => StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => StoreError::AccessDenied {
                message: err.to_string(),
            },
            _ => StoreError::ObjectStore(err),
        }
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        StoreError::ObjectStore(err)
    }
}
