//! Policy persistence adapter backed by a blob store.
//!
//! An access-control engine keeps its rules in memory and calls an adapter to
//! load and save them. This crate stores those rules as one text object in a
//! bucket (S3, GCS, local filesystem or memory) instead of a local file:
//!
//! ```text
//! p, reader, data1, read
//! p, writer, data1, write
//! g, alice, writer
//! ```
//!
//! Only whole-policy round trips are supported. The single-rule operations of
//! [`PolicyAdapter`] return [`AdapterError::NotImplemented`].
//!
//! # Quick Start
//!
//! ```no_run
//! use cordon_adapter::{BlobAdapter, MemoryModel, PolicyAdapter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let adapter = BlobAdapter::from_url("gs://my-bucket/path/to/policy.csv").await?;
//!
//! let mut model = MemoryModel::new();
//! adapter.load_policy(&mut model).await?;
//! adapter.save_policy(&model).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use adapter::{BlobAdapter, PolicyAdapter};
pub use config::PolicyLocation;
pub use error::{AdapterError, AdapterResult};
pub use model::{MemoryModel, PolicyModel, Rule};
pub use store::{BlobClient, ObjectStoreClient, StoreError, StoreResult};

// Re-export bytes for callers implementing BlobClient
pub use bytes::Bytes;
