//! Blob-backed policy adapter.
//!
//! The whole policy lives in one text object. Loading streams the object and
//! feeds it line by line into the model; saving serializes the `p` and `g`
//! sections and replaces the object in one go.
//!
//! # Concurrency
//!
//! Load and save hold the adapter's lock from stream open to stream close, so
//! calls on one adapter never overlap. Nothing coordinates separate adapters
//! or processes pointed at the same object: the last save wins.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::config::PolicyLocation;
use crate::error::{AdapterError, AdapterResult};
use crate::model::{PolicyModel, Rule, PERSISTED_SECTIONS};
use crate::store::{BlobClient, ObjectStoreClient, StoreError};

/// Persistence contract the policy engine calls into.
///
/// The single-rule operations back the engine's auto-save mode. Adapters that
/// only support whole-policy round trips must still implement them and
/// return [`AdapterError::NotImplemented`].
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    /// Load every stored rule into `model`.
    async fn load_policy(&self, model: &mut dyn PolicyModel) -> AdapterResult<()>;

    /// Replace stored rules with the `p` and `g` sections of `model`.
    async fn save_policy(&self, model: &dyn PolicyModel) -> AdapterResult<()>;

    /// Persist a single added rule.
    async fn add_policy(&self, sec: &str, ptype: &str, rule: Rule) -> AdapterResult<()>;

    /// Persist a single removed rule.
    async fn remove_policy(&self, sec: &str, ptype: &str, rule: Rule) -> AdapterResult<()>;

    /// Persist removal of every rule whose fields starting at `field_index`
    /// match `field_values`.
    async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> AdapterResult<()>;
}

/// Adapter storing the policy as a single object in a bucket.
pub struct BlobAdapter {
    client: Arc<dyn BlobClient>,
    bucket: String,
    key: String,
    lock: Mutex<()>,
}

impl BlobAdapter {
    /// Create an adapter after checking that `bucket` exists.
    ///
    /// The object itself may be missing; loading it then yields no rules.
    pub async fn new(
        client: Arc<dyn BlobClient>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> AdapterResult<Self> {
        let bucket = bucket.into();
        let key = key.into();

        client.bucket_attrs(&bucket).await?;
        debug!(bucket = %bucket, key = %key, "policy adapter ready");

        Ok(Self {
            client,
            bucket,
            key,
            lock: Mutex::new(()),
        })
    }

    /// Create an adapter backed by `object_store` for a parsed location.
    pub async fn from_location(location: &PolicyLocation) -> AdapterResult<Self> {
        let client = ObjectStoreClient::from_location(location)?;
        Self::new(Arc::new(client), location.bucket.clone(), location.key.clone()).await
    }

    /// Create an adapter from a location URL like `s3://bucket/policy.csv`.
    pub async fn from_url(url: &str) -> AdapterResult<Self> {
        let location = PolicyLocation::parse(url)?;
        Self::from_location(&location).await
    }

    /// Create an adapter from `CORDON_POLICY_URL`.
    pub async fn from_env() -> AdapterResult<Self> {
        let location = PolicyLocation::from_env()?;
        Self::from_location(&location).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for BlobAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobAdapter")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct LoadStats {
    loaded: usize,
    skipped: usize,
}

impl LoadStats {
    fn feed(&mut self, raw: &[u8], model: &mut dyn PolicyModel) {
        // Invalid UTF-8 is just another malformed line.
        let inserted = std::str::from_utf8(raw)
            .map(|line| codec::load_policy_line(line, model))
            .unwrap_or(false);
        if inserted {
            self.loaded += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[async_trait]
impl PolicyAdapter for BlobAdapter {
    async fn load_policy(&self, model: &mut dyn PolicyModel) -> AdapterResult<()> {
        let _guard = self.lock.lock().await;

        let mut reader = match self.client.open_reader(&self.bucket, &self.key).await {
            Ok(reader) => reader,
            Err(StoreError::ObjectNotFound { .. }) => {
                debug!(bucket = %self.bucket, key = %self.key, "policy object missing, nothing to load");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut stats = LoadStats::default();
        let mut pending = BytesMut::new();
        // Bytes of `pending` already known to hold no newline.
        let mut scanned = 0;
        while let Some(chunk) = reader.try_next().await? {
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + pos;
                let line = pending.split_to(end + 1);
                stats.feed(&line[..end], model);
                scanned = 0;
            }
            scanned = pending.len();
        }
        // Last line without a terminator
        if !pending.is_empty() {
            stats.feed(&pending, model);
        }

        debug!(
            bucket = %self.bucket,
            key = %self.key,
            rules = stats.loaded,
            skipped = stats.skipped,
            "loaded policy"
        );
        Ok(())
    }

    async fn save_policy(&self, model: &dyn PolicyModel) -> AdapterResult<()> {
        let _guard = self.lock.lock().await;

        let mut writer = self.client.open_writer(&self.bucket, &self.key).await?;

        let mut rules = 0usize;
        for section in PERSISTED_SECTIONS {
            for ptype in model.ptypes(section) {
                for rule in model.rules(section, &ptype) {
                    let mut line = codec::encode_line(&ptype, rule);
                    line.push('\n');
                    if let Err(e) = writer.write(Bytes::from(line)).await {
                        warn!(bucket = %self.bucket, key = %self.key, error = %e, "policy save aborted");
                        return Err(e.into());
                    }
                    rules += 1;
                }
            }
        }

        if let Err(e) = writer.finish().await {
            warn!(bucket = %self.bucket, key = %self.key, error = %e, "policy save not finalized");
            return Err(e.into());
        }

        debug!(bucket = %self.bucket, key = %self.key, rules, "saved policy");
        Ok(())
    }

    async fn add_policy(&self, _sec: &str, _ptype: &str, _rule: Rule) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented {
            operation: "add_policy",
        })
    }

    async fn remove_policy(&self, _sec: &str, _ptype: &str, _rule: Rule) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented {
            operation: "remove_policy",
        })
    }

    async fn remove_filtered_policy(
        &self,
        _sec: &str,
        _ptype: &str,
        _field_index: usize,
        _field_values: Vec<String>,
    ) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented {
            operation: "remove_filtered_policy",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{rule, MemoryModel};
    use crate::store::{BucketAttrs, ObjectReader, ObjectWriter, StoreResult};
    use futures::StreamExt;

    const BUCKET: &str = "mockBucketName";
    const KEY: &str = "path/to/policy.csv";

    async fn put_raw(client: &ObjectStoreClient, content: &[u8]) {
        let mut writer = client.open_writer(BUCKET, KEY).await.unwrap();
        writer.write(Bytes::copy_from_slice(content)).await.unwrap();
        writer.finish().await.unwrap();
    }

    async fn adapter_with(content: Option<&[u8]>) -> BlobAdapter {
        let client = ObjectStoreClient::memory(BUCKET);
        if let Some(content) = content {
            put_raw(&client, content).await;
        }
        BlobAdapter::new(Arc::new(client), BUCKET, KEY).await.unwrap()
    }

    /// Client whose reads fail after the first chunk and whose writes always fail.
    struct BrokenClient;

    struct BrokenWriter;

    #[async_trait]
    impl ObjectWriter for BrokenWriter {
        async fn write(&mut self, _chunk: Bytes) -> StoreResult<()> {
            Err(StoreError::Io {
                message: "connection reset".to_string(),
            })
        }

        async fn finish(&mut self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BlobClient for BrokenClient {
        async fn bucket_attrs(&self, bucket: &str) -> StoreResult<BucketAttrs> {
            Ok(BucketAttrs {
                name: bucket.to_string(),
            })
        }

        async fn open_reader(&self, _bucket: &str, _key: &str) -> StoreResult<ObjectReader> {
            let chunks = vec![
                Ok(Bytes::from("p, reader, data1, read\n")),
                Err(StoreError::Io {
                    message: "connection reset".to_string(),
                }),
            ];
            Ok(futures::stream::iter(chunks).boxed())
        }

        async fn open_writer(
            &self,
            _bucket: &str,
            _key: &str,
        ) -> StoreResult<Box<dyn ObjectWriter>> {
            Ok(Box::new(BrokenWriter))
        }
    }

    /// Client serving a fixed object in the given chunks.
    struct ChunkedClient(Vec<&'static str>);

    #[async_trait]
    impl BlobClient for ChunkedClient {
        async fn bucket_attrs(&self, bucket: &str) -> StoreResult<BucketAttrs> {
            Ok(BucketAttrs {
                name: bucket.to_string(),
            })
        }

        async fn open_reader(&self, _bucket: &str, _key: &str) -> StoreResult<ObjectReader> {
            let chunks: Vec<StoreResult<Bytes>> =
                self.0.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
            Ok(futures::stream::iter(chunks).boxed())
        }

        async fn open_writer(
            &self,
            _bucket: &str,
            _key: &str,
        ) -> StoreResult<Box<dyn ObjectWriter>> {
            Ok(Box::new(BrokenWriter))
        }
    }

    #[tokio::test]
    async fn test_load_policy() {
        let adapter = adapter_with(Some(&b"p, reader, data1, read\ng, alice, writer\n"[..])).await;

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();

        assert_eq!(model.rules("p", "p"), &[rule(&["reader", "data1", "read"])]);
        assert_eq!(model.rules("g", "g"), &[rule(&["alice", "writer"])]);
    }

    #[tokio::test]
    async fn test_load_skips_malformed_lines() {
        let content = b"\n  \np\nx, foo, bar\n# note\np, reader, data1, read\n\xff\n  g, alice, writer  ";
        let adapter = adapter_with(Some(&content[..])).await;

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();

        assert_eq!(model.len(), 2);
        assert!(model.has_rule("p", "p", &rule(&["reader", "data1", "read"])));
        assert!(model.has_rule("g", "g", &rule(&["alice", "writer"])));
    }

    #[tokio::test]
    async fn test_load_lines_split_across_chunks() {
        let client = ChunkedClient(vec![
            "p, rea",
            "der, da",
            "ta1, read\ng, al",
            "ice, writer\n\np, writer, data1, write\ng",
            ", bob",
            ", reader",
        ]);
        let adapter = BlobAdapter::new(Arc::new(client), BUCKET, KEY).await.unwrap();

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();

        assert_eq!(
            model.rules("p", "p"),
            &[
                rule(&["reader", "data1", "read"]),
                rule(&["writer", "data1", "write"])
            ]
        );
        assert_eq!(
            model.rules("g", "g"),
            &[rule(&["alice", "writer"]), rule(&["bob", "reader"])]
        );
    }

    #[tokio::test]
    async fn test_load_byte_sized_chunks() {
        const CONTENT: &str = "p, reader, data1, read\ng, alice, writer\n";
        let chunks = (0..CONTENT.len()).map(|i| &CONTENT[i..i + 1]).collect();
        let adapter = BlobAdapter::new(Arc::new(ChunkedClient(chunks)), BUCKET, KEY)
            .await
            .unwrap();

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();

        assert_eq!(model.len(), 2);
        assert!(model.has_rule("g", "g", &rule(&["alice", "writer"])));
    }

    #[tokio::test]
    async fn test_load_missing_object_is_empty() {
        let adapter = adapter_with(None).await;

        let mut model = MemoryModel::new();
        adapter.load_policy(&mut model).await.unwrap();
        assert!(model.is_empty());
    }

    #[tokio::test]
    async fn test_save_policy_format() {
        let client = Arc::new(ObjectStoreClient::memory(BUCKET));
        let adapter = BlobAdapter::new(client.clone(), BUCKET, KEY).await.unwrap();

        let mut model = MemoryModel::new();
        model.add_rule("g", "g", rule(&["alice", "writer"]));
        model.add_rule("p", "p", rule(&["reader", "data1", "read"]));
        model.add_rule("p", "p", rule(&["writer", "data1", "write"]));
        model.add_rule("e", "e", rule(&["some(where (p.eft == allow))"]));
        adapter.save_policy(&model).await.unwrap();

        let chunks: Vec<Bytes> = client
            .open_reader(BUCKET, KEY)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(chunks.concat()).unwrap(),
            "p, reader, data1, read\np, writer, data1, write\ng, alice, writer\n"
        );
    }

    #[tokio::test]
    async fn test_read_error_aborts_load() {
        let adapter = BlobAdapter::new(Arc::new(BrokenClient), BUCKET, KEY)
            .await
            .unwrap();

        let mut model = MemoryModel::new();
        let err = adapter.load_policy(&mut model).await.unwrap_err();
        assert!(matches!(err, AdapterError::Store(StoreError::Io { .. })));
        // Lines before the failure stay loaded.
        assert_eq!(model.len(), 1);
    }

    #[tokio::test]
    async fn test_write_error_aborts_save() {
        let adapter = BlobAdapter::new(Arc::new(BrokenClient), BUCKET, KEY)
            .await
            .unwrap();

        let mut model = MemoryModel::new();
        model.add_rule("p", "p", rule(&["reader", "data1", "read"]));
        let err = adapter.save_policy(&model).await.unwrap_err();
        assert!(matches!(err, AdapterError::Store(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_mutation_stubs_not_implemented() {
        let adapter = adapter_with(None).await;

        let err = adapter
            .add_policy("p", "p", rule(&["alice", "data1", "read"]))
            .await
            .unwrap_err();
        assert!(err.is_not_implemented());
        assert_eq!(err.to_string(), "not implemented: add_policy");

        let err = adapter
            .remove_policy("p", "p", rule(&["alice", "data1", "read"]))
            .await
            .unwrap_err();
        assert!(err.is_not_implemented());

        let err = adapter
            .remove_filtered_policy("p", "p", 0, vec!["alice".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[tokio::test]
    async fn test_new_missing_bucket() {
        let client = Arc::new(ObjectStoreClient::memory(BUCKET));
        let err = BlobAdapter::new(client, "notExistingBucket", KEY)
            .await
            .unwrap_err();
        assert!(err.is_bucket_not_found());
        assert_eq!(err.to_string(), "bucket doesn't exist: notExistingBucket");
    }

    #[test]
    fn test_debug_hides_client() {
        let rendered = format!(
            "{:?}",
            BlobAdapter {
                client: Arc::new(BrokenClient),
                bucket: BUCKET.to_string(),
                key: KEY.to_string(),
                lock: Mutex::new(()),
            }
        );
        assert!(rendered.contains("mockBucketName"));
        assert!(rendered.contains("path/to/policy.csv"));
    }
}
