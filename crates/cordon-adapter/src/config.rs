//! Policy location parsing.
//!
//! A policy object is addressed by a URL naming the backend, the bucket and
//! the object key:
//!
//! ```text
//! s3://my-bucket/path/to/policy.csv?region=eu-west-1
//! gs://my-bucket/path/to/policy.csv
//! file:///var/lib/cordon/policy.csv   (bucket = /var/lib/cordon)
//! memory://test/policy.csv            (for testing)
//! ```
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CORDON_POLICY_URL` | Policy location used by [`PolicyLocation::from_env`] |

use std::fmt;

use percent_encoding::percent_decode_str;

use crate::store::{StoreError, StoreResult};

/// Environment variable read by [`PolicyLocation::from_env`].
pub const POLICY_URL_ENV: &str = "CORDON_POLICY_URL";

/// Parsed location of the policy object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLocation {
    /// The scheme (s3, gs, file, memory)
    pub scheme: String,
    /// Bucket name; for file:// the directory holding the object
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
    /// Optional region (for S3)
    pub region: Option<String>,
}

impl PolicyLocation {
    /// Parse a location URL like `s3://bucket/path/to/policy.csv`.
    pub fn parse(spec: &str) -> StoreResult<Self> {
        let invalid = |reason: &str| StoreError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(spec).map_err(|e| invalid(&e.to_string()))?;
        let scheme = url.scheme().to_string();
        // Keys and directories are used verbatim, so undo URL escaping (`%20`).
        let decoded = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|e| invalid(&format!("path is not valid UTF-8: {}", e)))?;
        let path = decoded.trim_start_matches('/');

        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.to_string());

        let (bucket, key) = if scheme == "file" {
            // The directory plays the bucket role, the file name is the key.
            match path.rsplit_once('/') {
                Some((dir, file)) => (format!("/{}", dir), file.to_string()),
                None => ("/".to_string(), path.to_string()),
            }
        } else {
            let bucket = url
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| invalid("URL must include a bucket name"))?;
            (bucket.to_string(), path.to_string())
        };

        if key.is_empty() {
            return Err(invalid("URL must include an object key"));
        }

        Ok(Self {
            scheme,
            bucket,
            key,
            region,
        })
    }

    /// Read the location from `CORDON_POLICY_URL`.
    pub fn from_env() -> StoreResult<Self> {
        match std::env::var(POLICY_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::parse(url.trim()),
            _ => Err(StoreError::NotConfigured {
                message: format!("{} is not set", POLICY_URL_ENV),
            }),
        }
    }

    /// Check if this is a memory store (for testing).
    pub fn is_memory(&self) -> bool {
        self.scheme == "memory"
    }

    /// Check if this is a local file store.
    pub fn is_file(&self) -> bool {
        self.scheme == "file"
    }
}

impl fmt::Display for PolicyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file() {
            write!(f, "file://{}/{}", self.bucket.trim_end_matches('/'), self.key)?;
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)?;
        }
        if let Some(region) = &self.region {
            write!(f, "?region={}", region)?;
        }
        Ok(())
    }
}
