//! Errors surfaced by the policy adapter.

use thiserror::Error;

use crate::store::StoreError;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Single-rule persistence is not supported; only full load/save is.
    #[error("not implemented: {operation}")]
    NotImplemented { operation: &'static str },

    /// Storage failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdapterError {
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    pub fn is_bucket_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_bucket_not_found())
    }
}
