//! Key namespacing.
//!
//! Every logical key is stored as `"<prefix>:<key>"` so several datasets can
//! share one table. The reserved user key lives outside this namespace.

use std::sync::Arc;

/// Maps logical keys to storage keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: Arc<str>,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<Arc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key for a logical key.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }

    /// Logical key for a storage key. Keys from outside the namespace are
    /// returned unchanged.
    pub fn unkey<'a>(&self, stored: &'a str) -> &'a str {
        stored
            .strip_prefix(&*self.prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(stored)
    }
}
