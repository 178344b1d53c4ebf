//! The file store collaborator the indexer reads from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Directory name prefix of a tenant vault.
pub const TENANT_PREFIX: &str = "user_";

/// Identifies one tenant's document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TENANT_PREFIX, self.0)
    }
}

impl FromStr for TenantId {
    type Err = StoreError;

    /// Parse a vault directory name such as `user_42`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(TENANT_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
            .map(TenantId)
            .ok_or_else(|| StoreError::InvalidTenant(s.to_string()))
    }
}

/// A markdown file known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Store-relative path, also the index key
    pub path: String,
    pub modified: DateTime<Utc>,
}

/// File content plus its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub content: String,
    pub modified: DateTime<Utc>,
}

/// Source of truth for document content.
///
/// The index is a cache over this store. Every path handed out by
/// `list_all` must be accepted by `read`.
pub trait DocumentStore: Send + Sync {
    /// All tenant collections. A malformed tenant entry is reported in
    /// place so callers can count it and keep going.
    fn tenants(&self) -> Result<Vec<Result<TenantId, StoreError>>, StoreError>;

    /// Every markdown document belonging to `tenant`.
    fn list_all(&self, tenant: &TenantId) -> Result<Vec<FileEntry>, StoreError>;

    /// Read one document.
    fn read(&self, path: &str) -> Result<StoredFile, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_round_trip() {
        let tenant: TenantId = "user_42".parse().unwrap();
        assert_eq!(tenant, TenantId(42));
        assert_eq!(tenant.to_string(), "user_42");
    }

    #[test]
    fn test_bad_tenant_names() {
        for name in ["user_", "user_abc", "admin", "user-1", "user_-3"] {
            let result = name.parse::<TenantId>();
            assert!(
                matches!(result, Err(StoreError::InvalidTenant(_))),
                "{name} should be rejected"
            );
        }
    }
}
