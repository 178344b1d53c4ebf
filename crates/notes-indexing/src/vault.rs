//! Filesystem document store.
//!
//! Layout: `<root>/user_<id>/**/*.md`. Paths handed out and accepted are
//! relative to `root` with `/` separators, e.g. `user_1/notes/a.md`; they are
//! also the index keys.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use notes_types::{DocumentStore, FileEntry, StoreError, StoredFile, TenantId};

const MARKDOWN_EXTENSION: &str = "md";

/// Vaults stored as plain directories under one root.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path to a filesystem path, refusing anything that could
    /// escape the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StoreError::InvalidPath(path.to_string()));
            }
        }
        Ok(self.root.join(relative))
    }

    fn store_path(&self, full: &Path) -> Option<String> {
        let relative = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}

fn modified_utc(path: &Path, metadata: &fs::Metadata) -> Result<DateTime<Utc>, StoreError> {
    let modified = metadata
        .modified()
        .map_err(|e| StoreError::io(path.display().to_string(), e))?;
    Ok(DateTime::<Utc>::from(modified))
}

impl DocumentStore for VaultStore {
    fn tenants(&self) -> Result<Vec<Result<TenantId, StoreError>>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Vault root does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(self.root.display().to_string(), e)),
        };

        let mut tenants = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tenants.push(Err(StoreError::io(self.root.display().to_string(), e)));
                    continue;
                }
            };
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            tenants.push(name.parse::<TenantId>());
        }

        // By id; malformed entries first
        tenants.sort_by_key(|t| t.as_ref().ok().copied());
        Ok(tenants)
    }

    fn list_all(&self, tenant: &TenantId) -> Result<Vec<FileEntry>, StoreError> {
        let vault = self.root.join(tenant.to_string());
        if !vault.is_dir() {
            return Err(StoreError::NotFound(tenant.to_string()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&vault)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Skipping unreadable vault entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }

            let Some(path) = self.store_path(entry.path()) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
                continue;
            };
            let modified = match entry.metadata() {
                Ok(metadata) => modified_utc(entry.path(), &metadata)?,
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping file without metadata");
                    continue;
                }
            };

            files.push(FileEntry { path, modified });
        }

        debug!(tenant = %tenant, count = files.len(), "Listed vault");
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<StoredFile, StoreError> {
        let full = self.resolve(path)?;
        let content = fs::read_to_string(&full).map_err(|e| StoreError::io(path, e))?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::io(path, e))?;

        Ok(StoredFile {
            path: path.to_string(),
            content,
            modified: modified_utc(&full, &metadata)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn vault() -> (TempDir, VaultStore) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "user_1/notes/a.md", "alpha");
        write(root, "user_1/b.MD", "beta");
        write(root, "user_1/image.png", "png");
        write(root, "user_1/.trash/old.md", "old");
        write(root, "user_2/c.md", "gamma");
        write(root, "shared/d.md", "delta");
        write(root, "README.md", "root file");
        fs::create_dir_all(root.join(".cache")).unwrap();
        let store = VaultStore::new(root);
        (temp_dir, store)
    }

    #[test]
    fn test_tenants() {
        let (_tmp, store) = vault();
        let tenants = store.tenants().unwrap();

        let ok: Vec<_> = tenants.iter().filter_map(|t| t.as_ref().ok()).collect();
        assert_eq!(ok, vec![&TenantId(1), &TenantId(2)]);

        let bad: Vec<_> = tenants.iter().filter(|t| t.is_err()).collect();
        assert_eq!(bad.len(), 1);
        assert!(matches!(bad[0], Err(StoreError::InvalidTenant(name)) if name == "shared"));
    }

    #[test]
    fn test_missing_root_has_no_tenants() {
        let temp_dir = TempDir::new().unwrap();
        let store = VaultStore::new(temp_dir.path().join("missing"));
        assert!(store.tenants().unwrap().is_empty());
    }

    #[test]
    fn test_list_all_markdown_only() {
        let (_tmp, store) = vault();
        let files = store.list_all(&TenantId(1)).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["user_1/b.MD", "user_1/notes/a.md"]);
    }

    #[test]
    fn test_list_all_unknown_tenant() {
        let (_tmp, store) = vault();
        assert!(matches!(
            store.list_all(&TenantId(9)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_read() {
        let (_tmp, store) = vault();
        let file = store.read("user_1/notes/a.md").unwrap();
        assert_eq!(file.content, "alpha");
        assert_eq!(file.path, "user_1/notes/a.md");

        let listed = store.list_all(&TenantId(1)).unwrap();
        let entry = listed.iter().find(|f| f.path == "user_1/notes/a.md").unwrap();
        assert_eq!(entry.modified, file.modified);
    }

    #[test]
    fn test_read_missing() {
        let (_tmp, store) = vault();
        assert!(matches!(
            store.read("user_1/missing.md"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_rejects_escaping_paths() {
        let (_tmp, store) = vault();
        for path in ["../outside.md", "/etc/passwd", "user_1/../../x.md", "./user_1/a.md", ""] {
            assert!(
                matches!(store.read(path), Err(StoreError::InvalidPath(_))),
                "accepted {path}"
            );
        }
    }
}
