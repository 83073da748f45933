// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Per-connection schema cache and small file helpers.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::discovery::ResourceSchema;

/// How long a resolved schema stays valid before being resolved again
pub const SCHEMA_TTL: Duration = Duration::from_secs(300); // 5 minutes

/// Write content atomically: temp file in the target directory, then rename.
/// On Unix the file is created with `mode` before any content lands.
pub(crate) fn atomic_write(path: &Path, content: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    use tempfile::NamedTempFile;

    let mut temp_file = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;

    // Atomically rename to final path (atomic on Unix-like systems)
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Replace anything but alphanumerics, '-' and '_' so ids are safe as file names
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Readable file stem for `name` that stays distinct for ids sanitizing alike
/// (`prod.1` vs `prod_1`): the sanitized id plus a short blake3 of the raw id.
pub(crate) fn unique_filename(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex();
    format!("{}-{}", sanitize_filename(name), &hash.as_str()[..12])
}

struct CachedSchema {
    schema: ResourceSchema,
    resolved_at: Instant,
}

impl CachedSchema {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.resolved_at.elapsed() > ttl
    }
}

/// Resolved schemas keyed by (resource type, explicit api version)
pub struct SchemaCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), CachedSchema>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(SCHEMA_TTL)
    }
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(resource_type: &str, explicit: Option<&str>) -> (String, String) {
        (
            resource_type.trim().to_lowercase(),
            explicit.unwrap_or_default().trim().to_string(),
        )
    }

    pub async fn get(&self, resource_type: &str, explicit: Option<&str>) -> Option<ResourceSchema> {
        let entries = self.entries.read().await;
        entries
            .get(&Self::key(resource_type, explicit))
            .filter(|cached| !cached.is_expired(self.ttl))
            .map(|cached| cached.schema.clone())
    }

    pub async fn insert(&self, resource_type: &str, explicit: Option<&str>, schema: ResourceSchema) {
        let mut entries = self.entries.write().await;
        entries.insert(
            Self::key(resource_type, explicit),
            CachedSchema {
                schema,
                resolved_at: Instant::now(),
            },
        );
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::discovery::{ClusterVersion, resolve_static};
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("prod-01"), "prod-01");
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
        assert_eq!(sanitize_filename("../etc"), "___etc");
    }

    #[test]
    fn test_unique_filename_separates_lookalike_ids() {
        let dotted = unique_filename("prod.1");
        let underscored = unique_filename("prod_1");
        assert_ne!(dotted, underscored);
        assert!(dotted.starts_with("prod_1-"));
        assert_eq!(unique_filename("prod.1"), dotted);
        assert!(!unique_filename("../etc").contains('/'));
    }

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"one", None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");
        atomic_write(&path, b"two", None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        atomic_write(&path, b"token", Some(0o600)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_schema_cache_keys() {
        let cache = SchemaCache::default();
        let schema = resolve_static("cronjobs", ClusterVersion::BASELINE).unwrap();
        cache.insert("CronJobs", None, schema.clone()).await;

        assert_eq!(cache.get("cronjobs", None).await, Some(schema));
        assert_eq!(cache.get("cronjobs", Some("batch/v1beta1")).await, None);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_schema_cache_expiry() {
        let cache = SchemaCache::new(Duration::ZERO);
        let schema = resolve_static("pods", ClusterVersion::BASELINE).unwrap();
        cache.insert("pods", None, schema).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("pods", None).await, None);
    }
}
