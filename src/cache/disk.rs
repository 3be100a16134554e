//! Disk-backed cache storage
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<generation>/<md5(url)>.json   record metadata
//! <base>/<generation>/<md5(url)>.body   response body
//! <base>/.staging-*/                    generation being committed
//! <base>/.retired-<generation>/          previous copy during a recommit
//! ```
//!
//! Files are written to a temp file in the same directory and renamed into
//! place. The body is written before the metadata, so a metadata file always
//! points at a complete body.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use super::request::CachedResponse;
use super::store::{CacheStorage, StoreError};

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// Move `source` to `target`, keeping any previous `target` until the move lands.
///
/// On failure the previous directory is restored.
fn replace_dir(source: &Path, target: &Path, retired: &Path) -> Result<(), StoreError> {
    if !target.exists() {
        fs::rename(source, target)?;
        return Ok(());
    }

    if retired.exists() {
        fs::remove_dir_all(retired)?;
    }
    fs::rename(target, retired)?;

    if let Err(e) = fs::rename(source, target) {
        fs::rename(retired, target)?;
        return Err(e.into());
    }
    if let Err(e) = fs::remove_dir_all(retired) {
        tracing::warn!("Could not remove {}: {}", retired.display(), e);
    }
    Ok(())
}

/// Cache storage rooted at a directory
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base: PathBuf,
}

impl DiskStorage {
    /// Open (and create if needed) storage rooted at `base`
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        tracing::debug!("Opened cache storage at {}", base.display());
        Ok(Self { base })
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.base.join(generation)
    }

    fn record_stem(url: &str) -> String {
        format!("{:x}", md5::compute(url.as_bytes()))
    }

    fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_record(dir: &Path, record: &CachedResponse) -> Result<(), StoreError> {
        let stem = Self::record_stem(record.url.as_str());
        let meta = serde_json::to_vec(record)?;
        Self::write_atomic(dir, &format!("{stem}.body"), &record.body)?;
        Self::write_atomic(dir, &format!("{stem}.json"), &meta)?;
        Ok(())
    }
}

impl CacheStorage for DiskStorage {
    fn generations(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn has(&self, generation: &str) -> Result<bool, StoreError> {
        Ok(self.generation_dir(generation).is_dir())
    }

    fn lookup(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>, StoreError> {
        let dir = self.generation_dir(generation);
        let stem = Self::record_stem(url);
        let meta_path = dir.join(format!("{stem}.json"));

        if !meta_path.exists() {
            return Ok(None);
        }

        let mut record: CachedResponse = serde_json::from_slice(&fs::read(&meta_path)?)?;
        // md5 collisions are not worth a second index; guard on the stored URL
        if record.url.as_str() != url {
            return Ok(None);
        }
        record.body = fs::read(dir.join(format!("{stem}.body")))?;
        Ok(Some(record))
    }

    fn put(&mut self, generation: &str, record: &CachedResponse) -> Result<(), StoreError> {
        let dir = self.generation_dir(generation);
        if !dir.is_dir() {
            return Err(StoreError::MissingGeneration(generation.to_string()));
        }
        Self::write_record(&dir, record)
    }

    fn commit_generation(
        &mut self,
        generation: &str,
        records: &[CachedResponse],
    ) -> Result<(), StoreError> {
        // Dropping the TempDir on any early return removes the partial copy
        let staging = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.base)?;

        for record in records {
            Self::write_record(staging.path(), record)?;
        }

        let target = self.generation_dir(generation);
        let retired = self.base.join(format!("{RETIRED_PREFIX}{generation}"));
        replace_dir(staging.path(), &target, &retired)?;

        tracing::debug!(
            "Committed generation {} with {} records",
            generation,
            records.len()
        );
        Ok(())
    }

    fn delete(&mut self, generation: &str) -> Result<bool, StoreError> {
        let dir = self.generation_dir(generation);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(dir)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::request::ResponseType;
    use url::Url;

    fn record(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse {
            url: Url::parse(url).unwrap(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/css".to_string())],
            body: body.to_vec(),
            kind: ResponseType::Cors,
            stored_at: 42,
        }
    }

    #[test]
    fn test_commit_then_lookup_is_byte_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        let original = record("https://cdn.example/a.css", &[0, 159, 146, 150, b'x']);

        storage.commit_generation("markview-v1", &[original.clone()]).unwrap();

        let found = storage
            .lookup("markview-v1", "https://cdn.example/a.css")
            .unwrap()
            .unwrap();
        assert_eq!(found, original);
    }

    #[test]
    fn test_staging_dirs_are_not_generations() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        fs::create_dir(dir.path().join(".staging-leftover")).unwrap();
        storage.commit_generation("markview-v1", &[]).unwrap();

        assert_eq!(storage.generations().unwrap(), vec!["markview-v1".to_string()]);
    }

    #[test]
    fn test_recommit_replaces_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        storage
            .commit_generation("v1", &[record("https://cdn.example/old", b"old")])
            .unwrap();
        storage
            .commit_generation("v1", &[record("https://cdn.example/new", b"new")])
            .unwrap();

        assert!(storage.lookup("v1", "https://cdn.example/old").unwrap().is_none());
        assert!(storage.lookup("v1", "https://cdn.example/new").unwrap().is_some());
    }

    #[test]
    fn test_recommit_leaves_no_retired_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        storage.commit_generation("v1", &[]).unwrap();
        storage.commit_generation("v1", &[]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(storage.generations().unwrap(), vec!["v1".to_string()]);
    }

    #[test]
    fn test_failed_swap_keeps_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        storage
            .commit_generation("v1", &[record("https://cdn.example/old", b"old")])
            .unwrap();

        let missing = dir.path().join(".staging-gone");
        let target = dir.path().join("v1");
        let retired = dir.path().join(".retired-v1");
        assert!(replace_dir(&missing, &target, &retired).is_err());

        assert!(!retired.exists());
        let found = storage.lookup("v1", "https://cdn.example/old").unwrap().unwrap();
        assert_eq!(found.body, b"old");
    }

    #[test]
    fn test_put_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();

        assert!(storage.put("v1", &record("https://cdn.example/x", b"x")).is_err());

        storage.commit_generation("v1", &[]).unwrap();
        storage.put("v1", &record("https://cdn.example/x", b"x")).unwrap();
        storage.put("v1", &record("https://cdn.example/x", b"y")).unwrap();
        let found = storage.lookup("v1", "https://cdn.example/x").unwrap().unwrap();
        assert_eq!(found.body, b"y");

        assert!(storage.delete("v1").unwrap());
        assert!(!storage.has("v1").unwrap());
        assert!(storage.generations().unwrap().is_empty());
    }
}
