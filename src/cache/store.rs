//! Storage backends for cache generations

use std::collections::HashMap;

use thiserror::Error;

use super::disk::DiskStorage;
use super::request::CachedResponse;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Generation not found: {0}")]
    MissingGeneration(String),
}

/// Durable store of named generations, each mapping URL → record.
///
/// Every method is atomic with respect to a single key: a reader sees either
/// the previous record or the new one, never a mix.
pub trait CacheStorage: Send + Sync {
    /// Names of every generation currently present
    fn generations(&self) -> Result<Vec<String>, StoreError>;

    /// Whether a generation exists
    fn has(&self, generation: &str) -> Result<bool, StoreError>;

    /// Look up a record by URL
    fn lookup(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>, StoreError>;

    /// Store or replace a record in an existing generation
    fn put(&mut self, generation: &str, record: &CachedResponse) -> Result<(), StoreError>;

    /// Publish a complete generation in one step, replacing one of the same name.
    ///
    /// Either every record becomes visible or none does.
    fn commit_generation(
        &mut self,
        generation: &str,
        records: &[CachedResponse],
    ) -> Result<(), StoreError>;

    /// Delete a generation and all of its records
    fn delete(&mut self, generation: &str) -> Result<bool, StoreError>;
}

/// In-memory storage, used when the offline cache is disabled and in tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    generations: HashMap<String, HashMap<String, CachedResponse>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a generation
    #[cfg(test)]
    pub fn len(&self, generation: &str) -> usize {
        self.generations.get(generation).map_or(0, HashMap::len)
    }
}

impl CacheStorage for MemoryStorage {
    fn generations(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.generations.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn has(&self, generation: &str) -> Result<bool, StoreError> {
        Ok(self.generations.contains_key(generation))
    }

    fn lookup(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>, StoreError> {
        Ok(self
            .generations
            .get(generation)
            .and_then(|records| records.get(url))
            .cloned())
    }

    fn put(&mut self, generation: &str, record: &CachedResponse) -> Result<(), StoreError> {
        let records = self
            .generations
            .get_mut(generation)
            .ok_or_else(|| StoreError::MissingGeneration(generation.to_string()))?;
        records.insert(record.url.to_string(), record.clone());
        Ok(())
    }

    fn commit_generation(
        &mut self,
        generation: &str,
        records: &[CachedResponse],
    ) -> Result<(), StoreError> {
        let staged = records
            .iter()
            .map(|record| (record.url.to_string(), record.clone()))
            .collect();
        self.generations.insert(generation.to_string(), staged);
        Ok(())
    }

    fn delete(&mut self, generation: &str) -> Result<bool, StoreError> {
        Ok(self.generations.remove(generation).is_some())
    }
}

/// Storage picked at startup: on disk, or in memory when offline caching is off
#[derive(Debug)]
pub enum Backend {
    Disk(DiskStorage),
    Memory(MemoryStorage),
}

impl Backend {
    fn inner(&self) -> &dyn CacheStorage {
        match self {
            Self::Disk(disk) => disk,
            Self::Memory(memory) => memory,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CacheStorage {
        match self {
            Self::Disk(disk) => disk,
            Self::Memory(memory) => memory,
        }
    }
}

impl CacheStorage for Backend {
    fn generations(&self) -> Result<Vec<String>, StoreError> {
        self.inner().generations()
    }

    fn has(&self, generation: &str) -> Result<bool, StoreError> {
        self.inner().has(generation)
    }

    fn lookup(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>, StoreError> {
        self.inner().lookup(generation, url)
    }

    fn put(&mut self, generation: &str, record: &CachedResponse) -> Result<(), StoreError> {
        self.inner_mut().put(generation, record)
    }

    fn commit_generation(
        &mut self,
        generation: &str,
        records: &[CachedResponse],
    ) -> Result<(), StoreError> {
        self.inner_mut().commit_generation(generation, records)
    }

    fn delete(&mut self, generation: &str) -> Result<bool, StoreError> {
        self.inner_mut().delete(generation)
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
            headers: Vec::new(),
            body: body.to_vec(),
            kind: ResponseType::Basic,
            stored_at: 0,
        }
    }

    #[test]
    fn test_commit_and_lookup() {
        let mut storage = MemoryStorage::new();
        storage
            .commit_generation("v1", &[record("https://a.example/x", b"x")])
            .unwrap();

        assert!(storage.has("v1").unwrap());
        let found = storage.lookup("v1", "https://a.example/x").unwrap().unwrap();
        assert_eq!(found.body, b"x");
        assert!(storage.lookup("v1", "https://a.example/y").unwrap().is_none());
    }

    #[test]
    fn test_put_requires_generation() {
        let mut storage = MemoryStorage::new();
        let err = storage.put("v1", &record("https://a.example/x", b"x"));
        assert!(matches!(err, Err(StoreError::MissingGeneration(_))));
    }

    #[test]
    fn test_put_replaces_record() {
        let mut storage = MemoryStorage::new();
        storage.commit_generation("v1", &[]).unwrap();
        storage.put("v1", &record("https://a.example/x", b"old")).unwrap();
        storage.put("v1", &record("https://a.example/x", b"new")).unwrap();

        assert_eq!(storage.len("v1"), 1);
        let found = storage.lookup("v1", "https://a.example/x").unwrap().unwrap();
        assert_eq!(found.body, b"new");
    }

    #[test]
    fn test_delete() {
        let mut storage = MemoryStorage::new();
        storage.commit_generation("v1", &[]).unwrap();
        assert!(storage.delete("v1").unwrap());
        assert!(!storage.delete("v1").unwrap());
        assert!(storage.generations().unwrap().is_empty());
    }
}
