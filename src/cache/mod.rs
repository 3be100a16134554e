//! Offline resource cache
//!
//! A named, versioned cache of byte-exact responses. The lifecycle mirrors a
//! service worker: [`ResourceCache::install`] populates a new generation from
//! the manifest, [`ResourceCache::activate`] deletes every other generation and
//! claims the open clients, and [`ResourceCache::handle`] serves requests
//! cache-first with network fallback, storing successful responses as they
//! pass through.
//!
//! ```text
//! Parsed ──install──▶ Installing ──ok──▶ Installed ──activate──▶ Activated
//!                          │
//!                          └──err──▶ Redundant
//! ```

pub mod disk;
pub mod fetch;
pub mod manifest;
pub mod request;
pub mod store;

use std::collections::HashMap;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use fetch::Fetcher;
use request::{CachedResponse, Request, Response};
use store::{CacheStorage, StoreError};

/// Errors surfaced by the cache lifecycle
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Install of {generation} failed at {url}: {reason}")]
    InstallFailed {
        generation: String,
        url: String,
        reason: String,
    },

    #[error("State error: {0}")]
    State(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Lifecycle state of the cache worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    /// Installed and eligible for activation without waiting
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker never serves
    Redundant,
}

/// Static description of the generation this worker owns
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub generation: String,
    pub manifest: Vec<Url>,
}

impl CacheConfig {
    /// The generation and manifest compiled into this build
    pub fn builtin() -> Self {
        Self {
            generation: manifest::GENERATION.to_string(),
            manifest: manifest::manifest_urls(),
        }
    }
}

/// Outcome of the lookup half of [`ResourceCache::handle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Served from the current generation; the network was not touched
    CacheHit(CachedResponse),
    /// Came from the network (or was synthesized because the network failed)
    Network {
        response: Response,
        should_store: bool,
    },
}

/// Result of an activation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale generations that were deleted
    pub deleted: Vec<String>,
    /// Stale generations that could not be deleted
    pub failed: Vec<String>,
    /// Number of clients now controlled by this generation
    pub claimed: usize,
}

/// Open viewer windows and the generation controlling each
#[derive(Debug, Default)]
struct Clients {
    controllers: HashMap<String, Option<String>>,
}

impl Clients {
    fn claim(&mut self, generation: &str) -> usize {
        for controller in self.controllers.values_mut() {
            *controller = Some(generation.to_string());
        }
        self.controllers.len()
    }
}

/// Cache manager over a fetcher and a storage backend
pub struct ResourceCache<F, S> {
    config: CacheConfig,
    fetcher: F,
    storage: RwLock<S>,
    state: RwLock<WorkerState>,
    clients: RwLock<Clients>,
}

impl<F: Fetcher, S: CacheStorage> ResourceCache<F, S> {
    pub fn new(config: CacheConfig, fetcher: F, storage: S) -> Self {
        Self {
            config,
            fetcher,
            storage: RwLock::new(storage),
            state: RwLock::new(WorkerState::Parsed),
            clients: RwLock::new(Clients::default()),
        }
    }

    /// Name of the generation this worker owns
    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    /// Names of every generation in storage
    pub async fn generations(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.storage.read().await.generations()?)
    }

    /// Fetch the whole manifest and publish it as this worker's generation.
    ///
    /// Any network error or non-success status aborts the install and nothing
    /// is published.
    pub async fn install(&self) -> Result<(), CacheError> {
        let generation = self.config.generation.clone();
        self.set_state(WorkerState::Installing).await;
        tracing::info!(
            "Installing cache generation {} ({} resources)",
            generation,
            self.config.manifest.len()
        );

        let requests: Vec<Request> = self
            .config
            .manifest
            .iter()
            .cloned()
            .map(Request::get)
            .collect();
        let results = join_all(requests.iter().map(|r| self.fetcher.fetch(r))).await;

        let mut records = Vec::with_capacity(results.len());
        for (request, result) in requests.iter().zip(results) {
            let failure = match result {
                Ok(response) if response.is_ok() => {
                    let mut record = CachedResponse::snapshot(&response);
                    record.url = request.url.clone();
                    records.push(record);
                    continue;
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.reason,
            };

            self.set_state(WorkerState::Redundant).await;
            tracing::warn!("Install of {} failed at {}: {}", generation, request.url, failure);
            return Err(CacheError::InstallFailed {
                generation,
                url: request.url.to_string(),
                reason: failure,
            });
        }

        if let Err(e) = self
            .storage
            .write()
            .await
            .commit_generation(&generation, &records)
        {
            self.set_state(WorkerState::Redundant).await;
            tracing::warn!("Install of {} could not be stored: {}", generation, e);
            return Err(e.into());
        }

        self.set_state(WorkerState::Installed).await;
        tracing::info!("Installed {}; skipping wait for activation", generation);
        Ok(())
    }

    /// Install only if an earlier run has not already stored this generation.
    ///
    /// A stored generation was activated by that run, so it is activated again
    /// right away and serves requests without waiting for a fresh install.
    pub async fn ensure_installed(&self) -> Result<(), CacheError> {
        let present = self.storage.read().await.has(&self.config.generation)?;
        if !present {
            return self.install().await;
        }

        tracing::debug!("Generation {} already installed", self.config.generation);
        self.set_state(WorkerState::Installed).await;
        let report = self.activate().await?;
        if !report.failed.is_empty() {
            tracing::warn!("Stale generations left behind: {:?}", report.failed);
        }
        Ok(())
    }

    /// Delete every other generation and claim all registered clients.
    ///
    /// Running it again without an install in between changes nothing.
    pub async fn activate(&self) -> Result<ActivationReport, CacheError> {
        match self.state().await {
            WorkerState::Installed | WorkerState::Activated => {}
            other => {
                return Err(CacheError::State(format!(
                    "cannot activate a worker in state {:?}",
                    other
                )))
            }
        }

        let previous = self.state().await;
        self.set_state(WorkerState::Activating).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        {
            let mut storage = self.storage.write().await;
            let names = match storage.generations() {
                Ok(names) => names,
                Err(e) => {
                    drop(storage);
                    self.set_state(previous).await;
                    return Err(e.into());
                }
            };
            for name in names {
                if name == self.config.generation {
                    continue;
                }
                tracing::info!("Deleting old cache generation {}", name);
                match storage.delete(&name) {
                    Ok(_) => deleted.push(name),
                    Err(e) => {
                        tracing::warn!("Failed to delete generation {}: {}", name, e);
                        failed.push(name);
                    }
                }
            }
        }

        let claimed = self.clients.write().await.claim(&self.config.generation);
        self.set_state(WorkerState::Activated).await;
        tracing::info!(
            "Activated {} ({} clients claimed)",
            self.config.generation,
            claimed
        );

        Ok(ActivationReport {
            deleted,
            failed,
            claimed,
        })
    }

    /// Track an open client; it is uncontrolled until the next activation
    pub async fn register_client(&self, id: &str) {
        let active = self.state().await == WorkerState::Activated;
        let controller = active.then(|| self.config.generation.clone());
        self.clients
            .write()
            .await
            .controllers
            .insert(id.to_string(), controller);
    }

    /// Whether a client is served by this generation
    pub async fn is_controlled(&self, id: &str) -> bool {
        self.clients
            .read()
            .await
            .controllers
            .get(id)
            .is_some_and(|c| c.as_deref() == Some(self.config.generation.as_str()))
    }

    /// Serve a request cache-first, falling back to the network.
    pub async fn handle(&self, request: &Request) -> Response {
        let decision = self.resolve(request).await;
        self.commit(request, decision).await
    }

    /// Decide where a response comes from, without storing anything
    pub async fn resolve(&self, request: &Request) -> FetchDecision {
        let controlling = self.state().await == WorkerState::Activated && request.is_get();

        if controlling {
            let found = self
                .storage
                .read()
                .await
                .lookup(&self.config.generation, request.key());
            match found {
                Ok(Some(record)) => {
                    tracing::trace!("Cache hit for {}", request.url);
                    return FetchDecision::CacheHit(record);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache lookup for {} failed: {}", request.url, e),
            }
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let should_store = controlling && response.is_storable();
                FetchDecision::Network {
                    response,
                    should_store,
                }
            }
            Err(e) => {
                tracing::warn!("Serving offline response: {}", e);
                FetchDecision::Network {
                    response: Response::offline(request.url.clone()),
                    should_store: false,
                }
            }
        }
    }

    /// Apply the storing side effect of a decision and produce the response.
    ///
    /// A failed store is logged and otherwise ignored.
    pub async fn commit(&self, request: &Request, decision: FetchDecision) -> Response {
        match decision {
            FetchDecision::CacheHit(record) => Response::from_record(&record),
            FetchDecision::Network {
                response,
                should_store,
            } => {
                if should_store {
                    let mut record = CachedResponse::snapshot(&response);
                    record.url = request.url.clone();
                    if let Err(e) = self
                        .storage
                        .write()
                        .await
                        .put(&self.config.generation, &record)
                    {
                        tracing::warn!("Could not cache {}: {}", request.url, e);
                    }
                }
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetch::FetchError;
    use crate::cache::request::ResponseType;
    use crate::cache::store::MemoryStorage;
    use reqwest::Method;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const CSS: &str = "https://cdn.example/style.css";
    const JS: &str = "https://cdn.example/app.js";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ok(s: &str, body: &str, kind: ResponseType) -> Response {
        Response {
            url: url(s),
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
            kind,
            from_cache: false,
        }
    }

    /// Fetcher answering from a fixed route table
    #[derive(Default)]
    struct MockFetcher {
        routes: HashMap<String, Response>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn with(mut self, response: Response) -> Self {
            self.routes.insert(response.url.to_string(), response);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError {
                    url: request.url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            match self.routes.get(request.url.as_str()) {
                Some(response) => Ok(response.clone()),
                None => Ok(Response {
                    status: 404,
                    body: Vec::new(),
                    ..ok(request.url.as_str(), "", ResponseType::Basic)
                }),
            }
        }
    }

    /// Memory storage with switchable write and delete failures
    #[derive(Default)]
    struct FaultyStorage {
        inner: MemoryStorage,
        fail_put: bool,
        fail_delete: bool,
    }

    impl FaultyStorage {
        fn full() -> Self {
            Self {
                fail_put: true,
                ..Self::default()
            }
        }

        fn locked(generations: &[&str]) -> Self {
            let mut inner = MemoryStorage::new();
            for name in generations {
                inner.commit_generation(name, &[]).unwrap();
            }
            Self {
                inner,
                fail_delete: true,
                ..Self::default()
            }
        }
    }

    impl CacheStorage for FaultyStorage {
        fn generations(&self) -> Result<Vec<String>, StoreError> {
            self.inner.generations()
        }
        fn has(&self, generation: &str) -> Result<bool, StoreError> {
            self.inner.has(generation)
        }
        fn lookup(
            &self,
            generation: &str,
            url: &str,
        ) -> Result<Option<CachedResponse>, StoreError> {
            self.inner.lookup(generation, url)
        }
        fn put(&mut self, generation: &str, record: &CachedResponse) -> Result<(), StoreError> {
            if self.fail_put {
                return Err(StoreError::Io(std::io::Error::other("quota exceeded")));
            }
            self.inner.put(generation, record)
        }
        fn commit_generation(
            &mut self,
            generation: &str,
            records: &[CachedResponse],
        ) -> Result<(), StoreError> {
            self.inner.commit_generation(generation, records)
        }
        fn delete(&mut self, generation: &str) -> Result<bool, StoreError> {
            if self.fail_delete {
                return Err(StoreError::Io(std::io::Error::other("directory busy")));
            }
            self.inner.delete(generation)
        }
    }

    fn config(generation: &str) -> CacheConfig {
        CacheConfig {
            generation: generation.to_string(),
            manifest: vec![url(CSS), url(JS)],
        }
    }

    fn fetcher() -> MockFetcher {
        MockFetcher::default()
            .with(ok(CSS, "body{}", ResponseType::Cors))
            .with(ok(JS, "run()", ResponseType::Cors))
    }

    async fn activated<S: CacheStorage>(storage: S) -> ResourceCache<MockFetcher, S> {
        let cache = ResourceCache::new(config("v2"), fetcher(), storage);
        cache.install().await.unwrap();
        cache.activate().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = activated(MemoryStorage::new()).await;
        let calls_after_install = cache.fetcher.calls();

        let response = cache.handle(&Request::get(url(CSS))).await;

        assert!(response.from_cache);
        assert_eq!(response.body, b"body{}");
        assert_eq!(cache.fetcher.calls(), calls_after_install);
    }

    #[tokio::test]
    async fn test_resolve_reports_hit() {
        let cache = activated(MemoryStorage::new()).await;
        let decision = cache.resolve(&Request::get(url(JS))).await;
        assert!(matches!(decision, FetchDecision::CacheHit(ref r) if r.body == b"run()"));
    }

    #[tokio::test]
    async fn test_install_failure_is_atomic() {
        let mut storage = MemoryStorage::new();
        storage
            .commit_generation("v1", &[CachedResponse::snapshot(&ok(CSS, "old", ResponseType::Cors))])
            .unwrap();

        // JS is missing from the routes and answers 404
        let fetcher = MockFetcher::default().with(ok(CSS, "new", ResponseType::Cors));
        let cache = ResourceCache::new(config("v2"), fetcher, storage);

        let err = cache.install().await.unwrap_err();
        assert!(matches!(err, CacheError::InstallFailed { ref url, .. } if url == JS));
        assert_eq!(cache.state().await, WorkerState::Redundant);
        assert_eq!(cache.generations().await.unwrap(), vec!["v1".to_string()]);

        let old = cache.storage.read().await.lookup("v1", CSS).unwrap().unwrap();
        assert_eq!(old.body, b"old");

        assert!(matches!(cache.activate().await, Err(CacheError::State(_))));
    }

    #[tokio::test]
    async fn test_install_fails_when_offline() {
        let fetcher = fetcher();
        fetcher.offline.store(true, Ordering::SeqCst);
        let cache = ResourceCache::new(config("v2"), fetcher, MemoryStorage::new());

        assert!(cache.install().await.is_err());
        assert!(cache.generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activation_removes_stale_generations() {
        let mut storage = MemoryStorage::new();
        storage.commit_generation("v0", &[]).unwrap();
        storage.commit_generation("v1", &[]).unwrap();

        let cache = ResourceCache::new(config("v2"), fetcher(), storage);
        cache.install().await.unwrap();
        let report = cache.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["v0".to_string(), "v1".to_string()]);
        assert_eq!(cache.generations().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let cache = activated(MemoryStorage::new()).await;
        let before = cache.generations().await.unwrap();

        let report = cache.activate().await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(cache.generations().await.unwrap(), before);
        assert_eq!(cache.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_before_install_fails() {
        let cache = ResourceCache::new(config("v2"), fetcher(), MemoryStorage::new());
        assert!(matches!(cache.activate().await, Err(CacheError::State(_))));
    }

    #[tokio::test]
    async fn test_activation_claims_clients() {
        let cache = ResourceCache::new(config("v2"), fetcher(), MemoryStorage::new());
        cache.register_client("window-1").await;
        assert!(!cache.is_controlled("window-1").await);

        cache.install().await.unwrap();
        let report = cache.activate().await.unwrap();

        assert_eq!(report.claimed, 1);
        assert!(cache.is_controlled("window-1").await);

        cache.register_client("window-2").await;
        assert!(cache.is_controlled("window-2").await);
    }

    #[tokio::test]
    async fn test_offline_fallback() {
        let cache = activated(MemoryStorage::new()).await;
        cache.fetcher.offline.store(true, Ordering::SeqCst);

        let response = cache
            .handle(&Request::get(url("https://diagrams.example/svg/abc")))
            .await;

        assert_eq!(response.status, 503);
        assert!(!response.body.is_empty());
        assert!(response.header("content-type").unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_store_on_read() {
        let diagram = "https://diagrams.example/svg/abc";
        let cache = ResourceCache::new(
            config("v2"),
            fetcher().with(ok(diagram, "<svg/>", ResponseType::Cors)),
            MemoryStorage::new(),
        );
        cache.install().await.unwrap();
        cache.activate().await.unwrap();

        let first = cache.handle(&Request::get(url(diagram))).await;
        assert!(!first.from_cache);

        cache.fetcher.offline.store(true, Ordering::SeqCst);
        let second = cache.handle(&Request::get(url(diagram))).await;
        assert!(second.from_cache);
        assert_eq!(second.body, b"<svg/>");
    }

    #[tokio::test]
    async fn test_opaque_and_error_responses_are_not_stored() {
        let opaque = "https://tracker.example/pixel";
        let cache = ResourceCache::new(
            config("v2"),
            fetcher().with(ok(opaque, "gif", ResponseType::Opaque)),
            MemoryStorage::new(),
        );
        cache.install().await.unwrap();
        cache.activate().await.unwrap();

        let decision = cache.resolve(&Request::get(url(opaque))).await;
        assert!(matches!(decision, FetchDecision::Network { should_store: false, .. }));

        let missing = Request::get(url("https://cdn.example/missing.css"));
        let response = cache.handle(&missing).await;
        assert_eq!(response.status, 404);
        assert!(cache
            .storage
            .read()
            .await
            .lookup("v2", missing.key())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_non_get_is_never_stored() {
        let cache = activated(MemoryStorage::new()).await;
        let request = Request {
            url: url("https://cdn.example/style.css"),
            method: Method::POST,
        };

        let decision = cache.resolve(&request).await;
        assert!(matches!(decision, FetchDecision::Network { should_store: false, .. }));
    }

    #[tokio::test]
    async fn test_store_failure_still_returns_response() {
        let diagram = "https://diagrams.example/svg/abc";
        let cache = ResourceCache::new(
            config("v2"),
            fetcher().with(ok(diagram, "<svg/>", ResponseType::Cors)),
            FaultyStorage::full(),
        );
        cache.install().await.unwrap();
        cache.activate().await.unwrap();

        let response = cache.handle(&Request::get(url(diagram))).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<svg/>");
    }

    #[tokio::test]
    async fn test_uncontrolled_requests_bypass_cache() {
        let cache = ResourceCache::new(config("v2"), fetcher(), MemoryStorage::new());
        cache.install().await.unwrap();

        let decision = cache.resolve(&Request::get(url(CSS))).await;
        assert!(matches!(decision, FetchDecision::Network { should_store: false, .. }));
    }

    #[tokio::test]
    async fn test_ensure_installed_reuses_existing_generation() {
        let mut storage = MemoryStorage::new();
        storage.commit_generation("v2", &[]).unwrap();
        let cache = ResourceCache::new(config("v2"), fetcher(), storage);

        cache.ensure_installed().await.unwrap();

        assert_eq!(cache.fetcher.calls(), 0);
        assert_eq!(cache.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_stored_generation_serves_offline_after_relaunch() {
        let diagram = "https://diagrams.example/svg/abc";
        let mut storage = MemoryStorage::new();
        storage
            .commit_generation("v2", &[CachedResponse::snapshot(&ok(diagram, "<svg/>", ResponseType::Cors))])
            .unwrap();
        storage.commit_generation("v1", &[]).unwrap();

        let fetcher = fetcher();
        fetcher.offline.store(true, Ordering::SeqCst);
        let cache = ResourceCache::new(config("v2"), fetcher, storage);
        cache.register_client("window-1").await;

        cache.ensure_installed().await.unwrap();
        let response = cache.handle(&Request::get(url(diagram))).await;

        assert_eq!(response.status, 200);
        assert!(response.from_cache);
        assert_eq!(response.body, b"<svg/>");
        assert!(cache.is_controlled("window-1").await);
        assert_eq!(cache.generations().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_reports_undeletable_generations() {
        let cache = ResourceCache::new(config("v2"), fetcher(), FaultyStorage::locked(&["v0", "v1"]));
        cache.install().await.unwrap();

        let report = cache.activate().await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.failed, vec!["v0".to_string(), "v1".to_string()]);
        assert_eq!(cache.state().await, WorkerState::Activated);
    }
}
