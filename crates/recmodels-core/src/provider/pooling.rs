//! Keyed pool of model instances backed by shared archive handles.
//!
//! All bookkeeping lives in one [`PoolState`] behind a single mutex: the open
//! archives, the idle instances per key and the borrowed reverse map change
//! together in one critical section. Archive opening and model loading run
//! outside the lock against a reserved slot.

use super::archive::ModelArchive;
use super::loader::ModelLoader;
use super::settings::{ExhaustedAction, PoolSettings, PoolStats};
use super::{ArchiveInstallListener, ModelProvider, PoolKey};
use crate::coordinates::ModelCoordinate;
use crate::error::{ModelsError, Result};
use crate::repository::ModelArchiveRepository;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// An open archive and the number of pooled instances built from it.
///
/// A handle is closed as soon as `users` drops to zero. After an install
/// event it is retired: no new models come from it, but it stays open until
/// its borrowed models are returned.
struct OpenArchive {
    coordinate: ModelCoordinate,
    archive: Arc<Mutex<ModelArchive>>,
    users: usize,
}

struct IdleModel<M> {
    model: Arc<M>,
    since: Instant,
    generation: u64,
}

struct BorrowedModel<K, M> {
    key: K,
    generation: u64,
    // Held so the address stays unique while borrowed.
    _model: Arc<M>,
}

struct PoolState<K, M> {
    closed: bool,
    /// Archive handles by generation. Each open creates a new generation.
    archives: HashMap<u64, OpenArchive>,
    /// Generation new models for a coordinate are built from.
    current: HashMap<ModelCoordinate, u64>,
    /// Bumped on every install event, so an archive opened concurrently with
    /// an install is not mistaken for the fresh one.
    install_epochs: HashMap<ModelCoordinate, u64>,
    idle: HashMap<K, VecDeque<IdleModel<M>>>,
    borrowed: HashMap<usize, BorrowedModel<K, M>>,
    /// Idle, borrowed and in-construction instances per key.
    per_key: HashMap<K, usize>,
    total: usize,
    next_generation: u64,
    archive_opens: u64,
}

fn address<M>(model: &Arc<M>) -> usize {
    Arc::as_ptr(model) as usize
}

fn poisoned() -> ModelsError {
    ModelsError::Other("Model pool lock poisoned".to_string())
}

impl<K: PoolKey, M> PoolState<K, M> {
    fn new() -> Self {
        Self {
            closed: false,
            archives: HashMap::new(),
            current: HashMap::new(),
            install_epochs: HashMap::new(),
            idle: HashMap::new(),
            borrowed: HashMap::new(),
            per_key: HashMap::new(),
            total: 0,
            next_generation: 0,
            archive_opens: 0,
        }
    }

    fn install_epoch(&self, mc: &ModelCoordinate) -> u64 {
        self.install_epochs.get(mc).copied().unwrap_or(0)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.archives
            .get(&generation)
            .is_some_and(|open| self.current.get(&open.coordinate) == Some(&generation))
    }

    fn idle_count(&self, key: &K) -> usize {
        self.idle.get(key).map_or(0, VecDeque::len)
    }

    fn reserve(&mut self, key: &K) {
        self.total += 1;
        *self.per_key.entry(key.clone()).or_insert(0) += 1;
    }

    fn release_slot(&mut self, key: &K) {
        self.total = self.total.saturating_sub(1);
        if let Some(count) = self.per_key.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_key.remove(key);
            }
        }
    }

    /// Drop one user of `generation`, closing the handle when it was the last.
    fn detach(&mut self, generation: u64) {
        let Some(open) = self.archives.get_mut(&generation) else {
            return;
        };
        open.users = open.users.saturating_sub(1);
        if open.users > 0 {
            return;
        }
        if let Some(open) = self.archives.remove(&generation) {
            if self.current.get(&open.coordinate) == Some(&generation) {
                self.current.remove(&open.coordinate);
            }
            debug!("Closed model archive {}", open.coordinate);
        }
    }

    fn destroy(&mut self, key: &K, generation: u64) {
        self.release_slot(key);
        self.detach(generation);
    }

    /// Reuse an idle instance of `key` built from the current archive of `mc`.
    /// Idle instances of `key` from any other archive are destroyed.
    fn take_idle(&mut self, key: &K, mc: &ModelCoordinate) -> Option<(Arc<M>, u64)> {
        let wanted = self.current.get(mc).copied();
        let mut queue = self.idle.remove(key)?;

        let mut stale = Vec::new();
        queue.retain(|idle| {
            let keep = Some(idle.generation) == wanted;
            if !keep {
                stale.push(idle.generation);
            }
            keep
        });
        for generation in stale {
            self.destroy(key, generation);
        }

        // Most recently returned first.
        let taken = queue.pop_back().map(|idle| (idle.model, idle.generation));
        if !queue.is_empty() {
            self.idle.insert(key.clone(), queue);
        }
        taken
    }

    fn evict_oldest_idle(&mut self) -> bool {
        let oldest = self
            .idle
            .iter()
            .filter_map(|(key, queue)| queue.front().map(|idle| (key.clone(), idle.since)))
            .min_by_key(|(_, since)| *since);
        let Some((key, _)) = oldest else {
            return false;
        };
        let Some(evicted) = self.idle.get_mut(&key).and_then(VecDeque::pop_front) else {
            return false;
        };
        if self.idle_count(&key) == 0 {
            self.idle.remove(&key);
        }
        self.destroy(&key, evicted.generation);
        true
    }

    fn has_capacity(&mut self, key: &K, settings: &PoolSettings) -> bool {
        let for_key = self.per_key.get(key).copied().unwrap_or(0);
        if for_key >= settings.max_total_per_key {
            return false;
        }
        self.total < settings.max_total || self.evict_oldest_idle()
    }

    fn evict_expired(&mut self, min_idle_time: Duration, now: Instant) -> usize {
        let mut expired = Vec::new();
        for (key, queue) in self.idle.iter_mut() {
            queue.retain(|idle| {
                let keep = now.duration_since(idle.since) < min_idle_time;
                if !keep {
                    expired.push((key.clone(), idle.generation));
                }
                keep
            });
        }
        self.idle.retain(|_, queue| !queue.is_empty());
        for (key, generation) in &expired {
            self.destroy(key, *generation);
        }
        expired.len()
    }

    fn invalidate(&mut self, mc: &ModelCoordinate) -> usize {
        *self.install_epochs.entry(mc.clone()).or_insert(0) += 1;
        let Some(generation) = self.current.remove(mc) else {
            return 0;
        };

        let mut dropped = Vec::new();
        for (key, queue) in self.idle.iter_mut() {
            queue.retain(|idle| {
                let keep = idle.generation != generation;
                if !keep {
                    dropped.push(key.clone());
                }
                keep
            });
        }
        self.idle.retain(|_, queue| !queue.is_empty());
        for key in &dropped {
            self.destroy(key, generation);
        }
        if let Some(open) = self.archives.get(&generation) {
            debug!(
                "Retired archive {} stays open for {} borrowed models",
                mc, open.users
            );
        }
        dropped.len()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.borrowed.len(),
            idle: self.idle.values().map(VecDeque::len).sum(),
            open_archives: self.archives.len(),
            archive_opens: self.archive_opens,
        }
    }
}

struct PoolCore<K, M> {
    repository: Arc<dyn ModelArchiveRepository>,
    model_type: String,
    loader: Arc<dyn ModelLoader<K, M>>,
    settings: PoolSettings,
    state: Mutex<PoolState<K, M>>,
    available: Condvar,
}

impl<K: PoolKey, M: Send + Sync + 'static> PoolCore<K, M> {
    fn lock(&self) -> Result<MutexGuard<'_, PoolState<K, M>>> {
        self.state.lock().map_err(|_| poisoned())
    }

    fn acquire(&self, key: &K) -> Result<Option<Arc<M>>> {
        let Some(mc) = self
            .repository
            .find_best_model_archive(key.base(), &self.model_type)
        else {
            debug!("No {} archive known for {}", self.model_type, key.base());
            return Ok(None);
        };
        let Some(path) = self.repository.get_location(&mc, true) else {
            debug!("{} is not available locally yet", mc);
            return Ok(None);
        };

        if let Some(model) = self.borrow_or_reserve(key, &mc)? {
            return Ok(Some(model));
        }

        let (generation, archive) = match self.attach_archive(&mc, &path) {
            Ok(attached) => attached,
            Err(e) => {
                let mut state = self.lock()?;
                state.release_slot(key);
                self.available.notify_all();
                return Err(e);
            }
        };

        let loaded = match archive.lock() {
            Ok(mut archive) => self.loader.load_model(&mut archive, key),
            Err(_) => Err(ModelsError::archive(
                path.as_path(),
                "archive lock poisoned",
            )),
        };

        let mut state = self.lock()?;
        match loaded {
            Ok(Some(model)) if !state.closed => {
                let model = Arc::new(model);
                state.borrowed.insert(
                    address(&model),
                    BorrowedModel {
                        key: key.clone(),
                        generation,
                        _model: model.clone(),
                    },
                );
                debug!("Created {} model for {}", self.model_type, key);
                Ok(Some(model))
            }
            other => {
                state.destroy(key, generation);
                self.available.notify_all();
                match other {
                    Ok(Some(_)) => Ok(None),
                    Ok(None) => {
                        debug!("{} has no {} model for {}", mc, self.model_type, key);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Hand out an idle instance, or reserve a slot for a new one (`Ok(None)`).
    fn borrow_or_reserve(&self, key: &K, mc: &ModelCoordinate) -> Result<Option<Arc<M>>> {
        let deadline = match self.settings.when_exhausted {
            ExhaustedAction::Fail => None,
            ExhaustedAction::Block(wait) => Some(Instant::now() + wait),
        };

        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(ModelsError::Other("Model pool is closed".to_string()));
            }
            if let Some((model, generation)) = state.take_idle(key, mc) {
                state.borrowed.insert(
                    address(&model),
                    BorrowedModel {
                        key: key.clone(),
                        generation,
                        _model: model.clone(),
                    },
                );
                return Ok(Some(model));
            }
            if state.has_capacity(key, &self.settings) {
                state.reserve(key);
                return Ok(None);
            }

            let exhausted = || ModelsError::PoolExhausted {
                key: key.to_string(),
            };
            let Some(deadline) = deadline else {
                return Err(exhausted());
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(exhausted());
            }
            state = self
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|_| poisoned())?
                .0;
        }
    }

    /// Register one more user on the current archive of `mc`, opening it if
    /// needed. The file is opened without holding the pool lock.
    fn attach_archive(
        &self,
        mc: &ModelCoordinate,
        path: &Path,
    ) -> Result<(u64, Arc<Mutex<ModelArchive>>)> {
        loop {
            let epoch = {
                let mut state = self.lock()?;
                if let Some(generation) = state.current.get(mc).copied() {
                    if let Some(open) = state.archives.get_mut(&generation) {
                        open.users += 1;
                        return Ok((generation, open.archive.clone()));
                    }
                }
                state.install_epoch(mc)
            };

            let opened = ModelArchive::open(path, mc.clone())?;

            let mut state = self.lock()?;
            state.archive_opens += 1;
            if state.install_epoch(mc) != epoch {
                debug!("{} was replaced while opening, reopening", mc);
                continue;
            }
            if let Some(generation) = state.current.get(mc).copied() {
                if let Some(open) = state.archives.get_mut(&generation) {
                    open.users += 1;
                    return Ok((generation, open.archive.clone()));
                }
            }

            let generation = state.next_generation;
            state.next_generation += 1;
            let archive = Arc::new(Mutex::new(opened));
            state.archives.insert(
                generation,
                OpenArchive {
                    coordinate: mc.clone(),
                    archive: archive.clone(),
                    users: 1,
                },
            );
            state.current.insert(mc.clone(), generation);
            debug!("Opened model archive {}", path.display());
            return Ok((generation, archive));
        }
    }

    fn release(&self, model: Arc<M>) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                error!("Cannot release model: {}", e);
                return;
            }
        };
        let Some(borrowed) = state.borrowed.remove(&address(&model)) else {
            warn!("Released a {} model this pool did not hand out", self.model_type);
            return;
        };

        let keep = !state.closed
            && state.is_current(borrowed.generation)
            && state.idle_count(&borrowed.key) < self.settings.max_idle_per_key;
        if keep {
            state
                .idle
                .entry(borrowed.key)
                .or_default()
                .push_back(IdleModel {
                    model,
                    since: Instant::now(),
                    generation: borrowed.generation,
                });
        } else {
            state.destroy(&borrowed.key, borrowed.generation);
        }
        self.available.notify_all();
    }

    fn evict_idle(&self) -> usize {
        let evicted = match self.lock() {
            Ok(mut state) => state.evict_expired(self.settings.min_idle_time, Instant::now()),
            Err(e) => {
                error!("Idle eviction skipped: {}", e);
                return 0;
            }
        };
        if evicted > 0 {
            debug!("Evicted {} idle {} models", evicted, self.model_type);
            self.available.notify_all();
        }
        evicted
    }
}

/// Background thread that periodically destroys long-idle instances.
struct Evictor {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl Evictor {
    fn start<K: PoolKey, M: Send + Sync + 'static>(
        core: Weak<PoolCore<K, M>>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("model-pool-evictor".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(core) = core.upgrade() else {
                            break;
                        };
                        core.evict_idle();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| ModelsError::Other(format!("Failed to start pool evictor: {}", e)))?;
        Ok(Self { stop, thread })
    }

    fn stop(self) -> Result<()> {
        let _ = self.stop.send(());
        self.thread
            .join()
            .map_err(|_| ModelsError::Other("Pool evictor thread panicked".to_string()))
    }
}

/// [`ModelProvider`] that pools model instances per key.
///
/// A key is served by the archive the repository suggests for its base
/// project. Acquiring never waits for a download: a missing archive is
/// scheduled for download and the call returns `None`.
pub struct PoolingModelProvider<K, M> {
    core: Arc<PoolCore<K, M>>,
    evictor: Mutex<Option<Evictor>>,
}

impl<K: PoolKey, M: Send + Sync + 'static> PoolingModelProvider<K, M> {
    pub fn new(
        repository: Arc<dyn ModelArchiveRepository>,
        model_type: impl Into<String>,
        loader: Arc<dyn ModelLoader<K, M>>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            core: Arc::new(PoolCore {
                repository,
                model_type: model_type.into(),
                loader,
                settings,
                state: Mutex::new(PoolState::new()),
                available: Condvar::new(),
            }),
            evictor: Mutex::new(None),
        }
    }

    pub fn model_type(&self) -> &str {
        &self.core.model_type
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.core.settings
    }

    /// Like [`ModelProvider::acquire_model`] but reports why no model was returned.
    pub fn acquire(&self, key: &K) -> Result<Option<Arc<M>>> {
        self.core.acquire(key)
    }

    /// Destroy idle instances older than the configured idle time.
    pub fn evict_idle(&self) -> usize {
        self.core.evict_idle()
    }

    /// Current counters. Takes the pool lock briefly.
    pub fn stats(&self) -> PoolStats {
        self.core
            .lock()
            .map(|state| state.stats())
            .unwrap_or_default()
    }
}

impl<K: PoolKey, M: Send + Sync + 'static> ModelProvider<K, M> for PoolingModelProvider<K, M> {
    fn acquire_model(&self, key: &K) -> Option<Arc<M>> {
        match self.core.acquire(key) {
            Ok(model) => model,
            Err(e) => {
                warn!(
                    "Could not acquire {} model for {}: {}",
                    self.core.model_type, key, e
                );
                None
            }
        }
    }

    fn release_model(&self, model: Arc<M>) {
        self.core.release(model);
    }

    fn open(&self) -> Result<()> {
        self.core.lock()?.closed = false;

        let mut evictor = self.evictor.lock().map_err(|_| poisoned())?;
        if evictor.is_none() && !self.core.settings.eviction_interval.is_zero() {
            *evictor = Some(Evictor::start(
                Arc::downgrade(&self.core),
                self.core.settings.eviction_interval,
            )?);
        }
        debug!("Opened {} model pool", self.core.model_type);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut errors = Vec::new();

        match self.evictor.lock() {
            Ok(mut evictor) => {
                if let Some(evictor) = evictor.take() {
                    if let Err(e) = evictor.stop() {
                        errors.push(e);
                    }
                }
            }
            Err(_) => errors.push(poisoned()),
        }

        let archives = match self.core.lock() {
            Ok(mut state) => {
                state.closed = true;
                let idle: Vec<(K, usize)> = state
                    .idle
                    .drain()
                    .map(|(key, queue)| (key, queue.len()))
                    .collect();
                for (key, count) in &idle {
                    for _ in 0..*count {
                        state.release_slot(key);
                    }
                }
                state.current.clear();
                state.archives.drain().map(|(_, open)| open).collect()
            }
            Err(_) => {
                errors.push(poisoned());
                Vec::new()
            }
        };
        self.core.available.notify_all();

        for open in archives {
            match Arc::try_unwrap(open.archive) {
                Ok(archive) => drop(archive),
                Err(shared) => {
                    let path = shared
                        .lock()
                        .map(|archive| archive.path().to_path_buf())
                        .unwrap_or_default();
                    errors.push(ModelsError::archive(
                        path,
                        format!("{} still in use while closing", open.coordinate),
                    ));
                }
            }
        }

        for e in &errors {
            error!("Error while closing {} model pool: {}", self.core.model_type, e);
        }
        info!("Closed {} model pool", self.core.model_type);
        errors.into_iter().next().map_or(Ok(()), Err)
    }
}

impl<K: PoolKey, M: Send + Sync + 'static> ArchiveInstallListener for PoolingModelProvider<K, M> {
    fn on_model_archive_installed(&self, mc: &ModelCoordinate) {
        match self.core.lock() {
            Ok(mut state) => {
                let dropped = state.invalidate(mc);
                if dropped > 0 {
                    info!("Dropped {} idle models of replaced archive {}", dropped, mc);
                }
            }
            Err(e) => error!("Cannot invalidate {}: {}", mc, e),
        }
        self.core.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::{ProjectCoordinate, TypeName, UniqueTypeName};
    use crate::provider::archive::test_support::write_archive;
    use crate::provider::JsonModelLoader;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct CallModel {
        calls: Vec<String>,
    }

    /// Repository that always suggests one archive and counts lookups.
    struct SpyRepository {
        coordinate: ModelCoordinate,
        path: PathBuf,
        locations: AtomicUsize,
    }

    #[async_trait]
    impl ModelArchiveRepository for SpyRepository {
        fn get_location(&self, _mc: &ModelCoordinate, _prefetch: bool) -> Option<PathBuf> {
            self.locations.fetch_add(1, Ordering::SeqCst);
            self.path.exists().then(|| self.path.clone())
        }

        async fn resolve(&self, mc: &ModelCoordinate, _force: bool) -> Result<PathBuf> {
            self.resolve_blocking(mc, false)
        }

        fn resolve_blocking(&self, mc: &ModelCoordinate, _force: bool) -> Result<PathBuf> {
            self.get_location(mc, false).ok_or_else(|| ModelsError::NotFound {
                coordinate: mc.to_string(),
            })
        }

        fn find_best_model_archive(
            &self,
            pc: &ProjectCoordinate,
            _model_type: &str,
        ) -> Option<ModelCoordinate> {
            (pc.group_id() == self.coordinate.group_id()).then(|| self.coordinate.clone())
        }
    }

    struct Fixture {
        _temp: TempDir,
        path: PathBuf,
        repository: Arc<SpyRepository>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lib-1.0.0-call.zip");
        write_archive(
            &path,
            &[
                ("org/example/List.json", r#"{"calls": ["add"]}"#),
                ("org/example/Map.json", r#"{"calls": ["put"]}"#),
            ],
        );
        let repository = Arc::new(SpyRepository {
            coordinate: ModelCoordinate::new("org.example", "lib", "call", "zip", "1.0.0"),
            path: path.clone(),
            locations: AtomicUsize::new(0),
        });
        Fixture {
            _temp: temp,
            path,
            repository,
        }
    }

    fn provider(f: &Fixture, settings: PoolSettings) -> PoolingModelProvider<UniqueTypeName, CallModel> {
        PoolingModelProvider::new(
            f.repository.clone(),
            "call",
            Arc::new(JsonModelLoader::<CallModel>::new()),
            settings,
        )
    }

    fn key(name: &str) -> UniqueTypeName {
        UniqueTypeName::new(
            ProjectCoordinate::new("org.example", "lib", "1.0.0"),
            TypeName::new(name).unwrap(),
        )
    }

    #[test]
    fn test_released_model_is_reused() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        let first = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        assert_eq!(first.calls, vec!["add".to_string()]);
        assert_eq!(pool.stats().active, 1);
        pool.release_model(first.clone());
        assert_eq!(pool.stats().idle, 1);

        let second = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.stats().archive_opens, 1);
    }

    #[test]
    fn test_unknown_project_and_missing_archive_yield_none() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        let foreign = UniqueTypeName::new(
            ProjectCoordinate::new("com.other", "lib", "1.0.0"),
            TypeName::new("Lcom/other/Thing").unwrap(),
        );
        assert!(pool.acquire_model(&foreign).is_none());

        std::fs::remove_file(&f.path).unwrap();
        assert!(pool.acquire_model(&key("Lorg/example/List")).is_none());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_missing_entry_frees_slot_and_archive() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        assert!(pool.acquire_model(&key("Lorg/example/Set")).is_none());
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.open_archives, 0);
    }

    #[test]
    fn test_exhausted_key_fails_fast() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        let held = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        assert!(matches!(
            pool.acquire(&key("Lorg/example/List")),
            Err(ModelsError::PoolExhausted { .. })
        ));
        // Other keys are unaffected.
        assert!(pool.acquire_model(&key("Lorg/example/Map")).is_some());
        pool.release_model(held);
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let f = fixture();
        let pool = Arc::new(provider(
            &f,
            PoolSettings::default()
                .with_when_exhausted(ExhaustedAction::Block(Duration::from_secs(5))),
        ));

        let held = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.acquire_model(&key("Lorg/example/List")))
        };
        std::thread::sleep(Duration::from_millis(100));
        pool.release_model(held.clone());

        let handed_over = waiter.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&held, &handed_over));
    }

    #[test]
    fn test_total_limit_evicts_idle_of_other_keys() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default().with_max_total(1));

        let list = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        assert!(pool.acquire_model(&key("Lorg/example/Map")).is_none());
        pool.release_model(list);

        let map = pool.acquire_model(&key("Lorg/example/Map")).unwrap();
        assert_eq!(map.calls, vec!["put".to_string()]);
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn test_concurrent_acquires_never_share_an_instance() {
        let f = fixture();
        let pool = Arc::new(provider(
            &f,
            PoolSettings::default()
                .with_max_total_per_key(2)
                .with_max_idle_per_key(2)
                .with_when_exhausted(ExhaustedAction::Block(Duration::from_secs(10))),
        ));
        let held: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let held = held.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let model = pool.acquire_model(&key("Lorg/example/List")).unwrap();
                        assert!(held.lock().unwrap().insert(address(&model)));
                        std::thread::yield_now();
                        assert!(held.lock().unwrap().remove(&address(&model)));
                        pool.release_model(model);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert!(stats.idle <= 2);
        assert_eq!(stats.open_archives, 1);
    }

    #[test]
    fn test_install_event_reopens_archive() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        let model = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.release_model(model);
        assert_eq!(pool.stats().open_archives, 1);

        pool.on_model_archive_installed(&f.repository.coordinate);
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.open_archives, 0);

        write_archive(&f.path, &[("org/example/List.json", r#"{"calls": ["clear"]}"#)]);
        let fresh = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        assert_eq!(fresh.calls, vec!["clear".to_string()]);
        assert_eq!(pool.stats().archive_opens, 2);
    }

    #[test]
    fn test_install_event_keeps_borrowed_archive_until_release() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());

        let borrowed = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.on_model_archive_installed(&f.repository.coordinate);
        assert_eq!(pool.stats().open_archives, 1);

        let other = pool.acquire_model(&key("Lorg/example/Map")).unwrap();
        assert_eq!(pool.stats().open_archives, 2);

        pool.release_model(borrowed);
        let stats = pool.stats();
        assert_eq!(stats.open_archives, 1);
        assert_eq!(stats.idle, 0);
        pool.release_model(other);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_unknown_release_is_ignored() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());
        pool.release_model(Arc::new(CallModel { calls: vec![] }));

        let model = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.release_model(model.clone());
        pool.release_model(model);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_evict_idle() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default().with_min_idle_time(Duration::ZERO));

        let model = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.release_model(model);
        assert_eq!(pool.evict_idle(), 1);
        assert_eq!(
            pool.stats(),
            PoolStats {
                archive_opens: 1,
                ..PoolStats::default()
            }
        );
    }

    #[test]
    fn test_background_evictor() {
        let f = fixture();
        let pool = provider(
            &f,
            PoolSettings::default()
                .with_eviction_interval(Duration::from_millis(20))
                .with_min_idle_time(Duration::ZERO),
        );
        pool.open().unwrap();

        let model = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.release_model(model);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.stats().idle > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.stats().idle, 0);
        pool.close().unwrap();
    }

    #[test]
    fn test_close_releases_everything() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());
        pool.open().unwrap();

        let list = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        let map = pool.acquire_model(&key("Lorg/example/Map")).unwrap();
        pool.release_model(map);

        pool.close().unwrap();
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.open_archives, 0);
        assert!(pool.acquire_model(&key("Lorg/example/Map")).is_none());

        // Returning a model after close is harmless.
        pool.release_model(list);
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_close_reports_archive_in_use_and_drains_the_rest() {
        let f = fixture();
        let pool = provider(&f, PoolSettings::default());
        pool.open().unwrap();

        // Two generations: the retired one stays open for the borrowed model.
        let list = pool.acquire_model(&key("Lorg/example/List")).unwrap();
        pool.on_model_archive_installed(&f.repository.coordinate);
        let map = pool.acquire_model(&key("Lorg/example/Map")).unwrap();
        pool.release_model(map);

        let (held, drained) = {
            let state = pool.core.lock().unwrap();
            let mut generations: Vec<u64> = state.archives.keys().copied().collect();
            generations.sort_unstable();
            assert_eq!(generations.len(), 2);
            (
                state.archives[&generations[0]].archive.clone(),
                Arc::downgrade(&state.archives[&generations[1]].archive),
            )
        };

        let err = pool.close().unwrap_err();
        assert!(
            matches!(&err, ModelsError::Archive { path, message }
                if path == &f.path && message.contains("still in use")),
            "unexpected error: {err}"
        );
        let stats = pool.stats();
        assert_eq!(stats.open_archives, 0);
        assert_eq!(stats.idle, 0);
        assert!(drained.upgrade().is_none());
        assert!(pool.evictor.lock().unwrap().is_none());

        drop(held);
        pool.release_model(list);
        assert_eq!(pool.stats().active, 0);
    }
}
