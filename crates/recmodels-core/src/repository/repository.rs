//! Local model repository backed by a remote artifact store.

use super::download::{artifact_url, DownloadManager};
use super::layout;
use super::transport::{transport_for, Transport};
use crate::cancel::CancellationToken;
use crate::config::{AuthSettings, ModelsSettings, NetworkConfig, ProxySettings, RepositoryConfig};
use crate::coordinates::{ModelCoordinate, ProjectCoordinate};
use crate::error::{ModelsError, Result};
use crate::index::ModelArchiveCoordinateAdvisor;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use mini_moka::sync::Cache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

/// Resolves model coordinates to local archive files.
#[async_trait]
pub trait ModelArchiveRepository: Send + Sync {
    /// The local file for `mc` if it is already present. Never blocks; with
    /// `prefetch` a missing archive is scheduled for background download.
    fn get_location(&self, mc: &ModelCoordinate, prefetch: bool) -> Option<PathBuf>;

    /// Wait until `mc` is available locally. `force` re-downloads even if a
    /// copy exists or a previous attempt failed.
    async fn resolve(&self, mc: &ModelCoordinate, force: bool) -> Result<PathBuf>;

    /// [`resolve`](Self::resolve) for synchronous callers. Must not be called
    /// from inside the repository's runtime.
    fn resolve_blocking(&self, mc: &ModelCoordinate, force: bool) -> Result<PathBuf>;

    fn find_best_model_archive(
        &self,
        pc: &ProjectCoordinate,
        model_type: &str,
    ) -> Option<ModelCoordinate>;
}

/// Notifications published by [`ModelRepository`].
///
/// Every transfer publishes `DownloadStarted` followed by either
/// `ModelArchiveInstalled` or `DownloadFailed`. Cancelled transfers end
/// silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    /// A transfer for the coordinate began.
    DownloadStarted(ModelCoordinate),
    /// `bytes` received so far, published at most once per
    /// [`NetworkConfig::PROGRESS_STEP_BYTES`].
    DownloadProgressed {
        coordinate: ModelCoordinate,
        bytes: u64,
    },
    /// The transfer failed, e.g. the remote has no such archive or the
    /// download did not match its checksum.
    DownloadFailed {
        coordinate: ModelCoordinate,
        error: String,
    },
    /// A new or updated archive was moved into place.
    ModelArchiveInstalled(ModelCoordinate),
}

type TransferResult = std::result::Result<PathBuf, Arc<ModelsError>>;
type InFlight = Shared<BoxFuture<'static, TransferResult>>;

struct Transfer {
    id: u64,
    forced: bool,
    future: InFlight,
}

struct Inner {
    repository_dir: PathBuf,
    remote: RwLock<Url>,
    settings: RwLock<ModelsSettings>,
    downloads: RwLock<DownloadManager>,
    transport_overridden: bool,
    advisor: RwLock<Option<Arc<dyn ModelArchiveCoordinateAdvisor>>>,
    in_flight: Mutex<HashMap<ModelCoordinate, Transfer>>,
    next_transfer: AtomicU64,
    failures: Cache<ModelCoordinate, Arc<ModelsError>>,
    workers: Arc<Semaphore>,
    handle: Handle,
    cancel: Mutex<CancellationToken>,
    events: broadcast::Sender<RepositoryEvent>,
}

/// Maven-layout repository under `repository_dir` that fetches missing
/// archives from the configured remote.
///
/// Transfers run on `handle`, at most `download_workers` at a time. Concurrent
/// requests for one coordinate share a single transfer. Failed resolutions
/// are remembered for [`RepositoryConfig::NEGATIVE_CACHE_TTL`].
#[derive(Clone)]
pub struct ModelRepository {
    inner: Arc<Inner>,
}

fn poisoned() -> ModelsError {
    ModelsError::Other("Repository lock poisoned".to_string())
}

fn parse_remote(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ModelsError::Config {
        message: format!("Invalid remote URL {}: {}", raw, e),
    })
}

impl ModelRepository {
    /// Repository whose transport is chosen from the remote URL scheme.
    pub fn new(
        repository_dir: impl Into<PathBuf>,
        settings: ModelsSettings,
        handle: Handle,
    ) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::from(transport_for(&settings)?);
        Self::build(repository_dir.into(), settings, transport, false, handle)
    }

    /// Repository with a caller-supplied transport. Proxy and credential
    /// changes are recorded but do not replace the transport.
    pub fn with_transport(
        repository_dir: impl Into<PathBuf>,
        settings: ModelsSettings,
        transport: Arc<dyn Transport>,
        handle: Handle,
    ) -> Result<Self> {
        Self::build(repository_dir.into(), settings, transport, true, handle)
    }

    fn build(
        repository_dir: PathBuf,
        settings: ModelsSettings,
        transport: Arc<dyn Transport>,
        transport_overridden: bool,
        handle: Handle,
    ) -> Result<Self> {
        let remote = parse_remote(&settings.remote_url)?;
        let (events, _) = broadcast::channel(RepositoryConfig::EVENT_CHANNEL_CAPACITY);
        let failures = Cache::builder()
            .max_capacity(RepositoryConfig::NEGATIVE_CACHE_CAPACITY)
            .time_to_live(RepositoryConfig::NEGATIVE_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(Inner {
                repository_dir,
                remote: RwLock::new(remote),
                downloads: RwLock::new(DownloadManager::new(transport, settings.verify_checksums)),
                workers: Arc::new(Semaphore::new(settings.download_workers.max(1))),
                settings: RwLock::new(settings),
                transport_overridden,
                advisor: RwLock::new(None),
                in_flight: Mutex::new(HashMap::new()),
                next_transfer: AtomicU64::new(0),
                failures,
                handle,
                cancel: Mutex::new(CancellationToken::new()),
                events,
            }),
        })
    }

    pub fn repository_dir(&self) -> &Path {
        &self.inner.repository_dir
    }

    /// Where `mc` lives in the local repository, whether present or not.
    pub fn local_path(&self, mc: &ModelCoordinate) -> PathBuf {
        layout::local_path(&self.inner.repository_dir, mc)
    }

    pub fn remote_url(&self) -> Option<Url> {
        self.inner.remote.read().ok().map(|url| url.clone())
    }

    /// Index consulted by [`find_best_model_archive`](ModelArchiveRepository::find_best_model_archive).
    pub fn set_advisor(&self, advisor: Arc<dyn ModelArchiveCoordinateAdvisor>) {
        if let Ok(mut guard) = self.inner.advisor.write() {
            *guard = Some(advisor);
        }
    }

    /// Route later transfers through `proxy`. Running transfers keep their
    /// transport.
    pub fn set_proxy(&self, proxy: ProxySettings) -> Result<()> {
        self.update_settings(|settings| settings.proxy = Some(proxy))
    }

    pub fn unset_proxy(&self) -> Result<()> {
        self.update_settings(|settings| settings.proxy = None)
    }

    /// Replace the remote credentials. `None` removes them.
    pub fn set_authentication(&self, auth: Option<AuthSettings>) -> Result<()> {
        self.update_settings(|settings| settings.auth = auth)
    }

    fn update_settings(&self, change: impl FnOnce(&mut ModelsSettings)) -> Result<()> {
        let settings = {
            let mut guard = self.inner.settings.write().map_err(|_| poisoned())?;
            change(&mut guard);
            guard.clone()
        };
        if self.inner.transport_overridden {
            debug!("Transport overridden, keeping it after settings change");
            return Ok(());
        }

        let transport: Arc<dyn Transport> = Arc::from(transport_for(&settings)?);
        let mut downloads = self.inner.downloads.write().map_err(|_| poisoned())?;
        *downloads = DownloadManager::new(transport, settings.verify_checksums);
        debug!("Rebuilt transport for {}", settings.remote_url);
        Ok(())
    }

    /// Receive [`RepositoryEvent`]s for transfers from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel every queued and running transfer. Later requests start fresh.
    pub fn cancel_downloads(&self) {
        if let Ok(mut token) = self.inner.cancel.lock() {
            token.cancel();
            *token = CancellationToken::new();
            info!("Cancelled pending model downloads");
        }
    }

    /// Number of coordinates with a transfer queued or running.
    pub fn pending_downloads(&self) -> usize {
        self.inner.in_flight.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Every archive present in the local repository, sorted by path.
    pub fn local_archives(&self) -> Vec<PathBuf> {
        let mut archives: Vec<PathBuf> = walkdir::WalkDir::new(&self.inner.repository_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !layout::is_auxiliary_file(path))
            .collect();
        archives.sort();
        archives
    }

    /// Join the transfer for `mc`, starting one if none is running.
    ///
    /// A forced request never joins a plain one: it waits for it to finish
    /// and then fetches again.
    fn schedule(&self, mc: &ModelCoordinate, force: bool) -> Result<InFlight> {
        let mut in_flight = self.inner.in_flight.lock().map_err(|_| poisoned())?;
        let previous = match in_flight.get(mc) {
            Some(existing) if existing.forced || !force => {
                debug!("Joining in-flight download of {}", mc);
                return Ok(existing.future.clone());
            }
            Some(existing) => {
                debug!("Queueing forced download of {} behind a running one", mc);
                Some(existing.future.clone())
            }
            None => None,
        };

        let id = self.inner.next_transfer.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let coordinate = mc.clone();
        let task = self.inner.handle.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = inner.install(&coordinate, force).await.map_err(Arc::new);
            if let Err(e) = &result {
                if !matches!(**e, ModelsError::DownloadCancelled) {
                    inner.failures.insert(coordinate.clone(), e.clone());
                }
            }
            if let Ok(mut map) = inner.in_flight.lock() {
                if map.get(&coordinate).is_some_and(|entry| entry.id == id) {
                    map.remove(&coordinate);
                }
            }
            result
        });

        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(ModelsError::Other(format!(
                    "Download task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();
        in_flight.insert(
            mc.clone(),
            Transfer {
                id,
                forced: force,
                future: shared.clone(),
            },
        );
        Ok(shared)
    }
}

impl Inner {
    fn current_cancel(&self) -> CancellationToken {
        self.cancel
            .lock()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    async fn install(&self, mc: &ModelCoordinate, force: bool) -> Result<PathBuf> {
        let cancel = self.current_cancel();
        let _permit = tokio::select! {
            permit = self.workers.clone().acquire_owned() => {
                permit.map_err(|_| ModelsError::DownloadCancelled)?
            }
            _ = cancel.cancelled() => return Err(ModelsError::DownloadCancelled),
        };

        let dest = layout::local_path(&self.repository_dir, mc);
        if !force && dest.exists() {
            return Ok(dest);
        }

        self.publish(RepositoryEvent::DownloadStarted(mc.clone()));
        match self.transfer(mc, &dest, &cancel).await {
            Ok(bytes) => {
                self.failures.invalidate(mc);
                info!("Installed {} ({} bytes)", mc, bytes);
                self.publish(RepositoryEvent::ModelArchiveInstalled(mc.clone()));
                Ok(dest)
            }
            Err(ModelsError::DownloadCancelled) => {
                debug!("Download of {} cancelled", mc);
                Err(ModelsError::DownloadCancelled)
            }
            Err(e) => {
                warn!("Failed to download {}: {}", mc, e);
                self.publish(RepositoryEvent::DownloadFailed {
                    coordinate: mc.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        mc: &ModelCoordinate,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let remote = self.remote.read().map_err(|_| poisoned())?.clone();
        let url = artifact_url(&remote, &layout::relative_url(mc))?;
        let downloads = self.downloads.read().map_err(|_| poisoned())?.clone();

        debug!("Downloading {} from {}", mc, url);
        let reported = AtomicU64::new(0);
        let progress = |bytes: u64| {
            let last = reported.load(Ordering::Relaxed);
            if bytes >= last + NetworkConfig::PROGRESS_STEP_BYTES {
                reported.store(bytes, Ordering::Relaxed);
                self.publish(RepositoryEvent::DownloadProgressed {
                    coordinate: mc.clone(),
                    bytes,
                });
            }
        };
        downloads
            .download_with_progress(&url, dest, cancel, &progress)
            .await
    }

    fn publish(&self, event: RepositoryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ModelArchiveRepository for ModelRepository {
    fn get_location(&self, mc: &ModelCoordinate, prefetch: bool) -> Option<PathBuf> {
        let path = self.local_path(mc);
        if path.exists() {
            return Some(path);
        }
        if prefetch && self.inner.failures.get(mc).is_none() {
            if let Err(e) = self.schedule(mc, false) {
                warn!("Could not schedule download of {}: {}", mc, e);
            }
        }
        None
    }

    async fn resolve(&self, mc: &ModelCoordinate, force: bool) -> Result<PathBuf> {
        if force {
            self.inner.failures.invalidate(mc);
        } else {
            if let Some(previous) = self.inner.failures.get(mc) {
                debug!("{} failed recently, not retrying", mc);
                return Err(ModelsError::Shared(previous));
            }
            let path = self.local_path(mc);
            if path.exists() {
                return Ok(path);
            }
        }
        self.schedule(mc, force)?
            .await
            .map_err(ModelsError::Shared)
    }

    fn resolve_blocking(&self, mc: &ModelCoordinate, force: bool) -> Result<PathBuf> {
        let (tx, rx) = std::sync::mpsc::channel();
        let repository = self.clone();
        let coordinate = mc.clone();
        self.inner.handle.spawn(async move {
            let _ = tx.send(repository.resolve(&coordinate, force).await);
        });

        match rx.recv_timeout(RepositoryConfig::BLOCKING_RESOLVE_TIMEOUT) {
            Ok(result) => result,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                warn!("Timed out waiting for {}", mc);
                Err(ModelsError::Timeout(RepositoryConfig::BLOCKING_RESOLVE_TIMEOUT))
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(ModelsError::ResolutionFailed {
                coordinate: mc.to_string(),
                message: "resolve task ended without a result".to_string(),
            }),
        }
    }

    fn find_best_model_archive(
        &self,
        pc: &ProjectCoordinate,
        model_type: &str,
    ) -> Option<ModelCoordinate> {
        let advisor = self.inner.advisor.read().ok()?.clone()?;
        advisor.suggest(pc, model_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::transport::FileTransport;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingTransport {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            FileTransport.fetch(url, dest, cancel).await
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn fetch(&self, _url: &Url, _dest: &Path, cancel: &CancellationToken) -> Result<u64> {
            cancel.cancelled().await;
            Err(ModelsError::DownloadCancelled)
        }
    }

    struct Fixture {
        _temp: TempDir,
        remote_dir: PathBuf,
        local_dir: PathBuf,
        settings: ModelsSettings,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let remote_dir = temp.path().join("remote");
        let local_dir = temp.path().join("local");
        std::fs::create_dir_all(&remote_dir).unwrap();
        let settings = ModelsSettings {
            remote_url: Url::from_directory_path(&remote_dir).unwrap().to_string(),
            verify_checksums: false,
            ..ModelsSettings::default()
        };
        Fixture {
            _temp: temp,
            remote_dir,
            local_dir,
            settings,
        }
    }

    async fn recv(events: &mut broadcast::Receiver<RepositoryEvent>) -> RepositoryEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Skip events until `wanted` arrives.
    async fn next_event_until(
        events: &mut broadcast::Receiver<RepositoryEvent>,
        wanted: &RepositoryEvent,
    ) -> RepositoryEvent {
        loop {
            let event = recv(events).await;
            if &event == wanted {
                return event;
            }
        }
    }

    fn coordinate() -> ModelCoordinate {
        ModelCoordinate::new("org.example", "lib", "call", "zip", "1.0.0")
    }

    fn publish(remote_dir: &Path, mc: &ModelCoordinate, contents: &[u8]) {
        let path = layout::local_path(remote_dir, mc);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resolve_downloads_and_publishes_event() {
        let f = fixture();
        publish(&f.remote_dir, &coordinate(), b"model");
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        let mut events = repo.subscribe();

        assert_eq!(repo.get_location(&coordinate(), false), None);
        let path = repo.resolve(&coordinate(), false).await.unwrap();

        assert_eq!(path, f.local_dir.join("org/example/lib/1.0.0/lib-1.0.0-call.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"model");
        assert_eq!(repo.get_location(&coordinate(), false), Some(path));
        assert_eq!(
            events.recv().await.unwrap(),
            RepositoryEvent::DownloadStarted(coordinate())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RepositoryEvent::ModelArchiveInstalled(coordinate())
        );
        assert_eq!(repo.local_archives().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_get_location_prefetches_in_background() {
        let f = fixture();
        publish(&f.remote_dir, &coordinate(), b"model");
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        let mut events = repo.subscribe();

        assert_eq!(repo.get_location(&coordinate(), true), None);
        let installed = RepositoryEvent::ModelArchiveInstalled(coordinate());
        assert_eq!(next_event_until(&mut events, &installed).await, installed);
        assert!(repo.get_location(&coordinate(), false).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_prefetch_publishes_failure() {
        let f = fixture();
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        let mut events = repo.subscribe();

        assert_eq!(repo.get_location(&coordinate(), true), None);
        assert_eq!(
            recv(&mut events).await,
            RepositoryEvent::DownloadStarted(coordinate())
        );
        match recv(&mut events).await {
            RepositoryEvent::DownloadFailed { coordinate: mc, error } => {
                assert_eq!(mc, coordinate());
                assert!(error.contains("lib-1.0.0-call.zip"), "unexpected error: {error}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!repo.local_path(&coordinate()).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_large_download_reports_progress() {
        let f = fixture();
        let size = NetworkConfig::PROGRESS_STEP_BYTES as usize * 3 / 2;
        publish(&f.remote_dir, &coordinate(), &vec![1u8; size]);
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        let mut events = repo.subscribe();

        repo.resolve(&coordinate(), false).await.unwrap();

        assert_eq!(
            recv(&mut events).await,
            RepositoryEvent::DownloadStarted(coordinate())
        );
        assert_eq!(
            recv(&mut events).await,
            RepositoryEvent::DownloadProgressed {
                coordinate: coordinate(),
                bytes: NetworkConfig::PROGRESS_STEP_BYTES,
            }
        );
        assert_eq!(
            recv(&mut events).await,
            RepositoryEvent::ModelArchiveInstalled(coordinate())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_forced_resolve_refetches_behind_pending_one() {
        let f = fixture();
        publish(&f.remote_dir, &coordinate(), b"old");
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let repo = ModelRepository::with_transport(
            &f.local_dir,
            f.settings.clone(),
            transport.clone(),
            Handle::current(),
        )
        .unwrap();

        let plain = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.resolve(&coordinate(), false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        publish(&f.remote_dir, &coordinate(), b"new");
        let forced = repo.resolve(&coordinate(), true).await.unwrap();

        plain.await.unwrap().unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read(forced).unwrap(), b"new");
        assert_eq!(repo.pending_downloads(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_one_transfer() {
        let f = fixture();
        publish(&f.remote_dir, &coordinate(), b"model");
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        });
        let repo = ModelRepository::with_transport(
            &f.local_dir,
            f.settings.clone(),
            transport.clone(),
            Handle::current(),
        )
        .unwrap();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.resolve(&coordinate(), false).await })
            })
            .collect();
        let paths: BTreeSet<PathBuf> = futures::future::join_all(waiters)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(paths.len(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.pending_downloads(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_are_remembered_until_forced() {
        let f = fixture();
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();

        let err = repo.resolve(&coordinate(), false).await.unwrap_err();
        assert!(err.is_not_found());

        // Published after the failure: only a forced resolve looks again.
        publish(&f.remote_dir, &coordinate(), b"late");
        assert!(repo.resolve(&coordinate(), false).await.is_err());
        assert_eq!(repo.get_location(&coordinate(), true), None);

        let path = repo.resolve(&coordinate(), true).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"late");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_downloads() {
        let f = fixture();
        let repo = ModelRepository::with_transport(
            &f.local_dir,
            f.settings.clone(),
            Arc::new(StalledTransport),
            Handle::current(),
        )
        .unwrap();

        let waiter = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.resolve(&coordinate(), false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        repo.cancel_downloads();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(ModelsError::Shared(ref e)) if matches!(**e, ModelsError::DownloadCancelled)
        ));
        assert!(!repo.local_path(&coordinate()).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resolve_blocking_from_sync_code() {
        let f = fixture();
        publish(&f.remote_dir, &coordinate(), b"model");
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();

        let path = tokio::task::spawn_blocking(move || repo.resolve_blocking(&coordinate(), false))
            .await
            .unwrap()
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_find_best_model_archive_without_advisor() {
        let f = fixture();
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        assert_eq!(
            repo.find_best_model_archive(&ProjectCoordinate::new("org.example", "lib", "1.0.0"), "call"),
            None
        );
    }

    #[tokio::test]
    async fn test_local_archives_skip_partial_files() {
        let f = fixture();
        let repo = ModelRepository::new(&f.local_dir, f.settings.clone(), Handle::current()).unwrap();
        let archive = repo.local_path(&coordinate());
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, b"zip").unwrap();
        std::fs::write(layout::temp_path(&archive), b"partial").unwrap();

        assert_eq!(repo.local_archives(), vec![archive]);
    }
}
