//! Concurrency behaviour of the image fetch cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use core_images::{FetchState, Fetched, FileResolver, ImageError, ImageFetchCache, ImageResolver};
use tokio::runtime::Handle;

/// Counts fetches and blocks each one until released.
struct GatedResolver {
    source: PathBuf,
    calls: AtomicUsize,
    open: AtomicBool,
}

impl GatedResolver {
    fn new(source: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            source,
            calls: AtomicUsize::new(0),
            open: AtomicBool::new(false),
        })
    }

    fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageResolver for GatedResolver {
    fn fetch(&self, _uri: &str, _base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(Some(Fetched {
            path: self.source.clone(),
            temporary: false,
        }))
    }
}

/// Fails the first fetch, succeeds afterwards.
struct FlakyResolver {
    source: PathBuf,
    calls: AtomicUsize,
}

impl ImageResolver for FlakyResolver {
    fn fetch(&self, uri: &str, _base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ImageError::Unsupported(uri.to_string()));
        }
        Ok(Some(Fetched {
            path: self.source.clone(),
            temporary: false,
        }))
    }
}

/// Panics on the first fetch, succeeds afterwards.
struct PanickyResolver {
    source: PathBuf,
    calls: AtomicUsize,
}

impl ImageResolver for PanickyResolver {
    fn fetch(&self, _uri: &str, _base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("resolver blew up");
        }
        Ok(Some(Fetched {
            path: self.source.clone(),
            temporary: false,
        }))
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

fn fixture(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, b"image-bytes").unwrap();
    (dir, path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_fetch() {
    let (_src, path) = fixture("a.png");
    let resolver = GatedResolver::new(path);
    let cache = ImageFetchCache::create(resolver.clone(), Handle::current()).unwrap();
    let mut updates = cache.subscribe();

    assert_eq!(cache.resolve_async("a.png", "doc.md"), None);
    assert_eq!(cache.resolve_async("a.png", "doc.md"), None);
    assert_eq!(cache.state("a.png", "doc.md"), FetchState::InFlight);

    resolver.release();
    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("completion broadcast")
        .expect("channel open");
    assert_eq!(update.uri, "a.png");
    assert_eq!(update.base_uri, "doc.md");

    let cached = cache.resolve_async("a.png", "doc.md").expect("cached path");
    assert!(cached.starts_with(cache.dir()));
    assert_eq!(std::fs::read(&cached).unwrap(), b"image-bytes");
    assert_eq!(cache.state("a.png", "doc.md"), FetchState::Cached(cached));
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_releases_key_for_retry() {
    let (_src, path) = fixture("b.gif");
    let resolver = Arc::new(FlakyResolver {
        source: path,
        calls: AtomicUsize::new(0),
    });
    let cache = ImageFetchCache::create(resolver.clone(), Handle::current()).unwrap();

    assert_eq!(cache.resolve_async("b.gif", ""), None);
    assert!(wait_until(|| cache.state("b.gif", "") == FetchState::Absent).await);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    assert_eq!(cache.resolve_async("b.gif", ""), None);
    assert!(wait_until(|| matches!(cache.state("b.gif", ""), FetchState::Cached(_))).await);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_resolve_caches_without_broadcast() {
    let (src, _path) = fixture("c.png");
    let doc = src.path().join("doc.md");
    let cache = ImageFetchCache::create(Arc::new(FileResolver), Handle::current()).unwrap();
    let mut updates = cache.subscribe();

    let base = doc.to_str().unwrap();
    let first = cache.resolve_sync("c.png", base).expect("resolved");
    let second = cache.resolve_sync("c.png", base).expect("cached");
    assert_eq!(first, second);
    assert!(updates.try_recv().is_err());

    // The async path sees the synchronous result.
    assert_eq!(cache.resolve_async("c.png", base), Some(first));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keys_include_the_base() {
    let (src, _path) = fixture("d.png");
    let cache = ImageFetchCache::create(Arc::new(FileResolver), Handle::current()).unwrap();
    let base = src.path().to_str().unwrap();
    assert!(cache.resolve_sync("d.png", base).is_some());
    assert_eq!(cache.state("d.png", "elsewhere"), FetchState::Absent);
    assert!(cache.resolve_sync("d.png", "/definitely/not/here").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_removes_directory_and_stops_resolving() {
    let (src, _path) = fixture("e.png");
    let cache = ImageFetchCache::create(Arc::new(FileResolver), Handle::current()).unwrap();
    let base = src.path().to_str().unwrap();
    let cached = cache.resolve_sync("e.png", base).unwrap();
    let dir = cache.dir().to_path_buf();

    cache.shutdown();
    assert!(!dir.exists());
    assert!(!cached.exists());
    assert_eq!(cache.resolve_sync("e.png", base), None);
    assert_eq!(cache.resolve_async("e.png", base), None);
    assert_eq!(cache.state("e.png", base), FetchState::Absent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_fetch_releases_key_for_retry() {
    let (_src, path) = fixture("f.png");
    let resolver = Arc::new(PanickyResolver {
        source: path,
        calls: AtomicUsize::new(0),
    });
    let cache = ImageFetchCache::create(resolver.clone(), Handle::current()).unwrap();

    assert_eq!(cache.resolve_async("f.png", ""), None);
    assert!(wait_until(|| resolver.calls.load(Ordering::SeqCst) == 1).await);
    assert!(wait_until(|| cache.state("f.png", "") == FetchState::Absent).await);

    assert_eq!(cache.resolve_async("f.png", ""), None);
    assert!(wait_until(|| matches!(cache.state("f.png", ""), FetchState::Cached(_))).await);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
}
