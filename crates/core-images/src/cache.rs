use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::{AHashMap, AHashSet};
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ImageError;
use crate::resolver::{Fetched, ImageResolver};

const UPDATE_CHANNEL_CAP: usize = 64;

/// Broadcast after every successful background fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheUpdated {
    pub base_uri: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Cached(PathBuf),
    InFlight,
    Absent,
}

/// Cache key for one image reference.
pub fn cache_key(base_uri: &str, uri: &str) -> String {
    format!("{base_uri}|||{uri}")
}

struct State {
    cache: AHashMap<String, PathBuf>,
    in_flight: AHashSet<String>,
    dir: Option<TempDir>,
}

pub struct ImageFetchCache {
    resolver: Arc<dyn ImageResolver>,
    runtime: Handle,
    dir_path: PathBuf,
    // Bookkeeping only; never held across resolver or filesystem work.
    state: Mutex<State>,
    // Held for the whole of a synchronous resolve.
    sync_lock: Mutex<()>,
    updates: broadcast::Sender<CacheUpdated>,
}

impl ImageFetchCache {
    pub fn create(
        resolver: Arc<dyn ImageResolver>,
        runtime: Handle,
    ) -> Result<Arc<Self>, ImageError> {
        let dir = tempfile::Builder::new()
            .prefix("marklight-images-")
            .tempdir()
            .map_err(ImageError::CacheDir)?;
        let dir_path = dir.path().to_path_buf();
        info!(target: "images.cache", dir = %dir_path.display(), "image_cache_created");
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAP);
        Ok(Arc::new(Self {
            resolver,
            runtime,
            dir_path,
            state: Mutex::new(State {
                cache: AHashMap::new(),
                in_flight: AHashSet::new(),
                dir: Some(dir),
            }),
            sync_lock: Mutex::new(()),
            updates,
        }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdated> {
        self.updates.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, uri: &str, base_uri: &str) -> FetchState {
        let key = cache_key(base_uri, uri);
        let state = self.lock_state();
        if let Some(path) = state.cache.get(&key) {
            FetchState::Cached(path.clone())
        } else if state.in_flight.contains(&key) {
            FetchState::InFlight
        } else {
            FetchState::Absent
        }
    }

    /// Returns the cached path, or `None` after making sure exactly one
    /// background fetch for the key is running.
    pub fn resolve_async(self: &Arc<Self>, uri: &str, base_uri: &str) -> Option<PathBuf> {
        let key = cache_key(base_uri, uri);
        {
            let mut state = self.lock_state();
            if state.dir.is_none() {
                return None;
            }
            if let Some(path) = state.cache.get(&key) {
                return Some(path.clone());
            }
            if !state.in_flight.insert(key.clone()) {
                debug!(target: "images.cache", key = %key, "fetch_already_in_flight");
                return None;
            }
        }

        debug!(target: "images.cache", key = %key, "fetch_started");
        let flight = InFlight {
            cache: Arc::clone(self),
            key: Some(key),
        };
        let uri = uri.to_string();
        let base_uri = base_uri.to_string();
        self.runtime.spawn_blocking(move || {
            let fetched = flight.cache.fetch_and_adopt(&uri, &base_uri);
            let cache = Arc::clone(&flight.cache);
            if flight.complete(fetched) {
                // No subscribers is fine.
                let _ = cache.updates.send(CacheUpdated { base_uri, uri });
            }
        });
        None
    }

    /// Fetches on the calling thread. Serialized against other synchronous
    /// callers only.
    pub fn resolve_sync(&self, uri: &str, base_uri: &str) -> Option<PathBuf> {
        let _guard = self.sync_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let key = cache_key(base_uri, uri);
        {
            let state = self.lock_state();
            if state.dir.is_none() {
                return None;
            }
            if let Some(path) = state.cache.get(&key) {
                return Some(path.clone());
            }
        }
        let path = self.fetch_and_adopt(uri, base_uri)?;
        let mut state = self.lock_state();
        if state.dir.is_none() {
            return None;
        }
        state.cache.insert(key, path.clone());
        Some(path)
    }

    /// Removes the cache directory and forgets every entry. Later resolves
    /// return `None`.
    pub fn shutdown(&self) {
        let dir = {
            let mut state = self.lock_state();
            state.cache.clear();
            state.dir.take()
        };
        if let Some(dir) = dir {
            match dir.close() {
                Ok(()) => info!(target: "images.cache", "image_cache_removed"),
                Err(err) => warn!(target: "images.cache", error = %err, "image_cache_remove_failed"),
            }
        }
    }

    fn fetch_and_adopt(&self, uri: &str, base_uri: &str) -> Option<PathBuf> {
        let fetched = match self.resolver.fetch(uri, base_uri) {
            Ok(Some(fetched)) => fetched,
            Ok(None) => {
                debug!(target: "images.cache", uri, "fetch_empty");
                return None;
            }
            Err(err) => {
                debug!(target: "images.cache", uri, error = %err, "fetch_failed");
                return None;
            }
        };
        match adopt(&self.dir_path, &fetched) {
            Ok(path) => {
                debug!(target: "images.cache", uri, path = %path.display(), "image_adopted");
                Some(path)
            }
            Err(err) => {
                warn!(target: "images.cache", uri, error = %err, "adopt_failed");
                None
            }
        }
    }
}

/// Owns the in-flight marker of one background fetch. Dropping it without
/// `complete` (a panicking resolver) clears the marker so the key can retry.
struct InFlight {
    cache: Arc<ImageFetchCache>,
    key: Option<String>,
}

impl InFlight {
    /// Clears the marker and stores the result under one lock. Returns whether
    /// a path was cached.
    fn complete(mut self, fetched: Option<PathBuf>) -> bool {
        let Some(key) = self.key.take() else {
            return false;
        };
        let mut state = self.cache.lock_state();
        state.in_flight.remove(&key);
        match fetched {
            Some(path) if state.dir.is_some() => {
                state.cache.insert(key, path);
                true
            }
            _ => false,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!(target: "images.cache", key = %key, "fetch_aborted");
            self.cache.lock_state().in_flight.remove(&key);
        }
    }
}

/// Move (temporary) or copy the fetched file into `dir` under a fresh name
/// that keeps the extension.
fn adopt(dir: &Path, fetched: &Fetched) -> Result<PathBuf, ImageError> {
    let adopt_err = |source: std::io::Error| ImageError::Adopt {
        path: fetched.path.clone(),
        source,
    };
    let suffix = fetched
        .path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let dest = tempfile::Builder::new()
        .prefix("img-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(adopt_err)?
        .into_temp_path()
        .keep()
        .map_err(|e| adopt_err(e.error))?;

    if fetched.temporary && fs::rename(&fetched.path, &dest).is_ok() {
        return Ok(dest);
    }
    fs::copy(&fetched.path, &dest).map_err(adopt_err)?;
    if fetched.temporary {
        let _ = fs::remove_file(&fetched.path);
    }
    Ok(dest)
}
