//! Image fetch cache for the preview surface.
//!
//! `ImageFetchCache` is a process-scoped service: created once with a
//! resolver and a runtime handle, shared as `Arc`, and shut down explicitly
//! (or on last drop). Fetched files are adopted into a private temporary
//! directory and looked up by `(base_uri, uri)`.
//!
//! Two entry points with different guarantees:
//! * `resolve_async` is single-flight per key: at most one background fetch
//!   runs for a key and completion is broadcast to subscribers.
//! * `resolve_sync` serializes synchronous callers against each other under
//!   one coarse lock but ignores the async in-flight set, so it may duplicate
//!   a fetch already running in the background.

mod cache;
mod http;
mod resolver;

pub use cache::{CacheUpdated, FetchState, ImageFetchCache, cache_key};
pub use http::{HttpResolver, MAX_IMAGE_BYTES};
pub use resolver::{ChainResolver, Fetched, FileResolver, ImageResolver};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to create image cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("unsupported image uri: {0}")]
    Unsupported(String),
    #[error("image not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("request for {uri} failed: {source}")]
    Http {
        uri: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("failed to download {uri}: {source}")]
    Download {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to adopt {}: {source}", path.display())]
    Adopt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image cache is shut down")]
    ShutDown,
}
