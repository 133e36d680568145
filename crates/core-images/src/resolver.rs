use std::path::{Path, PathBuf};

use tracing::trace;

use crate::ImageError;
use crate::http::{HttpResolver, is_http};

/// A fetched image on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    /// The file is owned by the caller and may be moved instead of copied.
    pub temporary: bool,
}

/// Maps `(uri, base_uri)` to a local file. Called on blocking worker threads.
///
/// `Ok(None)` means the resolver ran but produced nothing usable.
pub trait ImageResolver: Send + Sync {
    fn fetch(&self, uri: &str, base_uri: &str) -> Result<Option<Fetched>, ImageError>;
}

/// Resolves local paths and `file://` URIs, relative ones against the base.
/// The base may name the document itself or its directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

const FILE_SCHEME: &str = "file://";

fn strip_file_scheme(s: &str) -> &str {
    s.strip_prefix(FILE_SCHEME).unwrap_or(s)
}

fn has_remote_scheme(uri: &str) -> bool {
    match uri.split_once("://") {
        Some((scheme, _)) => {
            !scheme.eq_ignore_ascii_case("file")
                && !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl FileResolver {
    pub fn locate(&self, uri: &str, base_uri: &str) -> Result<PathBuf, ImageError> {
        if has_remote_scheme(uri) {
            return Err(ImageError::Unsupported(uri.to_string()));
        }
        let target = Path::new(strip_file_scheme(uri));
        if target.is_absolute() || base_uri.is_empty() {
            return Ok(target.to_path_buf());
        }
        let base = Path::new(strip_file_scheme(base_uri));
        let dir = if base.is_dir() {
            base
        } else {
            base.parent().unwrap_or(Path::new(""))
        };
        Ok(dir.join(target))
    }
}

impl ImageResolver for FileResolver {
    fn fetch(&self, uri: &str, base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        let path = self.locate(uri, base_uri)?;
        if !path.is_file() {
            return Err(ImageError::NotFound(path));
        }
        Ok(Some(Fetched {
            path,
            temporary: false,
        }))
    }
}

/// Tries resolvers in order. A resolver that does not handle the reference
/// (`Unsupported`, or `NotFound` for a reference under a remote base) passes
/// it to the next; any other outcome is final.
pub struct ChainResolver {
    resolvers: Vec<Box<dyn ImageResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Box<dyn ImageResolver>>) -> Self {
        Self { resolvers }
    }

    /// Local files first, then the network.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(FileResolver), Box::new(HttpResolver::new())])
    }
}

impl ImageResolver for ChainResolver {
    fn fetch(&self, uri: &str, base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        let mut last = ImageError::Unsupported(uri.to_string());
        for (i, resolver) in self.resolvers.iter().enumerate() {
            match resolver.fetch(uri, base_uri) {
                Err(err @ ImageError::Unsupported(_)) => last = err,
                Err(err @ ImageError::NotFound(_)) if is_http(base_uri) => last = err,
                outcome => return outcome,
            }
            trace!(target: "images.resolve", uri, resolver = i, "resolver_passed");
        }
        Err(last)
    }
}
