//! Network resolution for `http://` / `https://` image references.

use std::io::{self, Read};

use tracing::debug;

use crate::ImageError;
use crate::resolver::{Fetched, ImageResolver};

/// Downloads larger than this are truncated.
pub const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Downloads remote images into caller-owned temporary files. Relative URIs
/// resolve against a remote base. There is no request timeout; a stalled
/// download keeps its key in flight.
#[derive(Clone)]
pub struct HttpResolver {
    agent: ureq::Agent,
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResolver {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn download(&self, url: &str) -> Result<Option<Fetched>, ImageError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|source| ImageError::Http {
                uri: url.to_string(),
                source: Box::new(source),
            })?;
        let io_err = |source: io::Error| ImageError::Download {
            uri: url.to_string(),
            source,
        };
        let suffix = extension_of(url)
            .or_else(|| extension_for_content_type(response.content_type()))
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("marklight-dl-")
            .suffix(&suffix)
            .tempfile()
            .map_err(io_err)?;
        let written = io::copy(
            &mut response.into_reader().take(MAX_IMAGE_BYTES),
            file.as_file_mut(),
        )
        .map_err(io_err)?;
        if written == 0 {
            debug!(target: "images.http", url, "download_empty");
            return Ok(None);
        }
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| io_err(e.error))?;
        debug!(target: "images.http", url, bytes = written, path = %path.display(), "download_complete");
        Ok(Some(Fetched {
            path,
            temporary: true,
        }))
    }
}

impl ImageResolver for HttpResolver {
    fn fetch(&self, uri: &str, base_uri: &str) -> Result<Option<Fetched>, ImageError> {
        let url = remote_url(uri, base_uri).ok_or_else(|| ImageError::Unsupported(uri.to_string()))?;
        self.download(&url)
    }
}

pub(crate) fn is_http(uri: &str) -> bool {
    let lower = uri.get(..8).unwrap_or(uri).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Absolute URL for `uri`: itself when remote, else joined onto a remote base.
fn remote_url(uri: &str, base_uri: &str) -> Option<String> {
    if is_http(uri) {
        return Some(uri.to_string());
    }
    if uri.contains("://") || !is_http(base_uri) {
        return None;
    }
    let authority_end = base_uri
        .find("://")
        .map(|i| i + 3)
        .map(|from| {
            base_uri[from..]
                .find('/')
                .map_or(base_uri.len(), |i| from + i)
        })?;
    if let Some(rooted) = uri.strip_prefix('/') {
        return Some(format!("{}/{rooted}", &base_uri[..authority_end]));
    }
    let base_path = &base_uri[..base_uri.find(['?', '#']).unwrap_or(base_uri.len())];
    let dir_end = base_path
        .rfind('/')
        .filter(|&i| i >= authority_end)
        .unwrap_or(base_path.len());
    Some(format!("{}/{uri}", &base_path[..dir_end]))
}

/// Extension of the last path segment, ignoring query and fragment.
fn extension_of(url: &str) -> Option<&str> {
    let path = &url[..url.find(['?', '#']).unwrap_or(url.len())];
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

fn extension_for_content_type(content_type: &str) -> Option<&str> {
    let subtype = content_type.strip_prefix("image/")?;
    let subtype = subtype.split(';').next()?.trim();
    match subtype {
        "svg+xml" => Some("svg"),
        "jpeg" => Some("jpg"),
        "" => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_references_join_remote_bases() {
        assert_eq!(
            remote_url("img/a.png", "https://host/docs/readme.md").as_deref(),
            Some("https://host/docs/img/a.png")
        );
        assert_eq!(
            remote_url("/a.png", "http://host:8080/docs/readme.md?x=1").as_deref(),
            Some("http://host:8080/a.png")
        );
        assert_eq!(
            remote_url("a.png", "https://host").as_deref(),
            Some("https://host/a.png")
        );
        assert_eq!(
            remote_url("HTTPS://cdn/x.gif", "").as_deref(),
            Some("HTTPS://cdn/x.gif")
        );
        assert_eq!(remote_url("a.png", "/local/doc.md"), None);
        assert_eq!(remote_url("ftp://host/a.png", "https://host/"), None);
    }

    #[test]
    fn extension_from_url_or_content_type() {
        assert_eq!(extension_of("https://h/p/a.png?size=2"), Some("png"));
        assert_eq!(extension_of("https://h/p/badge"), None);
        assert_eq!(extension_of("https://h/.hidden"), None);
        assert_eq!(extension_for_content_type("image/svg+xml; charset=utf-8"), Some("svg"));
        assert_eq!(extension_for_content_type("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_content_type("text/html"), None);
    }

    #[test]
    fn non_remote_references_are_unsupported() {
        let err = HttpResolver::new().fetch("a.png", "/tmp/doc.md").unwrap_err();
        assert!(matches!(err, ImageError::Unsupported(_)));
    }
}
