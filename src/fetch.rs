//! Content retrieval for patch sets and patch files.
//!
//! Resolution only needs two things from the outside world: the raw bytes
//! behind a URL and the JSON document behind a URL. [`ContentFetcher`] is
//! that capability; [`Fetcher`] is the default implementation, reading local
//! paths directly and going over HTTP(S) for anything with a host.

use reqwest::Url;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to download {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON in {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported URL: {url}")]
    Unsupported { url: String },
}

/// Capability for retrieving patch content and patch-set documents.
pub trait ContentFetcher {
    /// Raw bytes behind `url`.
    fn get_contents(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// `url` decoded as JSON.
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// Default fetcher: local files, `file://` URLs and HTTP(S).
///
/// Results are memoized per URL for the lifetime of the fetcher, so one
/// fetcher should be shared by everything in a single run.
pub struct Fetcher {
    base_dir: PathBuf,
    client: reqwest::blocking::Client,
    contents: RefCell<HashMap<String, Vec<u8>>>,
    documents: RefCell<HashMap<String, Value>>,
}

impl Fetcher {
    /// Create a fetcher resolving relative local paths against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            client: reqwest::blocking::Client::new(),
            contents: RefCell::new(HashMap::new()),
            documents: RefCell::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| FetchError::Unsupported {
                        url: url.to_string(),
                    })?;
                self.read_local(&path)
            }
            Ok(parsed) if parsed.host_str().is_some() => {
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(FetchError::Unsupported {
                        url: url.to_string(),
                    });
                }
                debug!(url, "downloading");
                let http_err = |source| FetchError::Http {
                    url: url.to_string(),
                    source,
                };
                let response = self
                    .client
                    .get(parsed)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(http_err)?;
                let bytes = response.bytes().map_err(http_err)?;
                Ok(bytes.to_vec())
            }
            // No host to talk to (plain paths, Windows drive letters, ...)
            _ => self.read_local(Path::new(url)),
        }
    }

    fn read_local(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        debug!(path = %path.display(), "reading local file");
        fs::read(&path).map_err(|source| FetchError::Io { path, source })
    }
}

impl ContentFetcher for Fetcher {
    fn get_contents(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(bytes) = self.contents.borrow().get(url) {
            debug!(url, "content cache hit");
            return Ok(bytes.clone());
        }
        let bytes = self.download(url)?;
        self.contents
            .borrow_mut()
            .insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }

    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        if let Some(doc) = self.documents.borrow().get(url) {
            debug!(url, "document cache hit");
            return Ok(doc.clone());
        }
        let bytes = self.get_contents(url)?;
        let doc: Value = serde_json::from_slice(&bytes).map_err(|source| FetchError::Json {
            url: url.to_string(),
            source,
        })?;
        self.documents
            .borrow_mut()
            .insert(url.to_string(), doc.clone());
        Ok(doc)
    }
}
