use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single retrieval that did not produce a usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status error for {url} (expected 200, got {status})")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed reading body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn transport(url: &str, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            url: url.to_string(),
            source: source.into(),
        }
    }
}

/// Failures that end a mirroring session.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid page URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to fetch page: {0}")]
    PageFetch(#[source] FetchError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{source}; writing the URL manifest failed as well: {manifest}")]
    ManifestAfterFailure {
        #[source]
        source: Box<MirrorError>,
        manifest: Box<MirrorError>,
    },
}

impl MirrorError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
