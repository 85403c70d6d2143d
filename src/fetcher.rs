use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::redirect::Policy;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::charset::PageText;
use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.3; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/53.0.2785.80 Safari/537.36";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDIRECTS: usize = 10;

/// Performs one GET per call. Implementations never retry.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Status plus a not-yet-consumed body stream.
pub struct FetchResponse {
    url: String,
    status: StatusCode,
    content_type: Option<String>,
    body: BoxStream<'static, io::Result<Bytes>>,
}

impl FetchResponse {
    pub fn new(
        url: impl Into<String>,
        status: StatusCode,
        body: BoxStream<'static, io::Result<Bytes>>,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Response with a fully buffered body, mostly useful for fakes.
    pub fn from_bytes(url: impl Into<String>, status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(url, status, stream::once(async move { Ok(body) }).boxed())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    fn verify(&self) -> Result<(), FetchError> {
        if self.ok() {
            Ok(())
        } else {
            Err(FetchError::Status {
                url: self.url.clone(),
                status: self.status,
            })
        }
    }

    /// Reads the whole body as text in the charset the response declares,
    /// falling back to a `<meta>` declaration and then UTF-8.
    pub async fn text(self) -> Result<PageText, FetchError> {
        self.verify()?;
        let Self {
            url,
            content_type,
            body,
            ..
        } = self;
        let chunks: Vec<Bytes> = body
            .try_collect()
            .await
            .map_err(|source| FetchError::Body { url, source })?;
        Ok(PageText::decode(&chunks.concat(), content_type.as_deref()))
    }

    /// Streams the body into `path`, creating parent directories as needed.
    /// Returns the number of bytes written.
    ///
    /// A body that fails mid-stream leaves the partial file in place.
    pub async fn write_to(self, path: &Path) -> Result<u64, FetchError> {
        self.verify()?;

        let write_err = |source| FetchError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;

        let Self { url, mut body, .. } = self;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| FetchError::Body {
                url: url.clone(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        Ok(written)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Applied to the connect and the read phase separately.
    pub timeout: Duration,
    pub follow_redirects: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            follow_redirects: true,
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let redirect = if config.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };

        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .redirect(redirect)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .boxed();

        let fetched = FetchResponse::new(url, status, body);
        Ok(match content_type {
            Some(content_type) => fetched.with_content_type(content_type),
            None => fetched,
        })
    }
}
