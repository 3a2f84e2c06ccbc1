//! HTTP client for probing and fetching source files

use bytes::Bytes;
use reqwest::{Client, Response, header};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::WorkerSettings;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_file_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for HttpConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            probe_timeout: settings.probe_timeout(),
            fetch_timeout: settings.fetch_timeout(),
            max_file_bytes: settings.max_file_bytes.as_u64(),
            user_agent: settings.user_agent.clone(),
        }
    }
}

/// What a metadata-only request revealed about a file
#[derive(Debug, Clone, Default)]
pub struct ProbeInfo {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// HTTP downloader
///
/// Performs exactly one request per call; retries belong to the queue.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// HEAD the source; any non-success status is a failure
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let url = parse_url(url)?;
        debug!(%url, "Probing source");

        let response = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let response = check_status(response)?;
        let info = ProbeInfo {
            content_length: header_content_length(&response),
            content_type: header_content_type(&response),
        };

        if let Some(size) = info.content_length {
            self.check_size(size)?;
        }

        Ok(info)
    }

    /// GET the full body
    pub async fn fetch(&self, url: &str) -> Result<FetchedFile> {
        let url = parse_url(url)?;
        debug!(%url, "Starting download");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let response = check_status(response)?;
        if let Some(size) = header_content_length(&response) {
            self.check_size(size)?;
        }
        let content_type = header_content_type(&response);

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;
        self.check_size(bytes.len() as u64)?;

        debug!(%url, size = bytes.len(), "Download completed");

        Ok(FetchedFile {
            bytes,
            content_type,
        })
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.config.max_file_bytes {
            return Err(DownloadError::TooLarge {
                size,
                limit: self.config.max_file_bytes,
            });
        }
        Ok(())
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url> {
    let parsed = reqwest::Url::parse(url).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(DownloadError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

fn map_request_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else {
        DownloadError::RequestFailed(e.to_string())
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::Status(status.as_u16()))
    }
}

// The body size hint of a HEAD response is always zero, so read the header
fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn header_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// MIME type for stored metadata
///
/// The response `Content-Type` essence wins; otherwise the file extension
/// decides between PDF and HTML, and anything else is opaque bytes.
pub fn detect_mime(content_type: Option<&str>, file_name: &str) -> String {
    let declared = content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .filter(|m| *m != mime::APPLICATION_OCTET_STREAM);
    if let Some(m) = declared {
        return m.essence_str().to_string();
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => mime::APPLICATION_PDF.to_string(),
        Some("html") | Some("htm") => mime::TEXT_HTML.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
