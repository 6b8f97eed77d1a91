/*!
 * Unified local/remote streaming access to MRF payloads
 *
 * An MRF can live on disk or behind an http(s) URL, gzip-compressed or
 * plain. This module hides all four combinations behind one opener:
 * callers hand a [`SourceLocation`] to [`SourceStream::open`] and read
 * decompressed JSON bytes from the returned [`StreamHandle`], never
 * branching on where the payload lives. Payloads are multi-gigabyte, so
 * nothing is ever materialized ahead of the caller: remote bodies are
 * consumed in streaming mode and the gzip wrapper decodes lazily as the
 * caller reads.
 */

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::{Client, Response};
use reqwest::Url;

use crate::config::MrfConfig;
use crate::constants::{
    DEFAULT_POOL_MAX_CONNECTIONS, DEFAULT_READ_BUFFER_SIZE, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF_MS,
};
use crate::{MrfError, Result};

/// Payload format resolved from a location's suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Plain `.json`
    Json,
    /// Gzip-compressed `.json.gz`
    JsonGz,
}

impl SourceFormat {
    /// Resolve a format from a suffix-bearing string (a file name, a URL
    /// path, or a query string for signed URLs).
    fn from_suffix(candidate: &str) -> Option<Self> {
        if candidate.ends_with(".json.gz") {
            Some(Self::JsonGz)
        } else if candidate.ends_with(".json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// Whether the payload carries its own gzip container
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::JsonGz)
    }
}

/// Where an MRF payload lives: a filesystem path or an http(s) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(Url),
}

impl SourceLocation {
    /// Parse a location string. Anything starting with `http://` or
    /// `https://` is remote; everything else is a local path.
    pub fn parse(input: &str) -> Result<Self> {
        if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input).map_err(|e| MrfError::Configuration {
                message: format!("invalid URL '{}': {}", input, e),
                suggestion: Some("Provide an absolute http(s) URL".to_string()),
            })?;
            Ok(Self::Remote(url))
        } else {
            Ok(Self::Local(PathBuf::from(input)))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Resolve the payload format from the location's suffix.
    ///
    /// The URL path is checked first; signed URLs that bury the object
    /// name in the query string fall back to the query. A suffix that is
    /// neither `.json` nor `.json.gz` is a [`MrfError::Format`] error.
    pub fn format(&self) -> Result<SourceFormat> {
        match self {
            Self::Local(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                SourceFormat::from_suffix(&name)
                    .ok_or_else(|| MrfError::unsupported_suffix(&self.to_string(), suffix_chain(&name)))
            }
            Self::Remote(url) => {
                if let Some(format) = SourceFormat::from_suffix(url.path()) {
                    return Ok(format);
                }
                if let Some(format) = url.query().and_then(SourceFormat::from_suffix) {
                    return Ok(format);
                }
                let last_segment = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default();
                Err(MrfError::unsupported_suffix(
                    &self.to_string(),
                    suffix_chain(last_segment),
                ))
            }
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// The dotted suffix chain of a name, for error messages
fn suffix_chain(name: &str) -> &str {
    match name.find('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

/// An open, decompressed byte stream over a source location.
///
/// Owns every layer of the open: the decompression wrapper, the raw
/// response or file underneath it, and (remote only) the pooled HTTP
/// client. Fields drop in declaration order, so teardown always runs
/// wrapper, then raw stream, then session — on success, on a partial
/// open, and on every error path while reading.
pub struct StreamHandle {
    reader: Box<dyn Read + Send>,
    _client: Option<Client>,
    location: String,
}

impl StreamHandle {
    /// The location this stream was opened from
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Read for StreamHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("location", &self.location)
            .field("remote", &self._client.is_some())
            .finish()
    }
}

/// Opener for MRF byte streams with buffering, retry, and decompression
/// policy.
///
/// ```no_run
/// use mrf::prelude::*;
/// use std::io::Read;
///
/// # fn main() -> mrf::Result<()> {
/// let location = SourceLocation::parse("rates/2026-08_in-network.json.gz")?;
/// let mut stream = SourceStream::new().open(&location)?;
///
/// let mut head = [0u8; 512];
/// let n = stream.read(&mut head)?;
/// println!("first {} decompressed bytes read", n);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SourceStream {
    read_buffer_size: usize,
    retry_attempts: u32,
    retry_backoff: Duration,
    pool_max_connections: usize,
}

impl Default for SourceStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceStream {
    /// Create an opener with default settings
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            pool_max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
        }
    }

    /// Create an opener from a runtime configuration
    pub fn from_config(config: &MrfConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff(),
            pool_max_connections: config.pool_max_connections,
        }
    }

    /// Set the read-ahead buffer size for local and plain remote streams
    pub fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes.max(1);
        self
    }

    /// Set how many times a remote open is attempted before giving up
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Set the sleep between remote open attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the HTTP connection pool size for high fan-out batches
    pub fn with_pool_max_connections(mut self, connections: usize) -> Self {
        self.pool_max_connections = connections.max(1);
        self
    }

    /// Open a readable, decompressed byte stream over `location`.
    ///
    /// Fails with [`MrfError::Format`] when the suffix resolves to
    /// neither `.json` nor `.json.gz`, with [`MrfError::Connection`]
    /// when a remote open exhausts its retries, and with
    /// [`MrfError::FileNotFound`]/[`MrfError::Io`] for unreadable local
    /// paths.
    pub fn open(&self, location: &SourceLocation) -> Result<StreamHandle> {
        let format = location.format()?;
        let handle = match location {
            SourceLocation::Local(path) => self.open_local(path, format)?,
            SourceLocation::Remote(url) => self.open_remote(url, format)?,
        };
        tracing::info!(location = %handle.location(), "opened source stream");
        Ok(handle)
    }

    fn open_local(&self, path: &Path, format: SourceFormat) -> Result<StreamHandle> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MrfError::file_not_found(path.to_path_buf())
            } else {
                MrfError::Io {
                    message: format!("cannot open '{}': {}", path.display(), e),
                    source: e,
                }
            }
        })?;
        let buffered = BufReader::with_capacity(self.read_buffer_size, file);
        let reader: Box<dyn Read + Send> = match format {
            SourceFormat::JsonGz => Box::new(GzDecoder::new(buffered)),
            SourceFormat::Json => Box::new(buffered),
        };
        Ok(StreamHandle {
            reader,
            _client: None,
            location: path.display().to_string(),
        })
    }

    fn open_remote(&self, url: &Url, format: SourceFormat) -> Result<StreamHandle> {
        // Transport compression is negotiated separately from the file's
        // own gzip container; reqwest strips the transport layer and the
        // GzDecoder below strips the container.
        let client = Client::builder()
            .pool_max_idle_per_host(self.pool_max_connections)
            .gzip(true)
            .build()
            .map_err(|e| MrfError::Connection {
                url: url.to_string(),
                attempts: 0,
                message: format!("failed to build HTTP client: {}", e),
                suggestion: Some("Check your TLS and proxy configuration".to_string()),
            })?;

        let response = self.request_with_retry(&client, url)?;
        let reader: Box<dyn Read + Send> = match format {
            SourceFormat::JsonGz => Box::new(GzDecoder::new(response)),
            SourceFormat::Json => Box::new(BufReader::with_capacity(self.read_buffer_size, response)),
        };
        Ok(StreamHandle {
            reader,
            _client: Some(client),
            location: url.to_string(),
        })
    }

    /// Issue the GET in streaming mode, retrying transient failures.
    ///
    /// Connection errors and 5xx statuses count as transient; other
    /// non-success statuses fail immediately.
    fn request_with_retry(&self, client: &Client, url: &Url) -> Result<Response> {
        let max_attempts = self.retry_attempts.max(1);
        let mut attempts_made = 0;
        let mut last_error = String::new();

        while attempts_made < max_attempts {
            if attempts_made > 0 {
                std::thread::sleep(self.retry_backoff);
            }
            attempts_made += 1;

            match client.get(url.clone()).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    last_error = format!("HTTP status {}", status);
                    if !status.is_server_error() {
                        break;
                    }
                    tracing::warn!(url = %url, attempt = attempts_made, status = %status, "remote open failed, retrying");
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(url = %url, attempt = attempts_made, error = %last_error, "remote open failed, retrying");
                }
            }
        }

        Err(MrfError::connection_exhausted(url.as_str(), attempts_made, last_error))
    }
}
