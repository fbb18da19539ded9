//! "Update EPG": download, decompress, decode and bulk-load a guide
//!
//! Meant to run off any interactive thread; the chunked insert keeps write
//! transactions short so now/next readers are not starved.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::xmltv::{decompress, iter_programs, DecodeReport};
use crate::error::{FetchError, IngestError};
use crate::storage::Store;

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Total attempts before giving up
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Read buffer size (bytes)
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 300,
            chunk_size: 64 * 1024,
            user_agent: concat!("iptv_guide/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Download progress callback: (downloaded_bytes, total_bytes)
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub decode: DecodeReport,
}

fn create_agent(config: &DownloadConfig) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
        .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
        .build()
        .new_agent()
}

/// Download a guide into memory, retrying failed attempts
pub fn fetch_xmltv(
    url: &str,
    config: &DownloadConfig,
    progress: Option<ProgressCallback>,
) -> Result<Vec<u8>, FetchError> {
    let agent = create_agent(config);
    let max_attempts = config.max_retries.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match try_fetch(&agent, url, config, progress.as_ref()) {
            Ok(bytes) => {
                info!(url, bytes = bytes.len(), attempts, "guide downloaded");
                return Ok(bytes);
            }
            Err(e) if attempts >= max_attempts => {
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(url, attempt = attempts, error = %e, "guide download failed, retrying");
                std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
            }
        }
    }
}

fn try_fetch(
    agent: &ureq::Agent,
    url: &str,
    config: &DownloadConfig,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<u8>, FetchError> {
    let response = agent
        .get(url)
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| match e {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            other => FetchError::Request(other.to_string()),
        })?;

    let status = response.status().as_u16();
    if status != 200 && status != 206 {
        return Err(FetchError::Status(status));
    }

    let total_size: Option<u64> = response
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let mut reader = response.into_body().into_reader();
    let mut buffer = vec![0u8; config.chunk_size.max(1)];
    let mut bytes = Vec::with_capacity(total_size.unwrap_or(0).min(64 << 20) as usize);

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                bytes.extend_from_slice(&buffer[..n]);
                if let Some(cb) = progress {
                    cb(bytes.len() as u64, total_size);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::Read(e)),
        }
    }

    Ok(bytes)
}

/// Replace the stored guide with the programmes of `raw`.
///
/// `raw` may be gzip-compressed (detected by magic bytes or a `.gz` hint).
/// Decompression happens before anything is deleted, so a corrupt archive
/// leaves the previous guide in place. An XML syntax error is returned after
/// the programmes read up to that point have been stored.
pub fn ingest_xmltv(
    store: &Store,
    raw: &[u8],
    hint: Option<&str>,
    chunk_size: usize,
) -> Result<IngestReport, IngestError> {
    let xml = decompress(raw, hint)?;

    store.clear_epg()?;
    let mut programs = iter_programs(&xml);
    let inserted = store.upsert_epg_programs(&mut programs, chunk_size)?;
    let decode = programs.into_report();

    info!(
        inserted,
        dropped = decode.dropped(),
        "guide ingested"
    );
    decode.check()?;

    Ok(IngestReport { inserted, decode })
}

/// [`ingest_xmltv`] over a local `.xml` or `.xml.gz` file
pub fn ingest_file(store: &Store, path: &Path, chunk_size: usize) -> Result<IngestReport, IngestError> {
    let raw = fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ingest_xmltv(store, &raw, path.to_str(), chunk_size)
}

/// Download `url` and ingest it
pub fn ingest_url(
    store: &Store,
    url: &str,
    config: &DownloadConfig,
    progress: Option<ProgressCallback>,
    chunk_size: usize,
) -> Result<IngestReport, IngestError> {
    let raw = fetch_xmltv(url, config, progress)?;
    ingest_xmltv(store, &raw, Some(url), chunk_size)
}
