//! Error types for every fallible component

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn raw guide bytes into programs
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("corrupt or truncated gzip stream: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// Storage engine failure, fatal for the operation that raised it
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("channel options column: {0}")]
    Options(#[from] serde_json::Error),

    #[error("database path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("invalid guide repository: {0} not found")]
    MissingSitesDir(PathBuf),

    #[error("channel catalog not found: {0}")]
    MissingCatalog(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error in {path} at byte {position}: {source}")]
    Xml {
        path: PathBuf,
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("no channel in {0} matches the requested tvg-ids (xmltv_id may carry @SD/@HD)")]
    NoMatch(PathBuf),

    #[error("no tvg-id provided")]
    NoIds,
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("writing merged guide: {0}")]
    Write(#[source] std::io::Error),

    #[error("in {path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<MergeError>,
    },
}

/// Failure of a single external grabber run. Always recoverable.
#[derive(Error, Debug)]
pub enum GrabError {
    #[error("grabber timed out after {0}s")]
    Timeout(u64),

    #[error("grabber exited with code {0}")]
    Exit(i32),

    #[error("grabber finished but output is missing or empty: {0}")]
    EmptyOutput(PathBuf),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no guide source covers the requested tvg-ids")]
    NoSources,

    #[error("no source produced a guide (skipped: {})", .skipped.join(", "))]
    AllSourcesFailed { skipped: Vec<String> },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("download failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
