//! IPTV guide store
//!
//! Playlists and channels imported from M3U, XMLTV programme guides decoded
//! in a streaming pass and bulk-loaded into SQLite, and a greedy selector that
//! keeps the number of external guide grabs small.

pub mod config;
pub mod epg;
pub mod error;
pub mod m3u_parser;
pub mod models;
pub mod storage;

pub use config::AppConfig;
pub use error::{
    CatalogError, DecodeError, FetchError, GrabError, IngestError, MergeError, PipelineError,
    StoreError,
};
pub use models::{Channel, EpgSource, Playlist, Program};
pub use storage::Store;
