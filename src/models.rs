//! Data models shared by the parsers and the store

use serde::{Deserialize, Serialize};

/// User-curated playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Guide feed advertised by the playlist or set by the user
    pub epg_url: Option<String>,
}

/// Channel entry of a playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub group: String,
    /// Opaque, case-sensitive key matched against `Program::tvg_id`
    pub tvg_id: String,
    pub url: String,
    /// Raw `#EXTINF` directive the entry was parsed from
    pub extinf: String,
    /// Player options (`#EXTVLCOPT:` lines), in playlist order
    #[serde(default)]
    pub options: Vec<String>,
}

/// Registered guide feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

/// A single scheduled broadcast
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Program {
    /// Channel ID this program belongs to
    pub tvg_id: String,
    /// Start time as Unix timestamp (UTC seconds)
    pub start: i64,
    /// End time as Unix timestamp (UTC seconds)
    pub stop: i64,
    pub title: String,
    pub desc: String,
}
