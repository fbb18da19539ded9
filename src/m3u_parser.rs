//! M3U playlist import and export

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::models::Channel;

const EXTINF: &str = "#EXTINF:";
const EXTVLCOPT: &str = "#EXTVLCOPT:";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct M3uPlaylist {
    pub channels: Vec<Channel>,
    pub epg_url: Option<String>, // From x-tvg-url in header
}

/// Parse M3U and return playlist with EPG URL
pub fn parse_m3u_playlist(content: &str) -> M3uPlaylist {
    let mut playlist = M3uPlaylist::default();

    // Check first line for EPG URL
    if let Some(first_line) = content.trim_start().lines().next() {
        if first_line.starts_with("#EXTM3U") {
            playlist.epg_url = extract_header_attr(first_line, "x-tvg-url")
                .or_else(|| extract_header_attr(first_line, "url-tvg"));
        }
    }

    playlist.channels = parse_m3u(content);
    playlist
}

/// Extract attribute from #EXTM3U header line
fn extract_header_attr(line: &str, attr_name: &str) -> Option<String> {
    let search = format!("{}=\"", attr_name);
    // ASCII lowering keeps byte offsets valid for slicing `line`
    let start = line.to_ascii_lowercase().find(&search)?;
    let rest = &line[start + search.len()..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string()).filter(|s| !s.is_empty())
}

/// Parse M3U content into channels.
///
/// Each entry is an `#EXTINF` directive, any `#EXTVLCOPT` lines, then the
/// stream URL. URLs without a preceding directive are ignored.
pub fn parse_m3u(content: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut attrs: HashMap<String, String> = HashMap::new();
    let mut pending: Option<Channel> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix(EXTINF) {
            attrs.clear();
            extract_attrs(info, &mut attrs);

            let name = info
                .rfind(',')
                .map(|comma| info[comma + 1..].trim().to_string())
                .unwrap_or_default();

            pending = Some(Channel {
                name,
                group: attrs.remove("group-title").unwrap_or_default(),
                tvg_id: attrs.remove("tvg-id").unwrap_or_default(),
                extinf: line.to_string(),
                ..Channel::default()
            });
        } else if line.starts_with(EXTVLCOPT) {
            if let Some(channel) = pending.as_mut() {
                channel.options.push(line.to_string());
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(mut channel) = pending.take() {
                channel.url = line.to_string();
                channels.push(channel);
            }
        }
    }

    channels
}

/// Extract attributes from EXTINF line - handles quoted and unquoted values
fn extract_attrs(info: &str, attrs: &mut HashMap<String, String>) {
    let mut chars = info.chars().peekable();

    // Duration (e.g. "-1") and the whitespace after it
    while chars.next_if(|c| c.is_ascii_digit() || *c == '-' || *c == '.').is_some() {}

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return;
        }

        // Collect key until '='
        let mut key = String::new();
        loop {
            match chars.peek() {
                Some('=') => {
                    chars.next();
                    break;
                }
                // No more attributes, rest is channel name
                Some(',') | None => return,
                Some(_) => {
                    if let Some(c) = chars.next() {
                        key.push(c);
                    }
                }
            }
        }

        let key = key.trim().to_lowercase();

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                if c == '"' {
                    break;
                }
                // Escaped quote
                if c == '\\' {
                    if let Some(quote) = chars.next_if_eq(&'"') {
                        value.push(quote);
                        continue;
                    }
                }
                value.push(c);
            }
        } else {
            // Unquoted value - read until space or comma
            while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != ',') {
                value.push(c);
            }
        }

        if !key.is_empty() && !value.is_empty() {
            attrs.insert(key, value);
        }
    }
}

/// Render channels back into an M3U document.
///
/// Channels without a URL are left out. The stored `#EXTINF` directive is
/// written verbatim; one is synthesized when it is missing.
pub fn write_m3u(channels: &[Channel]) -> String {
    let mut out = String::from("#EXTM3U\n");

    for channel in channels.iter().filter(|c| !c.url.is_empty()) {
        if channel.extinf.is_empty() {
            let _ = write!(out, "{}-1", EXTINF);
            if !channel.tvg_id.is_empty() {
                let _ = write!(out, " tvg-id=\"{}\"", channel.tvg_id);
            }
            if !channel.group.is_empty() {
                let _ = write!(out, " group-title=\"{}\"", channel.group);
            }
            let _ = writeln!(out, ",{}", channel.name);
        } else {
            out.push_str(&channel.extinf);
            out.push('\n');
        }

        for option in &channel.options {
            out.push_str(option);
            out.push('\n');
        }
        out.push_str(&channel.url);
        out.push('\n');
    }

    out
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
