//! Guide-grabber site catalogs
//!
//! The grabber checkout keeps one `sites/<site>/<site>.channels.xml` per
//! site. Each lists `<channel xmltv_id="...">` entries the site can supply,
//! which is what the coverage index is built from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::{debug, warn};

use super::coverage::{canonical_id, CoverageIndex, WantedIds};
use super::xmltv::{decode_text, decode_xml_entities};
use crate::error::CatalogError;

const CATALOG_SUFFIX: &str = ".channels.xml";

/// One `<channel>` of a site catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogChannel {
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    pub text: String,
}

impl CatalogChannel {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn xmltv_id(&self) -> &str {
        self.attr("xmltv_id").map(str::trim).unwrap_or_default()
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }
}

/// Quality marker rank of a catalog id: `@HD` beats `@SD` beats none
pub fn quality_rank(xmltv_id: &str) -> u8 {
    let upper = xmltv_id.to_uppercase();
    if upper.contains("@HD") {
        2
    } else if upper.contains("@SD") {
        1
    } else {
        0
    }
}

/// Build the coverage index of a grabber checkout: site name -> every
/// non-empty `xmltv_id` its catalogs declare. Catalogs that fail to parse
/// are skipped.
pub fn scan_catalog(repo: &Path) -> Result<CoverageIndex, CatalogError> {
    let sites_dir = repo.join("sites");
    if !sites_dir.is_dir() {
        return Err(CatalogError::MissingSitesDir(sites_dir));
    }

    let mut index = CoverageIndex::new();
    for site_dir in read_dir_sorted(&sites_dir)? {
        if !site_dir.is_dir() {
            continue;
        }
        let Some(site) = site_dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        for file in read_dir_sorted(&site_dir)? {
            let is_catalog = file
                .file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(CATALOG_SUFFIX));
            if !is_catalog {
                continue;
            }

            match read_catalog(&file) {
                Ok(channels) => {
                    let ids = channels
                        .iter()
                        .map(|c| c.xmltv_id().to_string())
                        .filter(|id| !id.is_empty());
                    index.entry(site.clone()).or_default().extend(ids);
                }
                Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable channel catalog"),
            }
        }
    }

    index.retain(|_, ids| !ids.is_empty());
    debug!(sites = index.len(), "channel catalogs scanned");
    Ok(index)
}

/// Parse every `<channel>` of a catalog file
pub fn read_catalog(path: &Path) -> Result<Vec<CatalogChannel>, CatalogError> {
    let bytes = fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(&bytes, path)
}

fn parse_catalog(bytes: &[u8], path: &Path) -> Result<Vec<CatalogChannel>, CatalogError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut channels = Vec::new();
    let mut current: Option<CatalogChannel> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"channel" => {
                current = Some(CatalogChannel {
                    attrs: attributes(e, reader.decoder()),
                    text: String::new(),
                });
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"channel" => {
                channels.push(CatalogChannel {
                    attrs: attributes(e, reader.decoder()),
                    text: String::new(),
                });
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut chan) = current {
                    chan.text.push_str(&decode_text(reader.decoder(), e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(ref mut chan) = current {
                    let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                    chan.text.push_str(&decode_xml_entities(&entity));
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"channel" => {
                if let Some(mut chan) = current.take() {
                    chan.text = chan.text.trim().to_string();
                    channels.push(chan);
                }
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(CatalogError::Xml {
                    path: path.to_path_buf(),
                    position: reader.buffer_position() as u64,
                    source,
                });
            }
            _ => {}
        }
    }

    Ok(channels)
}

fn attributes(e: &BytesStart, decoder: Decoder) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = decode_text(decoder, attr.key.as_ref()).into_owned();
            let value = decode_xml_entities(&decode_text(decoder, attr.value.as_ref()));
            (key, value)
        })
        .collect()
}

/// Write a custom channel list for one site, restricted to the wanted ids.
///
/// For each wanted canonical id the best-quality catalog entry is kept and
/// its `xmltv_id` rewritten to the playlist's original tvg-id, so the
/// grabbed guide lines up with the playlist exactly.
pub fn build_custom_channels(
    repo: &Path,
    site: &str,
    wanted: &WantedIds,
    out_path: &Path,
) -> Result<PathBuf, CatalogError> {
    if wanted.is_empty() {
        return Err(CatalogError::NoIds);
    }

    let src = repo
        .join("sites")
        .join(site)
        .join(format!("{site}{CATALOG_SUFFIX}"));
    if !src.exists() {
        return Err(CatalogError::MissingCatalog(src));
    }

    let mut best: BTreeMap<String, (u8, CatalogChannel)> = BTreeMap::new();
    for chan in read_catalog(&src)? {
        let xmltv_id = chan.xmltv_id();
        let key = canonical_id(xmltv_id);
        if key.is_empty() || !wanted.contains_key(&key) {
            continue;
        }
        let rank = quality_rank(xmltv_id);
        match best.get(&key) {
            Some((current, _)) if *current >= rank => {}
            _ => {
                best.insert(key, (rank, chan));
            }
        }
    }

    if best.is_empty() {
        return Err(CatalogError::NoMatch(src));
    }

    let channels: Vec<CatalogChannel> = best
        .into_iter()
        .map(|(key, (_, mut chan))| {
            if let Some(original) = wanted.original(&key) {
                chan.set_attr("xmltv_id", original);
            }
            chan
        })
        .collect();

    let io_err = |source| CatalogError::Io {
        path: out_path.to_path_buf(),
        source,
    };
    let xml = write_channels(&channels).map_err(io_err)?;
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(out_path, xml).map_err(io_err)?;
    debug!(site, kept = channels.len(), path = %out_path.display(), "custom channel list written");
    Ok(out_path.to_path_buf())
}

fn write_channels(channels: &[CatalogChannel]) -> std::io::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut events = vec![
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        Event::Start(BytesStart::new("channels")),
    ];
    for chan in channels {
        let mut start = BytesStart::new("channel");
        for (k, v) in &chan.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        events.push(Event::Start(start));
        events.push(Event::Text(BytesText::new(&chan.text)));
        events.push(Event::End(BytesEnd::new("channel")));
    }
    events.push(Event::End(BytesEnd::new("channels")));

    for event in events {
        writer.write_event(event)?;
    }
    Ok(writer.into_inner())
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}
