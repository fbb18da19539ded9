//! Merge several XMLTV documents into one
//!
//! `<channel>` elements are deduplicated by `id` (first one wins),
//! `<programme>` elements are concatenated as-is. Elements are copied event
//! by event, so only the merged output is held in memory. Inputs may use any
//! declared encoding; the output is always UTF-8.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::{debug, info};

use super::xmltv::{decode_text, get_attribute};
use crate::error::MergeError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub channels: usize,
    pub programmes: usize,
    /// Inputs that were missing or empty
    pub skipped_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Channel,
    Programme,
    Skip,
}

/// Incremental merger; feed documents with [`GuideMerger::add_document`]
pub struct GuideMerger {
    channels: Writer<Vec<u8>>,
    programmes: Writer<Vec<u8>>,
    seen_channels: HashSet<String>,
    report: MergeReport,
}

impl Default for GuideMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl GuideMerger {
    pub fn new() -> Self {
        Self {
            channels: Writer::new(Vec::new()),
            programmes: Writer::new(Vec::new()),
            seen_channels: HashSet::new(),
            report: MergeReport::default(),
        }
    }

    pub fn report(&self) -> &MergeReport {
        &self.report
    }

    /// Copy the channels and programmes of one document. On error the
    /// merger must be discarded.
    pub fn add_document(&mut self, xml: &[u8]) -> Result<(), MergeError> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut capture: Option<Capture> = None;

        loop {
            buf.clear();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| MergeError::Xml {
                    position: reader.buffer_position() as u64,
                    source,
                })?;
            // the declaration may switch the encoding, so ask per event
            let decoder = reader.decoder();

            match event {
                Event::Eof => break,
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 {
                        capture = Some(self.classify(&e, decoder));
                    }
                    self.copy(capture, Event::Start(e), decoder)?;
                }
                Event::End(e) => {
                    self.copy(capture, Event::End(e), decoder)?;
                    if depth == 2 {
                        self.line_break(capture)?;
                        capture = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Empty(e) => {
                    if depth == 1 {
                        let kind = self.classify(&e, decoder);
                        self.copy(Some(kind), Event::Empty(e), decoder)?;
                        self.line_break(Some(kind))?;
                    } else {
                        self.copy(capture, Event::Empty(e), decoder)?;
                    }
                }
                Event::Decl(_) | Event::DocType(_) | Event::PI(_) => {}
                other => {
                    if depth >= 2 {
                        self.copy(capture, other, decoder)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Assemble the merged document: declaration, `<tv>`, all channels,
    /// then all programmes.
    pub fn finish(self) -> Result<(Vec<u8>, MergeReport), MergeError> {
        let mut out = Writer::new(Vec::new());
        out.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(MergeError::Write)?;
        out.get_mut().push(b'\n');
        out.write_event(Event::Start(BytesStart::new("tv")))
            .map_err(MergeError::Write)?;
        out.get_mut().push(b'\n');
        out.get_mut().extend_from_slice(&self.channels.into_inner());
        out.get_mut().extend_from_slice(&self.programmes.into_inner());
        out.write_event(Event::End(BytesEnd::new("tv")))
            .map_err(MergeError::Write)?;
        out.get_mut().push(b'\n');
        Ok((out.into_inner(), self.report))
    }

    fn classify(&mut self, e: &BytesStart, decoder: Decoder) -> Capture {
        match e.name().as_ref() {
            b"channel" => {
                let id = get_attribute(e, b"id", decoder)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                if id.is_empty() || !self.seen_channels.insert(id) {
                    return Capture::Skip;
                }
                self.report.channels += 1;
                Capture::Channel
            }
            b"programme" => {
                self.report.programmes += 1;
                Capture::Programme
            }
            _ => Capture::Skip,
        }
    }

    fn target(&mut self, capture: Option<Capture>) -> Option<&mut Writer<Vec<u8>>> {
        match capture? {
            Capture::Channel => Some(&mut self.channels),
            Capture::Programme => Some(&mut self.programmes),
            Capture::Skip => None,
        }
    }

    fn copy(
        &mut self,
        capture: Option<Capture>,
        event: Event<'_>,
        decoder: Decoder,
    ) -> Result<(), MergeError> {
        match self.target(capture) {
            Some(writer) => writer
                .write_event(to_utf8(event, decoder))
                .map_err(MergeError::Write),
            None => Ok(()),
        }
    }

    fn line_break(&mut self, capture: Option<Capture>) -> Result<(), MergeError> {
        match self.target(capture) {
            Some(writer) => writer
                .write_event(Event::Text(BytesText::from_escaped("\n")))
                .map_err(MergeError::Write),
            None => Ok(()),
        }
    }
}

/// Re-encode an event read from a document in `decoder`'s encoding.
/// Markup stays escaped exactly as it was written.
fn to_utf8<'a>(event: Event<'a>, decoder: Decoder) -> Event<'a> {
    match event {
        Event::Start(e) => Event::Start(start_to_utf8(&e, decoder)),
        Event::Empty(e) => Event::Empty(start_to_utf8(&e, decoder)),
        Event::End(e) => {
            let name = decode_text(decoder, e.name().as_ref()).into_owned();
            Event::End(BytesEnd::new(name))
        }
        Event::Text(e) => Event::Text(BytesText::from_escaped(decode_text(decoder, &e).into_owned())),
        Event::Comment(e) => {
            Event::Comment(BytesText::from_escaped(decode_text(decoder, &e).into_owned()))
        }
        Event::CData(e) => Event::CData(BytesCData::new(decode_text(decoder, &e).into_owned())),
        Event::GeneralRef(e) => Event::GeneralRef(BytesRef::new(decode_text(decoder, &e).into_owned())),
        other => other,
    }
}

fn start_to_utf8(e: &BytesStart<'_>, decoder: Decoder) -> BytesStart<'static> {
    let name_len = decode_text(decoder, e.name().as_ref()).len();
    BytesStart::from_content(decode_text(decoder, e).into_owned(), name_len)
}

/// Merge the given documents in memory. Missing or empty files are skipped.
pub fn merge_to_bytes(files: &[PathBuf]) -> Result<(Vec<u8>, MergeReport), MergeError> {
    let mut merger = GuideMerger::new();
    let mut skipped = Vec::new();

    for path in files {
        let usable = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if !usable {
            debug!(path = %path.display(), "skipping missing or empty guide");
            skipped.push(path.clone());
            continue;
        }

        let xml = fs::read(path).map_err(|source| MergeError::Io {
            path: path.clone(),
            source,
        })?;
        merger.add_document(&xml).map_err(|source| MergeError::InFile {
            path: path.clone(),
            source: Box::new(source),
        })?;
    }

    let (bytes, mut report) = merger.finish()?;
    report.skipped_files = skipped;
    Ok((bytes, report))
}

/// Merge the given documents into `out`
pub fn merge_xmltv(files: &[PathBuf], out: &Path) -> Result<MergeReport, MergeError> {
    let (bytes, report) = merge_to_bytes(files)?;

    let io_err = |source| MergeError::Io {
        path: out.to_path_buf(),
        source,
    };
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(out, bytes).map_err(io_err)?;

    info!(
        channels = report.channels,
        programmes = report.programmes,
        out = %out.display(),
        "guide merge complete"
    );
    Ok(report)
}
