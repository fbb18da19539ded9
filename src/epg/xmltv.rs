//! XMLTV decoder
//! Streaming, pull-based parser: programmes are yielded one at a time and
//! nothing of the document tree is retained between them.
//! Supports both plain XML and gzip-compressed (.xml.gz) input

use std::borrow::Cow;
use std::io::Read;
use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use flate2::read::MultiGzDecoder;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

use crate::error::DecodeError;
use crate::models::Program;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static DATETIME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{14})").expect("static pattern"));

/// Decompress `bytes` if they are gzip (magic number, or a `.gz` hint such as
/// the source file name or URL). Anything else is passed through untouched.
pub fn decompress<'a>(bytes: &'a [u8], hint: Option<&str>) -> Result<Cow<'a, [u8]>, DecodeError> {
    let hinted = hint.is_some_and(|h| h.trim().to_ascii_lowercase().ends_with(".gz"));
    if !bytes.starts_with(&GZIP_MAGIC) && !hinted {
        return Ok(Cow::Borrowed(bytes));
    }

    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
    MultiGzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(DecodeError::Gzip)?;
    Ok(Cow::Owned(out))
}

/// Parse XMLTV time format: "20240115120000 +0100" -> Unix timestamp.
///
/// Without a `±HHMM` token the time is taken as UTC. Returns 0 when the
/// text has no 14-digit prefix or does not describe a valid instant.
pub fn parse_datetime(text: &str) -> i64 {
    let text = text.trim();
    let Some(caps) = DATETIME_PREFIX.captures(text) else {
        return 0;
    };
    let Ok(naive) = NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S") else {
        return 0;
    };

    match text.split_whitespace().nth(1) {
        Some(tz) if tz.len() == 5 && (tz.starts_with('+') || tz.starts_with('-')) => {
            parse_tz_offset(tz)
                .and_then(|offset| offset.from_local_datetime(&naive).single())
                .map(|dt| dt.timestamp())
                .unwrap_or(0)
        }
        _ => naive.and_utc().timestamp(),
    }
}

/// "+0100" / "-0530" -> fixed offset
fn parse_tz_offset(tz: &str) -> Option<FixedOffset> {
    let digits = tz.get(1..)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    let sign = if tz.starts_with('-') { -1 } else { 1 };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Lazily decode the programmes of an XMLTV document.
///
/// Single pass and forward only; call again on the same bytes to restart.
pub fn iter_programs(xml: &[u8]) -> Programs<'_> {
    Programs::new(xml)
}

/// Position and message of the XML error that ended a decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub position: u64,
    pub message: String,
}

/// What happened to every `<programme>` element seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub yielded: usize,
    pub dropped_missing_channel: usize,
    pub dropped_bad_time: usize,
    pub dropped_inverted: usize,
    pub syntax_error: Option<SyntaxError>,
}

impl DecodeReport {
    pub fn dropped(&self) -> usize {
        self.dropped_missing_channel + self.dropped_bad_time + self.dropped_inverted
    }

    /// Turn a recorded syntax error into a `DecodeError`
    pub fn check(&self) -> Result<(), DecodeError> {
        match &self.syntax_error {
            Some(e) => Err(DecodeError::Xml {
                position: e.position,
                message: e.message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Programme,
    Title,
    Desc,
}

#[derive(Debug, Default)]
struct PendingProgram {
    tvg_id: String,
    start: i64,
    stop: i64,
    title: Option<String>,
    desc: Option<String>,
}

impl PendingProgram {
    fn from_element(e: &BytesStart, decoder: Decoder) -> Self {
        Self {
            tvg_id: get_attribute(e, b"channel", decoder)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            start: get_attribute(e, b"start", decoder)
                .map(|s| parse_datetime(&s))
                .unwrap_or(0),
            stop: get_attribute(e, b"stop", decoder)
                .map(|s| parse_datetime(&s))
                .unwrap_or(0),
            title: None,
            desc: None,
        }
    }
}

/// Iterator over the programmes of one document, see [`iter_programs`]
pub struct Programs<'a> {
    reader: Reader<SanitizingBufReader<&'a [u8]>>,
    buf: Vec<u8>,
    text_buf: String,
    report: DecodeReport,
    done: bool,
}

impl<'a> Programs<'a> {
    fn new(xml: &'a [u8]) -> Self {
        Self {
            reader: Reader::from_reader(SanitizingBufReader::new(xml)),
            buf: Vec::with_capacity(8192),
            text_buf: String::new(),
            report: DecodeReport::default(),
            done: false,
        }
    }

    /// Counters for everything consumed so far
    pub fn report(&self) -> &DecodeReport {
        &self.report
    }

    pub fn into_report(self) -> DecodeReport {
        self.report
    }

    fn finish(&mut self, pending: PendingProgram) -> Option<Program> {
        if pending.tvg_id.is_empty() {
            self.report.dropped_missing_channel += 1;
            return None;
        }
        if pending.start == 0 || pending.stop == 0 {
            self.report.dropped_bad_time += 1;
            return None;
        }
        if pending.stop <= pending.start {
            self.report.dropped_inverted += 1;
            return None;
        }

        self.report.yielded += 1;
        Some(Program {
            tvg_id: pending.tvg_id,
            start: pending.start,
            stop: pending.stop,
            title: pending.title.unwrap_or_default(),
            desc: pending.desc.unwrap_or_default(),
        })
    }
}

impl Iterator for Programs<'_> {
    type Item = Program;

    fn next(&mut self) -> Option<Program> {
        if self.done {
            return None;
        }

        let mut state = ParserState::Root;
        let mut current: Option<PendingProgram> = None;

        loop {
            let position = self.reader.buffer_position() as u64;
            self.buf.clear();
            let completed = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) => {
                    match e.name().as_ref() {
                        b"programme" if state == ParserState::Root => {
                            current = Some(PendingProgram::from_element(e, self.reader.decoder()));
                            state = ParserState::Programme;
                        }
                        b"title" if state == ParserState::Programme => {
                            state = ParserState::Title;
                            self.text_buf.clear();
                        }
                        b"desc" if state == ParserState::Programme => {
                            state = ParserState::Desc;
                            self.text_buf.clear();
                        }
                        _ => {}
                    }
                    None
                }
                Ok(Event::Empty(ref e)) => {
                    if state == ParserState::Root && e.name().as_ref() == b"programme" {
                        Some(PendingProgram::from_element(e, self.reader.decoder()))
                    } else {
                        None
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if matches!(state, ParserState::Title | ParserState::Desc) {
                        let text = decode_text(self.reader.decoder(), e.as_ref());
                        self.text_buf.push_str(&text);
                    }
                    None
                }
                Ok(Event::CData(ref e)) => {
                    if matches!(state, ParserState::Title | ParserState::Desc) {
                        let text = decode_text(self.reader.decoder(), e.as_ref());
                        self.text_buf.push_str(&text);
                    }
                    None
                }
                Ok(Event::GeneralRef(ref e)) => {
                    if matches!(state, ParserState::Title | ParserState::Desc) {
                        let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                        self.text_buf.push_str(&decode_xml_entities(&entity));
                    }
                    None
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"programme" if state == ParserState::Programme => {
                        state = ParserState::Root;
                        current.take()
                    }
                    b"title" if state == ParserState::Title => {
                        if let Some(ref mut prog) = current {
                            // first <title> wins
                            if prog.title.is_none() {
                                prog.title = Some(self.text_buf.trim().to_string());
                            }
                        }
                        state = ParserState::Programme;
                        None
                    }
                    b"desc" if state == ParserState::Desc => {
                        if let Some(ref mut prog) = current {
                            if prog.desc.is_none() {
                                prog.desc = Some(self.text_buf.trim().to_string());
                            }
                        }
                        state = ParserState::Programme;
                        None
                    }
                    _ => None,
                },
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.report.syntax_error = Some(SyntaxError {
                        position,
                        message: e.to_string(),
                    });
                    self.done = true;
                    return None;
                }
                _ => None,
            };

            if let Some(pending) = completed {
                if let Some(program) = self.finish(pending) {
                    return Some(program);
                }
            }
        }
    }
}

/// BufRead wrapper that filters out illegal XML 1.0 characters on read
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// Bare ampersands are escaped so a stray `&` in a title does not end the stream
struct SanitizingBufReader<R> {
    inner: R,
    buffer: Vec<u8>,
    /// Bytes at the front of `buffer` held back from the previous read
    carry: usize,
    out_buffer: Vec<u8>,
    pos: usize,
    filled: usize,
}

/// Longest entity reference that is recognised
const MAX_ENTITY_LEN: usize = 10;

impl<R: Read> SanitizingBufReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; 64 * 1024],
            carry: 0,
            out_buffer: Vec::with_capacity(96 * 1024),
            pos: 0,
            filled: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F | 0x7F => 0x20,
            _ => b,
        }
    }

    fn refill_buffer(&mut self) -> std::io::Result<()> {
        self.out_buffer.clear();

        loop {
            let n = self.inner.read(&mut self.buffer[self.carry..])?;
            let end = self.carry + n;

            // An unterminated reference at the end of the chunk may finish in the next one
            let mut limit = end;
            if n > 0 {
                let window = end.saturating_sub(MAX_ENTITY_LEN);
                if let Some(amp) = self.buffer[window..end].iter().rposition(|&b| b == b'&') {
                    if !self.buffer[window + amp..end].contains(&b';') {
                        limit = window + amp;
                    }
                }
            }

            for i in 0..limit {
                let b = Self::sanitize_byte(self.buffer[i]);
                if b == b'&' && !Self::is_valid_entity_start(&self.buffer[i..end]) {
                    self.out_buffer.extend_from_slice(b"&amp;");
                    continue;
                }
                self.out_buffer.push(b);
            }

            self.buffer.copy_within(limit..end, 0);
            self.carry = end - limit;

            if n == 0 || !self.out_buffer.is_empty() {
                break;
            }
        }

        self.pos = 0;
        self.filled = self.out_buffer.len();
        Ok(())
    }

    /// Check if bytes starting with & look like a valid XML entity
    fn is_valid_entity_start(bytes: &[u8]) -> bool {
        if bytes.len() < 2 {
            return false;
        }
        if bytes[1] == b'#' {
            return true;
        }

        let mut end = 1;
        while end < bytes.len() && end < MAX_ENTITY_LEN {
            match bytes[end] {
                b';' => return end > 1,
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
                _ => return false,
            }
        }
        false
    }
}

impl<R: Read> Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
            if self.filled == 0 {
                return Ok(0);
            }
        }

        let to_copy = (self.filled - self.pos).min(buf.len());
        buf[..to_copy].copy_from_slice(&self.out_buffer[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}

impl<R: Read> std::io::BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
        }
        Ok(&self.out_buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Decode XML entities in a single pass. Unknown or malformed
/// references are kept literally.
pub(crate) fn decode_xml_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| resolve_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Text in the document's declared encoding as UTF-8. Bytes that are
/// invalid in that encoding become U+FFFD.
pub(crate) fn decode_text(decoder: Decoder, bytes: &[u8]) -> Cow<'_, str> {
    decoder
        .decode(bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes))
}

/// Get attribute value from XML element, entity references resolved
pub(crate) fn get_attribute(e: &BytesStart, name: &[u8], decoder: Decoder) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            return Some(decode_xml_entities(&decode_text(decoder, attr.value.as_ref())));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        chrono::Utc
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp()
    }

    #[test]
    fn test_parse_datetime_offsets() {
        let six_utc = utc(2024, 1, 1, 6, 0, 0);
        assert_eq!(parse_datetime("20240101060000 +0000"), six_utc);
        assert_eq!(parse_datetime("20240101060000"), six_utc);
        assert_eq!(parse_datetime("20240101010000 -0500"), six_utc);
        assert_eq!(parse_datetime("20240101073000 +0130"), six_utc);

        let ts1 = parse_datetime("20240115120000 +0100");
        let ts2 = parse_datetime("20240115120000 +0000");
        assert_eq!(ts2 - ts1, 3600);
    }

    #[test]
    fn test_parse_datetime_unparseable() {
        assert_eq!(parse_datetime(""), 0);
        assert_eq!(parse_datetime("not-a-date"), 0);
        assert_eq!(parse_datetime("2024010106"), 0);
        assert_eq!(parse_datetime("20241301060000 +0000"), 0);
        assert_eq!(parse_datetime("20240101060000 +01ab"), 0);
    }

    #[test]
    fn test_parse_datetime_ignores_non_offset_suffix() {
        // only a 5-char signed token counts as an offset
        assert_eq!(parse_datetime("20240101060000 UTC"), utc(2024, 1, 1, 6, 0, 0));
        assert_eq!(parse_datetime("  20240101060000  "), utc(2024, 1, 1, 6, 0, 0));
    }

    #[test]
    fn test_decompress_passthrough_and_gzip() {
        let xml = b"<tv></tv>".to_vec();
        assert!(matches!(decompress(&xml, None).unwrap(), Cow::Borrowed(_)));

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&xml).unwrap();
        let gz = enc.finish().unwrap();

        assert_eq!(decompress(&gz, None).unwrap().as_ref(), xml.as_slice());
        assert_eq!(decompress(&gz, Some("guide.xml.gz")).unwrap().as_ref(), xml.as_slice());
    }

    #[test]
    fn test_decompress_rejects_bad_gzip() {
        // plain bytes with a gzip hint
        assert!(matches!(
            decompress(b"<tv></tv>", Some("http://host/guide.XML.GZ")),
            Err(DecodeError::Gzip(_))
        ));

        let payload = "<tv>".to_string() + &"<programme/>".repeat(2000) + "</tv>";
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload.as_bytes()).unwrap();
        let gz = enc.finish().unwrap();
        let truncated = &gz[..gz.len() / 2];
        assert!(decompress(truncated, None).is_err());
    }

    #[test]
    fn test_iter_programs_basic() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="bbc1"><display-name>BBC One</display-name></channel>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel=" bbc1 ">
    <title>News at Noon</title>
    <desc>Daily news broadcast</desc>
    <category>News</category>
  </programme>
</tv>"#;

        let programs: Vec<Program> = iter_programs(xml).collect();
        assert_eq!(programs.len(), 1);
        let p = &programs[0];
        assert_eq!(p.tvg_id, "bbc1");
        assert_eq!(p.title, "News at Noon");
        assert_eq!(p.desc, "Daily news broadcast");
        assert_eq!(p.stop - p.start, 3600);
    }

    #[test]
    fn test_iter_programs_declared_latin1() {
        let mut xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<tv>\n".to_vec();
        xml.extend_from_slice(
            b"<programme start=\"20240101060000 +0000\" stop=\"20240101070000 +0000\" channel=\"T\xe9l\xe9.fr\">\
              <title>Journal \xe9t\xe9</title><desc><![CDATA[R\xe9sum\xe9]]></desc></programme>\n",
        );
        xml.extend_from_slice(
            b"<programme start=\"20240101070000 +0000\" stop=\"20240101080000 +0000\" channel=\"tf1.fr\">\
              <title>Journal \xe9t\xe9</title></programme>\n</tv>",
        );

        let mut programs = iter_programs(&xml);
        let decoded: Vec<Program> = programs.by_ref().collect();
        assert_eq!(programs.report().dropped(), 0);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].tvg_id, "Télé.fr");
        assert_eq!(decoded[0].title, "Journal été");
        assert_eq!(decoded[0].desc, "Résumé");
        assert_eq!(decoded[1].tvg_id, "tf1.fr");
        assert_eq!(decoded[1].title, "Journal été");
    }

    #[test]
    fn test_iter_programs_skips_missing_channel() {
        let xml = br#"<tv>
  <programme start="20240115120000" stop="20240115130000" channel="ch1"><title>Kept</title></programme>
  <programme start="20240115130000" stop="20240115140000"><title>No channel</title></programme>
</tv>"#;

        let mut iter = iter_programs(xml);
        let programs: Vec<Program> = iter.by_ref().collect();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Kept");
        assert_eq!(iter.report().dropped_missing_channel, 1);
        assert_eq!(iter.report().yielded, 1);
    }

    #[test]
    fn test_iter_programs_drop_accounting() {
        let xml = br#"<tv>
  <programme start="garbage" stop="20240115130000" channel="a"/>
  <programme start="20240115130000" stop="20240115120000" channel="a"/>
  <programme start="20240115120000" stop="20240115130000" channel="a"/>
</tv>"#;

        let mut iter = iter_programs(xml);
        let programs: Vec<Program> = iter.by_ref().collect();
        assert_eq!(programs.len(), 1);
        // self-closing programme has no children
        assert_eq!(programs[0].title, "");
        assert_eq!(programs[0].desc, "");

        let report = iter.into_report();
        assert_eq!(report.dropped_bad_time, 1);
        assert_eq!(report.dropped_inverted, 1);
        assert_eq!(report.dropped(), 2);
        assert!(report.check().is_ok());
    }

    #[test]
    fn test_iter_programs_entities_and_bare_ampersand() {
        let xml = br#"<tv>
  <programme start="20240115120000" stop="20240115130000" channel="ch1">
    <title>Tom &amp; Jerry</title>
    <desc>Fish & Chips &#233;t&#xE9;</desc>
  </programme>
</tv>"#;

        let programs: Vec<Program> = iter_programs(xml).collect();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Tom & Jerry");
        assert_eq!(programs[0].desc, "Fish & Chips été");
    }

    #[test]
    fn test_iter_programs_first_title_wins() {
        let xml = br#"<tv>
  <programme start="20240115120000" stop="20240115130000" channel="ch1">
    <title lang="en">English</title>
    <title lang="fr">Francais</title>
  </programme>
</tv>"#;

        let programs: Vec<Program> = iter_programs(xml).collect();
        assert_eq!(programs[0].title, "English");
    }

    #[test]
    fn test_iter_programs_syntax_error_ends_stream() {
        let xml = br#"<tv>
  <programme start="20240115120000" stop="20240115130000" channel="ch1"><title>One</title></programme>
  <programme start="20240115130000" stop="20240115140000" channel="ch1"><title>Two</desc></programme>
</tv>"#;

        let mut iter = iter_programs(xml);
        let programs: Vec<Program> = iter.by_ref().collect();
        assert_eq!(programs.len(), 1);
        assert!(iter.report().syntax_error.is_some());
        assert!(matches!(iter.report().check(), Err(DecodeError::Xml { .. })));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_programs_is_restartable() {
        let xml = br#"<tv><programme start="20240115120000" stop="20240115130000" channel="x"/></tv>"#;
        assert_eq!(iter_programs(xml).count(), 1);
        assert_eq!(iter_programs(xml).count(), 1);
    }

    #[test]
    fn test_decode_xml_entities() {
        assert_eq!(decode_xml_entities("a &lt;b&gt; &quot;c&apos;"), "a <b> \"c'");
        assert_eq!(decode_xml_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_xml_entities("AT&T &unknown; &#65;"), "AT&T &unknown; A");
    }

    #[test]
    fn test_sanitizer_keeps_entity_split_across_reads() {
        let mut input = vec![b'x'; 64 * 1024 - 2];
        input.extend_from_slice(b"&amp; and AT&T &#65;");

        let mut out = Vec::new();
        SanitizingBufReader::new(input.as_slice())
            .read_to_end(&mut out)
            .unwrap();

        assert_eq!(out.len(), 64 * 1024 - 2 + "&amp; and AT&amp;T &#65;".len());
        assert!(out.ends_with(b"&amp; and AT&amp;T &#65;"));
    }

    #[test]
    fn test_sanitizer_replaces_control_bytes() {
        let mut out = Vec::new();
        SanitizingBufReader::new(&b"a\x01b\tc&"[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"a b\tc&amp;");
    }
}
