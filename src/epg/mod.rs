//! EPG (Electronic Program Guide) module
//!
//! Decoding, source selection, merging and loading of XMLTV guides.

pub mod catalog;
pub mod coverage;
pub mod grab;
pub mod ingest;
pub mod merge;
pub mod xmltv;

// Re-export public types
pub use catalog::{build_custom_channels, quality_rank, scan_catalog};
pub use coverage::{
    canonical_id, select_sources, CoverageIndex, CoverageReport, Selection, WantedIds,
    DEFAULT_MAX_SOURCES,
};
pub use grab::{generate_xmltv, GrabJob, GrabOptions, GrabOutcome, Grabber, SkipEvent, SkipKind};
pub use ingest::{
    fetch_xmltv, ingest_file, ingest_url, ingest_xmltv, DownloadConfig, IngestReport,
    ProgressCallback,
};
pub use merge::{merge_xmltv, GuideMerger, MergeReport};
pub use xmltv::{decompress, iter_programs, parse_datetime, DecodeReport, Programs};

use chrono::{Local, TimeZone};

/// Format a Unix timestamp as local time HH:MM
pub fn format_time(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// Format a Unix timestamp as local datetime YYYY-MM-DD HH:MM
pub fn format_datetime(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("@{}", ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_datetime_shape() {
        let text = format_datetime(1_704_067_200);
        assert_eq!(text.len(), 16);
        assert_eq!(&text[4..5], "-");
        assert_eq!(format_time(1_704_067_200).len(), 5);
    }

    #[test]
    fn test_format_out_of_range() {
        assert_eq!(format_time(i64::MAX), "--:--");
        assert_eq!(format_datetime(i64::MAX), format!("@{}", i64::MAX));
    }
}
