//! Tests for the SQLite store

use crate::epg::canonical_id;
use crate::models::{Channel, Program};
use crate::storage::*;
use rusqlite::Connection;
use tempfile::TempDir;

fn store() -> (TempDir, Store) {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path().join("nested").join("iptv.db")).unwrap();
    (tmp, store)
}

fn program(tvg_id: &str, start: i64, stop: i64, title: &str) -> Program {
    Program {
        tvg_id: tvg_id.to_string(),
        start,
        stop,
        title: title.to_string(),
        desc: String::new(),
    }
}

fn channel(name: &str, tvg_id: &str) -> Channel {
    Channel {
        name: name.to_string(),
        tvg_id: tvg_id.to_string(),
        url: format!("http://example.com/{}.ts", name),
        extinf: format!("#EXTINF:-1 tvg-id=\"{}\",{}", tvg_id, name),
        ..Channel::default()
    }
}

#[test]
fn test_open_is_idempotent() {
    let (tmp, store) = store();
    let id = store.add_playlist("A", "http://a").unwrap();
    let reopened = Store::open(store.path()).unwrap();
    assert_eq!(reopened.list_playlists().unwrap()[0].id, id);
    drop(tmp);
}

#[test]
fn test_playlists_newest_first() {
    let (_tmp, store) = store();
    let first = store.add_playlist("First", "http://one").unwrap();
    let second = store.add_playlist("Second", "http://two").unwrap();

    let playlists = store.list_playlists().unwrap();
    assert_eq!(playlists.len(), 2);
    assert_eq!(playlists[0].id, second);
    assert_eq!(playlists[1].id, first);
    assert_eq!(playlists[1].epg_url, None);

    store.update_playlist(first, "Renamed", "http://new").unwrap();
    store.set_playlist_epg_url(first, Some("http://guide.xml")).unwrap();
    let renamed = store.list_playlists().unwrap().pop().unwrap();
    assert_eq!(renamed.name, "Renamed");
    assert_eq!(renamed.url, "http://new");
    assert_eq!(renamed.epg_url.as_deref(), Some("http://guide.xml"));
}

#[test]
fn test_replace_channels_keeps_order_and_options() {
    let (_tmp, store) = store();
    let id = store.add_playlist("P", "http://p").unwrap();

    let mut first = channel("One", "one.tv");
    first.group = "News".to_string();
    first.options = vec!["#EXTVLCOPT:http-user-agent=Foo".to_string()];
    store
        .replace_channels(id, &[first.clone(), channel("Two", "")])
        .unwrap();

    let channels = store.get_channels(id).unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0], first);
    assert_eq!(channels[1].name, "Two");
    assert!(channels[1].options.is_empty());

    // second replace discards the first set
    store.replace_channels(id, &[channel("Three", "three.tv")]).unwrap();
    let channels = store.get_channels(id).unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name, "Three");
}

#[test]
fn test_delete_playlist_cascades() {
    let (_tmp, store) = store();
    let keep = store.add_playlist("Keep", "http://k").unwrap();
    let gone = store.add_playlist("Gone", "http://g").unwrap();
    store.replace_channels(keep, &[channel("K", "k")]).unwrap();
    store
        .replace_channels(gone, &[channel("G1", "g1"), channel("G2", "g2")])
        .unwrap();

    store.delete_playlist(gone).unwrap();
    assert!(store.get_channels(gone).unwrap().is_empty());
    assert_eq!(store.get_channels(keep).unwrap().len(), 1);
    assert_eq!(store.list_playlists().unwrap().len(), 1);

    // unknown id is a no-op
    store.delete_playlist(gone).unwrap();
    store.delete_playlist(9999).unwrap();
}

#[test]
fn test_channels_need_existing_playlist() {
    let (_tmp, store) = store();
    assert!(store.replace_channels(42, &[channel("Orphan", "o")]).is_err());
}

#[test]
fn test_playlist_tvg_ids_are_distinct() {
    let (_tmp, store) = store();
    let id = store.add_playlist("P", "http://p").unwrap();
    store
        .replace_channels(
            id,
            &[
                channel("A", "b.tv"),
                channel("B", ""),
                channel("C", "a.tv"),
                channel("D", "b.tv"),
            ],
        )
        .unwrap();
    assert_eq!(store.playlist_tvg_ids(id).unwrap(), vec!["b.tv", "a.tv"]);
}

#[test]
fn test_epg_sources_toggle() {
    let (_tmp, store) = store();
    let a = store.add_epg_source("A", "http://a/guide.xml", true).unwrap();
    let b = store.add_epg_source("B", "http://b/guide.xml.gz", true).unwrap();

    store.set_epg_source_enabled(a, false).unwrap();
    let enabled = store.list_epg_sources(true).unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, b);

    let all = store.list_epg_sources(false).unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all.iter().find(|s| s.id == a).unwrap().enabled);
}

#[test]
fn test_now_next() {
    let (_tmp, store) = store();
    store
        .upsert_epg_programs(
            vec![
                program("X", 100, 200, "A"),
                program("X", 200, 300, "B"),
                program("Y", 100, 400, "Other"),
            ],
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

    let (now, next) = store.get_now_next("X", 150).unwrap();
    assert_eq!(now.unwrap().title, "A");
    assert_eq!(next.unwrap().title, "B");

    // stop is exclusive
    let (now, next) = store.get_now_next("X", 200).unwrap();
    assert_eq!(now.unwrap().title, "B");
    assert!(next.is_none());

    let (now, next) = store.get_now_next("X", 250).unwrap();
    assert_eq!(now.unwrap().title, "B");
    assert!(next.is_none());

    let (now, next) = store.get_now_next("X", 50).unwrap();
    assert!(now.is_none());
    assert_eq!(next.unwrap().title, "A");

    // both partially overlap the window
    let titles: Vec<String> = store
        .list_epg_programs("X", 150, 250, 10)
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["A", "B"]);
}

#[test]
fn test_now_prefers_latest_start_on_overlap() {
    let (_tmp, store) = store();
    store
        .upsert_epg_programs(
            vec![program("X", 0, 1000, "Block"), program("X", 500, 600, "Insert")],
            10,
        )
        .unwrap();
    let (now, _) = store.get_now_next("X", 550).unwrap();
    assert_eq!(now.unwrap().title, "Insert");
}

#[test]
fn test_lookup_is_exact_match() {
    let (_tmp, store) = store();
    store
        .upsert_epg_programs(vec![program("X@HD", 0, 100, "Show")], 10)
        .unwrap();

    // coverage treats these as the same channel, storage does not
    assert_eq!(canonical_id("X@HD"), canonical_id("x"));
    assert_eq!(store.get_now_next("x", 50).unwrap(), (None, None));
    assert_eq!(store.get_now_next("X", 50).unwrap(), (None, None));
    assert!(store.get_now_next("X@HD", 50).unwrap().0.is_some());
}

#[test]
fn test_list_window() {
    let (_tmp, store) = store();
    let programs: Vec<Program> = (0..10)
        .map(|i| program("X", i * 100, i * 100 + 100, &format!("P{}", i)))
        .collect();
    store.upsert_epg_programs(programs, 3).unwrap();

    // overlaps [250, 450): P2, P3, P4
    let window = store.list_epg_programs("X", 250, 450, DEFAULT_GUIDE_LIMIT).unwrap();
    let titles: Vec<&str> = window.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["P2", "P3", "P4"]);

    // edges are half-open
    let window = store.list_epg_programs("X", 300, 400, DEFAULT_GUIDE_LIMIT).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].title, "P3");

    let limited = store.list_epg_programs("X", 0, 1000, 4).unwrap();
    assert_eq!(limited.len(), 4);
    assert_eq!(limited[3].title, "P3");

    assert!(store.list_epg_programs("", 0, 1000, 10).unwrap().is_empty());
    assert!(store.list_epg_programs("Y", 0, 1000, 10).unwrap().is_empty());
}

#[test]
fn test_chunk_size_does_not_change_result() {
    let programs: Vec<Program> = (0..12_345i64)
        .map(|i| program(&format!("ch{}", i % 7), i * 10, i * 10 + 5, &format!("T{}", i)))
        .collect();

    let (_tmp_a, big) = store();
    let (_tmp_b, small) = store();
    assert_eq!(big.upsert_epg_programs(programs.clone(), 5000).unwrap(), 12_345);
    assert_eq!(small.upsert_epg_programs(programs, 1).unwrap(), 12_345);
    assert_eq!(big.epg_program_count().unwrap(), 12_345);
    assert_eq!(small.epg_program_count().unwrap(), 12_345);

    for ch in 0..7 {
        let id = format!("ch{}", ch);
        let a = big.list_epg_programs(&id, 0, i64::MAX, usize::MAX).unwrap();
        let b = small.list_epg_programs(&id, 0, i64::MAX, usize::MAX).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}

#[test]
fn test_zero_chunk_size_is_clamped() {
    let (_tmp, store) = store();
    let inserted = store
        .upsert_epg_programs(vec![program("X", 0, 1, "a"), program("X", 1, 2, "b")], 0)
        .unwrap();
    assert_eq!(inserted, 2);
}

#[test]
fn test_upsert_appends_and_replace_clears() {
    let (_tmp, store) = store();
    let batch = || vec![program("X", 0, 100, "Show")];

    store.upsert_epg_programs(batch(), 10).unwrap();
    store.upsert_epg_programs(batch(), 10).unwrap();
    assert_eq!(store.epg_program_count().unwrap(), 2);

    store.replace_epg_programs(batch(), 10).unwrap();
    assert_eq!(store.epg_program_count().unwrap(), 1);

    store.clear_epg().unwrap();
    assert_eq!(store.epg_program_count().unwrap(), 0);
    assert_eq!(store.upsert_epg_programs(Vec::new(), 10).unwrap(), 0);
}

#[test]
fn test_schema_uses_wal_and_indexes() {
    let (_tmp, store) = store();
    let conn = Connection::open(store.path()).unwrap();

    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name")
        .unwrap();
    let indexes: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        indexes,
        vec!["idx_channels_playlist", "idx_channels_tvgid", "idx_epg_tvg_start"]
    );

    // now/next lookups go through the (tvg_id, start_ts) index
    let mut stmt = conn
        .prepare(
            "EXPLAIN QUERY PLAN SELECT * FROM epg_programs \
             WHERE tvg_id = ?1 AND start_ts <= ?2 AND stop_ts > ?2 \
             ORDER BY start_ts DESC LIMIT 1",
        )
        .unwrap();
    let plan: Vec<String> = stmt
        .query_map(rusqlite::params!["X", 0], |row| row.get(3))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(
        plan.iter().any(|detail| detail.contains("idx_epg_tvg_start")),
        "{:?}",
        plan
    );
}

#[test]
fn test_reads_proceed_while_writer_holds_lock() {
    let (_tmp, store) = store();
    store
        .upsert_epg_programs(vec![program("X", 0, 100, "Committed")], 10)
        .unwrap();

    let writer = Connection::open(store.path()).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE").unwrap();
    writer
        .execute(
            "INSERT INTO epg_programs (tvg_id, start_ts, stop_ts, title, description) \
             VALUES ('X', 100, 200, 'Pending', '')",
            [],
        )
        .unwrap();

    let (now, next) = store.get_now_next("X", 50).unwrap();
    assert_eq!(now.unwrap().title, "Committed");
    assert!(next.is_none());

    writer.execute_batch("COMMIT").unwrap();
    let (_, next) = store.get_now_next("X", 50).unwrap();
    assert_eq!(next.unwrap().title, "Pending");
}
