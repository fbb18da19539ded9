//! Tests for M3U playlist import and export

use crate::m3u_parser::*;
use crate::models::Channel;

#[test]
fn test_parse_m3u() {
    let content = r#"
#EXTM3U
#EXTINF:-1 tvg-id="cnn" group-title="News",CNN
http://example.com/live/1.ts
#EXTINF:-1 tvg-id="bbc" group-title="News",BBC
http://example.com/live/2.ts
"#;
    let channels = parse_m3u(content);
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].name, "CNN");
    assert_eq!(channels[0].group, "News");
    assert_eq!(channels[0].tvg_id, "cnn");
    assert_eq!(channels[1].url, "http://example.com/live/2.ts");
    assert_eq!(
        channels[1].extinf,
        r#"#EXTINF:-1 tvg-id="bbc" group-title="News",BBC"#
    );
}

#[test]
fn test_parse_m3u_with_epg_url() {
    let content = r#"#EXTM3U x-tvg-url="http://example.com/epg.xml"
#EXTINF:-1 tvg-id="ch1" tvg-name="Channel One" group-title="General",Channel 1
http://example.com/1.ts
"#;
    let playlist = parse_m3u_playlist(content);
    assert_eq!(playlist.epg_url.as_deref(), Some("http://example.com/epg.xml"));
    assert_eq!(playlist.channels.len(), 1);
    assert_eq!(playlist.channels[0].name, "Channel 1");
}

#[test]
fn test_parse_url_tvg_header() {
    let playlist = parse_m3u_playlist("#EXTM3U URL-TVG=\"http://g/guide.xml.gz\"\n");
    assert_eq!(playlist.epg_url.as_deref(), Some("http://g/guide.xml.gz"));
    assert!(playlist.channels.is_empty());

    assert_eq!(parse_m3u_playlist("#EXTM3U\n").epg_url, None);
}

#[test]
fn test_parse_attrs_unquoted() {
    let content = r#"#EXTM3U
#EXTINF:-1 tvg-id=unquoted group-title="Quoted Group",Test Channel
http://example.com/stream.ts
"#;
    let channels = parse_m3u(content);
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].tvg_id, "unquoted");
    assert_eq!(channels[0].group, "Quoted Group");
}

#[test]
fn test_parse_vlc_options_in_order() {
    let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="a",A
#EXTVLCOPT:http-user-agent=Foo
#EXTVLCOPT:http-referrer=http://ref/
http://example.com/a.ts
#EXTINF:-1,B
http://example.com/b.ts
"#;
    let channels = parse_m3u(content);
    assert_eq!(
        channels[0].options,
        vec![
            "#EXTVLCOPT:http-user-agent=Foo".to_string(),
            "#EXTVLCOPT:http-referrer=http://ref/".to_string(),
        ]
    );
    assert!(channels[1].options.is_empty());
    assert_eq!(channels[1].tvg_id, "");
}

#[test]
fn test_parse_skips_orphan_urls_and_comments() {
    let content = r#"#EXTM3U
http://example.com/orphan.ts
#EXTGRP:Ignored
#EXTINF:-1 group-title="Sports, Live",Match
# a comment
http://example.com/match.ts
"#;
    let channels = parse_m3u(content);
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name, "Match");
    assert_eq!(channels[0].group, "Sports, Live");
}

#[test]
fn test_write_m3u_round_trip() {
    let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="a" group-title="G",A
#EXTVLCOPT:http-user-agent=Foo
http://example.com/a.ts
#EXTINF:-1,B
http://example.com/b.ts
"#;
    let channels = parse_m3u(content);
    let written = write_m3u(&channels);
    assert_eq!(written, content);
    assert_eq!(parse_m3u(&written), channels);
}

#[test]
fn test_write_m3u_synthesizes_directive() {
    let channels = vec![
        Channel {
            name: "Bare".to_string(),
            tvg_id: "bare.tv".to_string(),
            url: "http://example.com/bare.ts".to_string(),
            ..Channel::default()
        },
        Channel {
            name: "No URL".to_string(),
            ..Channel::default()
        },
    ];
    let written = write_m3u(&channels);
    assert_eq!(
        written,
        "#EXTM3U\n#EXTINF:-1 tvg-id=\"bare.tv\",Bare\nhttp://example.com/bare.ts\n"
    );
    assert_eq!(parse_m3u(&written)[0].tvg_id, "bare.tv");
}
