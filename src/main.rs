//! iptv-guide - command line front end for the playlist and guide store

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use iptv_guide::epg::{self, DownloadConfig, IngestReport, WantedIds};
use iptv_guide::m3u_parser::{parse_m3u_playlist, write_m3u};
use iptv_guide::{AppConfig, Program, Store};

#[derive(Parser)]
#[command(name = "iptv-guide")]
#[command(version)]
#[command(about = "IPTV playlist and XMLTV guide store")]
struct Cli {
    /// Database file (overrides the configured path)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an M3U file as a new playlist
    Import { name: String, file: PathBuf },
    /// List playlists, newest first
    Playlists,
    /// List the channels of a playlist
    Channels { playlist_id: i64 },
    /// Write a playlist back out as M3U
    Export {
        playlist_id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a playlist and its channels
    Delete { playlist_id: i64 },
    /// Replace the stored guide with an XMLTV file or URL (.gz accepted)
    Ingest {
        /// Defaults to the configured guide URL
        source: Option<String>,
    },
    /// Show what is on now and next for a tvg-id
    Now { tvg_id: String },
    /// List upcoming programmes for a tvg-id
    Guide {
        tvg_id: String,
        #[arg(long, default_value_t = 6)]
        hours: i64,
    },
    /// Pick guide sources covering a playlist's channels
    Select {
        playlist_id: i64,
        /// Source budget, 0 or less for no limit
        #[arg(long)]
        max_sources: Option<i32>,
    },
    /// Merge XMLTV files into one
    Merge {
        out: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    let store = Store::open(&db_path)?;

    match cli.command {
        Command::Import { name, file } => {
            let content = fs::read_to_string(&file)?;
            let playlist = parse_m3u_playlist(&content);
            let id = store.add_playlist(&name, &file.display().to_string())?;
            store.replace_channels(id, &playlist.channels)?;
            if let Some(url) = playlist.epg_url.as_deref() {
                store.set_playlist_epg_url(id, Some(url))?;
            }
            println!("playlist {} imported with {} channels", id, playlist.channels.len());
        }
        Command::Playlists => {
            for p in store.list_playlists()? {
                match p.epg_url {
                    Some(epg) => println!("{:>4}  {}  {}  (guide: {})", p.id, p.name, p.url, epg),
                    None => println!("{:>4}  {}  {}", p.id, p.name, p.url),
                }
            }
        }
        Command::Channels { playlist_id } => {
            for c in store.get_channels(playlist_id)? {
                println!("{:<32} {:<20} {:<24} {}", c.name, c.group, c.tvg_id, c.url);
            }
        }
        Command::Export { playlist_id, output } => {
            let text = write_m3u(&store.get_channels(playlist_id)?);
            match output {
                Some(path) => fs::write(path, text)?,
                None => print!("{}", text),
            }
        }
        Command::Delete { playlist_id } => {
            store.delete_playlist(playlist_id)?;
        }
        Command::Ingest { source } => {
            let source = source
                .or_else(|| Some(config.epg_url.clone()).filter(|u| !u.is_empty()))
                .ok_or("no guide source given and no epg_url configured")?;
            let report = ingest(&store, &source, config.epg_chunk_size)?;
            println!(
                "{} programmes stored, {} dropped",
                report.inserted,
                report.decode.dropped()
            );
        }
        Command::Now { tvg_id } => {
            let (now, next) = store.get_now_next(&tvg_id, chrono::Utc::now().timestamp())?;
            println!("now:  {}", describe(now.as_ref()));
            println!("next: {}", describe(next.as_ref()));
        }
        Command::Guide { tvg_id, hours } => {
            let start = chrono::Utc::now().timestamp();
            let stop = start + hours.max(1) * 3600;
            let programs =
                store.list_epg_programs(&tvg_id, start, stop, iptv_guide::storage::DEFAULT_GUIDE_LIMIT)?;
            for p in &programs {
                println!(
                    "{}-{}  {}",
                    epg::format_datetime(p.start),
                    epg::format_time(p.stop),
                    p.title
                );
            }
        }
        Command::Select { playlist_id, max_sources } => {
            let repo = config
                .epg_repo
                .as_deref()
                .ok_or("epg_repo is not configured")?;
            let index = epg::scan_catalog(repo)?;
            let wanted = WantedIds::new(store.playlist_tvg_ids(playlist_id)?);
            let selection =
                epg::select_sources(&wanted, &index, max_sources.unwrap_or(config.max_sources));

            for site in &selection.sources {
                println!("{}", site);
            }
            let report = &selection.report;
            println!(
                "coverage {}/{} ({}%)",
                report.covered,
                report.total,
                report.percent()
            );
            if !report.uncovered_sample.is_empty() {
                println!("uncovered: {}", report.uncovered_sample.join(", "));
            }
        }
        Command::Merge { out, inputs } => {
            let report = epg::merge_xmltv(&inputs, &out)?;
            println!(
                "{} channels, {} programmes, {} inputs skipped",
                report.channels,
                report.programmes,
                report.skipped_files.len()
            );
        }
    }

    Ok(())
}

fn ingest(store: &Store, source: &str, chunk_size: usize) -> Result<IngestReport, Box<dyn Error>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(epg::ingest_url(store, source, &DownloadConfig::default(), None, chunk_size)?)
    } else {
        Ok(epg::ingest_file(store, Path::new(source), chunk_size)?)
    }
}

fn describe(program: Option<&Program>) -> String {
    match program {
        Some(p) => format!(
            "{}-{}  {}",
            epg::format_time(p.start),
            epg::format_time(p.stop),
            p.title
        ),
        None => "-".to_string(),
    }
}
