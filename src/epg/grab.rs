//! Guide generation through an external grabber
//!
//! scan catalogs -> select sources -> one custom channel list and one grab
//! per source -> merge. A failing source is recorded as a skip and never
//! aborts the run; only a run where no source produced a guide fails.

use std::fs;
use std::path::{Path, PathBuf};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::catalog::{build_custom_channels, scan_catalog};
use super::coverage::{select_sources, Selection, WantedIds, DEFAULT_MAX_SOURCES};
use super::merge::{merge_to_bytes, MergeReport};
use crate::config::AppConfig;
use crate::error::{GrabError, PipelineError};

/// One external grabber run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabJob {
    /// Source name, used for labelling
    pub site: String,
    /// Custom channel list restricting the grab to the wanted channels
    pub channels_path: PathBuf,
    pub days: u32,
    /// Where the grabber must write its XMLTV output
    pub output: PathBuf,
    /// Hard limit; the implementation must kill the run when exceeded
    pub timeout: Duration,
}

/// Black-box interface to the external guide grabber
pub trait Grabber: Sync {
    fn grab(&self, job: &GrabJob) -> Result<(), GrabError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrabOptions {
    /// Selector budget, `<= 0` means unlimited
    pub max_sources: i32,
    pub days: u32,
    pub timeout_secs: u64,
    /// Grabber runs in flight at once
    pub concurrency: usize,
}

impl Default for GrabOptions {
    fn default() -> Self {
        Self {
            max_sources: DEFAULT_MAX_SOURCES,
            days: 1,
            timeout_secs: 900,
            concurrency: 2,
        }
    }
}

impl From<&AppConfig> for GrabOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_sources: config.max_sources,
            days: config.grab_days,
            timeout_secs: config.grab_timeout_secs,
            concurrency: config.grab_concurrency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    /// Custom channel list could not be built
    Catalog,
    /// Grabber failed, timed out or produced nothing
    Grabber,
}

/// A source dropped from the run, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEvent {
    pub source: String,
    pub kind: SkipKind,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GrabOutcome {
    /// Merged XMLTV document
    pub xml: Vec<u8>,
    pub selection: Selection,
    /// Sources that produced a guide, in selection order
    pub grabbed: Vec<String>,
    pub skipped: Vec<SkipEvent>,
    pub merge: MergeReport,
}

impl GrabOutcome {
    /// Share of selected sources that were skipped
    pub fn skip_rate(&self) -> f64 {
        let attempted = self.grabbed.len() + self.skipped.len();
        if attempted == 0 {
            0.0
        } else {
            self.skipped.len() as f64 / attempted as f64
        }
    }
}

/// Produce one XMLTV document for `tvg_ids` using the grabber checkout at `repo`.
pub fn generate_xmltv<G>(
    repo: &Path,
    tvg_ids: &[String],
    options: &GrabOptions,
    grabber: &G,
) -> Result<GrabOutcome, PipelineError>
where
    G: Grabber + ?Sized,
{
    let index = scan_catalog(repo)?;
    let wanted = WantedIds::new(tvg_ids);
    let selection = select_sources(&wanted, &index, options.max_sources);
    if selection.sources.is_empty() {
        return Err(PipelineError::NoSources);
    }

    let workdir = tempfile::Builder::new()
        .prefix("epg_grab_")
        .tempdir()
        .map_err(PipelineError::TempDir)?;

    let results = run_sources(repo, &selection.sources, &wanted, workdir.path(), options, grabber);

    let mut grabbed = Vec::new();
    let mut outputs = Vec::new();
    let mut skipped = Vec::new();
    for (site, result) in selection.sources.iter().zip(results) {
        match result {
            Ok(path) => {
                grabbed.push(site.clone());
                outputs.push(path);
            }
            Err(skip) => {
                warn!(source = %skip.source, reason = %skip.reason, "skipping guide source");
                skipped.push(skip);
            }
        }
    }

    if grabbed.is_empty() {
        return Err(PipelineError::AllSourcesFailed {
            skipped: skipped.into_iter().map(|s| s.source).collect(),
        });
    }

    let (xml, merge) = merge_to_bytes(&outputs)?;
    if !skipped.is_empty() {
        warn!(
            skipped = skipped.len(),
            sources = ?skipped.iter().map(|s| s.source.as_str()).collect::<Vec<_>>(),
            "guide generated with skipped sources"
        );
    }
    info!(
        grabbed = grabbed.len(),
        channels = merge.channels,
        programmes = merge.programmes,
        "guide generated"
    );

    Ok(GrabOutcome {
        xml,
        selection,
        grabbed,
        skipped,
        merge,
    })
}

/// Run every source, at most `options.concurrency` at a time. Each worker
/// takes the next source as soon as it is free, so one slow grab does not
/// hold back the rest. Results come back in the order of `sites`.
fn run_sources<G>(
    repo: &Path,
    sites: &[String],
    wanted: &WantedIds,
    workdir: &Path,
    options: &GrabOptions,
    grabber: &G,
) -> Vec<Result<PathBuf, SkipEvent>>
where
    G: Grabber + ?Sized,
{
    let workers = options.concurrency.clamp(1, sites.len().max(1));
    let next = AtomicUsize::new(0);
    let mut results: Vec<Option<Result<PathBuf, SkipEvent>>> = sites.iter().map(|_| None).collect();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| {
                let mut done = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(site) = sites.get(index) else { break };
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_site(repo, site, wanted, workdir, options, grabber)
                    }))
                    .unwrap_or_else(|_| Err(panicked(site)));
                    done.push((index, result));
                }
                done
            }));
        }
        for handle in handles {
            match handle.join() {
                Ok(done) => {
                    for (index, result) in done {
                        results[index] = Some(result);
                    }
                }
                Err(_) => warn!("guide grabber worker panicked"),
            }
        }
    });

    results
        .into_iter()
        .zip(sites)
        .map(|(slot, site)| slot.unwrap_or_else(|| Err(panicked(site))))
        .collect()
}

fn panicked(site: &str) -> SkipEvent {
    SkipEvent {
        source: site.to_string(),
        kind: SkipKind::Grabber,
        reason: "grabber panicked".to_string(),
    }
}

fn run_site<G>(
    repo: &Path,
    site: &str,
    wanted: &WantedIds,
    workdir: &Path,
    options: &GrabOptions,
    grabber: &G,
) -> Result<PathBuf, SkipEvent>
where
    G: Grabber + ?Sized,
{
    let channels_path = workdir.join(format!("{site}.custom.channels.xml"));
    build_custom_channels(repo, site, wanted, &channels_path).map_err(|e| SkipEvent {
        source: site.to_string(),
        kind: SkipKind::Catalog,
        reason: e.to_string(),
    })?;

    let job = GrabJob {
        site: site.to_string(),
        channels_path,
        days: options.days,
        output: workdir.join(format!("{site}.xml")),
        timeout: Duration::from_secs(options.timeout_secs),
    };
    info!(site, days = job.days, "running guide grabber");

    let grabber_skip = |e: GrabError| SkipEvent {
        source: site.to_string(),
        kind: SkipKind::Grabber,
        reason: e.to_string(),
    };
    grabber.grab(&job).map_err(grabber_skip)?;

    let produced = fs::metadata(&job.output).map(|m| m.len() > 0).unwrap_or(false);
    if !produced {
        return Err(grabber_skip(GrabError::EmptyOutput(job.output)));
    }
    Ok(job.output)
}
