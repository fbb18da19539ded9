//! Guide source selection
//!
//! Picks a small set of external guide sources that together cover as many of
//! the wanted tvg-ids as possible (greedy set cover, bounded by a budget).
//! Matching is done on canonical keys: the part before the first `@`,
//! case-folded, so `ABC.fr@HD` is satisfied by a source declaring `abc.fr@SD`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

/// Source name -> raw identifiers that source declares
pub type CoverageIndex = BTreeMap<String, BTreeSet<String>>;

/// Default number of sources to select
pub const DEFAULT_MAX_SOURCES: i32 = 12;

/// Size cap of the uncovered sample kept for diagnostics
pub const UNCOVERED_SAMPLE: usize = 12;

/// Canonical matching key of a tvg-id: text before the first `@`, trimmed and
/// lowercased. Empty input gives an empty key.
pub fn canonical_id(value: &str) -> String {
    let base = value.trim().split('@').next().unwrap_or_default();
    base.trim().to_lowercase()
}

/// Canonical key -> first original tvg-id seen for it
#[derive(Debug, Clone, Default)]
pub struct WantedIds {
    by_key: BTreeMap<String, String>,
}

impl WantedIds {
    pub fn new<I, S>(tvg_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_key = BTreeMap::new();
        for id in tvg_ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            let key = canonical_id(id);
            if !key.is_empty() {
                by_key.entry(key).or_insert_with(|| id.to_string());
            }
        }
        Self { by_key }
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Original tvg-id for a canonical key
    pub fn original(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.by_key.keys()
    }
}

/// How much of the wanted set a selection covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub covered: usize,
    pub total: usize,
    /// Original tvg-ids nobody covers, lexical by canonical key, capped
    pub uncovered_sample: Vec<String>,
}

impl CoverageReport {
    /// Covered share as a whole percentage (0 when nothing is wanted)
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            ((self.covered as f64 / self.total as f64) * 100.0).round() as u32
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Chosen sources, in pick order
    pub sources: Vec<String>,
    pub report: CoverageReport,
}

/// Choose guide sources for `wanted`.
///
/// Greedy: repeatedly take the source that covers the most still-uncovered
/// keys, until everything is covered, no source adds anything, or
/// `max_sources` is reached. Ties go to the source with the larger overall
/// coverage, then to the lexically smaller name.
///
/// `max_sources <= 0` means no limit: every source covering at least one
/// wanted key is returned, largest coverage first, without greedy pruning.
pub fn select_sources(wanted: &WantedIds, index: &CoverageIndex, max_sources: i32) -> Selection {
    if wanted.is_empty() {
        return Selection::default();
    }

    let coverage = matched_coverage(wanted, index);
    if coverage.is_empty() {
        info!("no guide source covers the requested tvg-ids");
        return Selection {
            sources: Vec::new(),
            report: report_for(wanted, &BTreeSet::new()),
        };
    }

    // BTreeMap iteration is by name, so the stable sort keeps names ascending within a size
    let mut candidates: Vec<&String> = coverage.keys().collect();
    candidates.sort_by(|a, b| coverage[*b].len().cmp(&coverage[*a].len()));
    info!(candidates = ?candidates, "guide source candidates");

    if max_sources <= 0 {
        let union: BTreeSet<&str> = coverage
            .values()
            .flat_map(|keys| keys.iter().map(String::as_str))
            .collect();
        let report = report_for(wanted, &union);
        info!(
            selected = candidates.len(),
            covered = report.covered,
            total = report.total,
            "no source limit, trying every candidate"
        );
        return Selection {
            sources: candidates.into_iter().cloned().collect(),
            report,
        };
    }

    let budget = max_sources as usize;
    let mut remaining: BTreeSet<&str> = wanted.keys().map(String::as_str).collect();
    let mut selected: Vec<String> = Vec::new();

    while !remaining.is_empty() && selected.len() < budget {
        let mut best: Option<(&String, usize)> = None;
        for name in &candidates {
            if selected.iter().any(|s| s == *name) {
                continue;
            }
            let gain = coverage[*name]
                .iter()
                .filter(|k| remaining.contains(k.as_str()))
                .count();
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((*name, gain));
            }
        }

        let Some((name, _)) = best else {
            break;
        };
        for key in &coverage[name] {
            remaining.remove(key.as_str());
        }
        selected.push(name.clone());
    }

    let covered: BTreeSet<&str> = wanted
        .keys()
        .map(String::as_str)
        .filter(|k| !remaining.contains(k))
        .collect();
    let report = report_for(wanted, &covered);
    info!(
        selected = ?selected,
        covered = report.covered,
        total = report.total,
        percent = report.percent(),
        "guide sources selected"
    );
    if !report.uncovered_sample.is_empty() {
        info!(sample = ?report.uncovered_sample, "uncovered tvg-ids");
    }

    Selection {
        sources: selected,
        report,
    }
}

/// Per source, the wanted canonical keys it can supply. Sources matching
/// nothing are left out.
fn matched_coverage(wanted: &WantedIds, index: &CoverageIndex) -> BTreeMap<String, BTreeSet<String>> {
    let mut out = BTreeMap::new();
    for (source, ids) in index {
        let matched: BTreeSet<String> = ids
            .iter()
            .map(|id| canonical_id(id))
            .filter(|k| !k.is_empty() && wanted.contains_key(k))
            .collect();
        if !matched.is_empty() {
            out.insert(source.clone(), matched);
        }
    }
    out
}

fn report_for(wanted: &WantedIds, covered: &BTreeSet<&str>) -> CoverageReport {
    let uncovered_sample = wanted
        .keys()
        .filter(|k| !covered.contains(k.as_str()))
        .take(UNCOVERED_SAMPLE)
        .filter_map(|k| wanted.original(k).map(str::to_string))
        .collect();

    CoverageReport {
        covered: wanted.keys().filter(|k| covered.contains(k.as_str())).count(),
        total: wanted.len(),
        uncovered_sample,
    }
}
