//! # Data Collection
//!
//! The queryable unit of this crate. A [`DataCollection`] owns the sources
//! discovered across one or more run files, an index cache, and the
//! run-level train-ID list, and answers train-synchronized queries without
//! scanning files linearly:
//!
//! - [`DataCollection::select`] / [`DataCollection::select_trains`] derive
//!   filtered collections (pure, the receiver is never mutated)
//! - [`DataCollection::get_array`] / [`DataCollection::get_series`] /
//!   [`DataCollection::get_dataframe`] assemble labeled data across files
//! - [`DataCollection::trains`] iterates lazily, one train at a time
//!
//! ## Example
//!
//! ```rust,no_run
//! use trainfile::collection::DataCollection;
//!
//! let run = DataCollection::open_run("/data/run_0042")?;
//! println!("{} trains", run.train_ids().len());
//!
//! let xgm = run.select_glob("*/XGM/*", "beamPosition.*")?;
//! let ixpos = xgm.get_array::<f64>("SA1_XTD2_XGM/XGM/MAIN", "beamPosition.ixPos")?;
//! println!("{} rows", ixpos.train_ids().len());
//! # Ok::<(), trainfile::error::Error>(())
//! ```

mod assemble;
mod index;
mod iter;
mod range;
mod select;

pub use assemble::{DataFrame, DetectorInfo, Series, SeriesIndex, TrainArray};
pub use iter::{TrainData, TrainIterator};
pub use range::TrainRange;
pub use select::Selector;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::file::{RunFile, Section};

use index::IndexCache;

/// One file's contribution to a source: the file's train IDs plus the open
/// handle. The train-ID vector is shared by every source registered from
/// the same file.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) train_ids: Arc<Vec<u64>>,
    pub(crate) file: Arc<RunFile>,
}

/// Read-only view over the trains and sources of a run.
///
/// Collections are built once by adding files, then consumed through
/// non-mutating queries; `select`/`select_trains` hand out independent
/// derived collections. Internal caches use interior mutability, which
/// keeps a collection confined to one thread by construction.
#[derive(Debug, Clone, Default)]
pub struct DataCollection {
    pub(crate) control_sources: BTreeSet<String>,
    pub(crate) instrument_sources: BTreeSet<String>,
    pub(crate) train_ids: Vec<u64>,
    pub(crate) segments: HashMap<String, Vec<Segment>>,
    pub(crate) index_cache: RefCell<IndexCache>,
    // Doubles as the per-source key restriction (written by select) and the
    // lazily-discovered key cache (written on first use).
    pub(crate) source_keys: RefCell<HashMap<String, BTreeSet<String>>>,
}

impl DataCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a single run file as a one-file collection
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut collection = Self::new();
        collection.add_file(path)?;
        Ok(collection)
    }

    /// Open every `.h5` file in a directory as one collection.
    ///
    /// Files are added in name order; an empty directory yields an empty
    /// collection.
    pub fn open_run<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|ext| ext == "h5").unwrap_or(false))
            .collect();
        paths.sort();
        if paths.is_empty() {
            log::warn!("no .h5 files found in {}", dir.display());
        }
        let mut collection = Self::new();
        for path in paths {
            collection.add_file(path)?;
        }
        Ok(collection)
    }

    /// Ingest one run file: discover its sources, register its train IDs,
    /// and extend the run-level train-ID list.
    ///
    /// Construction-time only; every query API takes `&self`.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = Arc::new(RunFile::open(path)?);
        let train_ids = Arc::new(file.train_ids()?);

        let mut sources = BTreeSet::new();
        for source_id in file.source_ids()? {
            let (category, rest) = source_id.split_once('/').unwrap_or((source_id.as_str(), ""));
            match category {
                "CONTROL" => {
                    self.control_sources.insert(rest.to_string());
                    sources.insert(rest.to_string());
                }
                "INSTRUMENT" => {
                    // device:channel/group -- the group qualifier is resolved
                    // later through key paths, not source naming.
                    let (device, chan_grp) = rest.split_once(':').unwrap_or((rest, ""));
                    let channel = chan_grp.split('/').next().unwrap_or("");
                    let source = format!("{}:{}", device, channel);
                    self.instrument_sources.insert(source.clone());
                    sources.insert(source);
                }
                other => return Err(Error::UnknownCategory(other.to_string())),
            }
        }

        log::debug!(
            "{}: {} trains, {} sources",
            file.path().display(),
            train_ids.len(),
            sources.len()
        );

        for source in sources {
            self.segments.entry(source).or_default().push(Segment {
                train_ids: Arc::clone(&train_ids),
                file: Arc::clone(&file),
            });
        }

        let mut union: BTreeSet<u64> = self.train_ids.iter().copied().collect();
        union.extend(train_ids.iter().copied());
        self.train_ids = union.into_iter().collect();
        Ok(())
    }

    /// The run-level train-ID list: sorted union of every segment's train
    /// IDs, strictly increasing, no duplicates
    pub fn train_ids(&self) -> &[u64] {
        &self.train_ids
    }

    /// Control sources in this collection
    pub fn control_sources(&self) -> &BTreeSet<String> {
        &self.control_sources
    }

    /// Instrument sources in this collection
    pub fn instrument_sources(&self) -> &BTreeSet<String> {
        &self.instrument_sources
    }

    /// All source names, control and instrument
    pub fn all_sources(&self) -> BTreeSet<String> {
        self.control_sources
            .union(&self.instrument_sources)
            .cloned()
            .collect()
    }

    /// The open files backing this collection, one entry per file
    pub fn files(&self) -> Vec<Arc<RunFile>> {
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        for segments in self.segments.values() {
            for segment in segments {
                if seen.insert(segment.file.id()) {
                    files.push(Arc::clone(&segment.file));
                }
            }
        }
        files
    }

    /// Keys available for a source, honoring any selection restriction.
    ///
    /// Without a restriction the keys are discovered from the first file the
    /// source appears in and cached; a source is assumed to carry the same
    /// keys in every file.
    pub fn keys_for_source(&self, source: &str) -> Result<BTreeSet<String>> {
        let section = self.section_of(source)?;
        if let Some(keys) = self.source_keys.borrow().get(source) {
            return Ok(keys.clone());
        }
        let segment = self
            .segments
            .get(source)
            .and_then(|segments| segments.first())
            .ok_or_else(|| Error::SourceNotFound(source.to_string()))?;
        let keys = segment.file.keys(section, source)?;
        self.source_keys
            .borrow_mut()
            .insert(source.to_string(), keys.clone());
        Ok(keys)
    }

    /// Section a source belongs to, or `SourceNotFound`
    pub(crate) fn section_of(&self, source: &str) -> Result<Section> {
        if self.control_sources.contains(source) {
            Ok(Section::Control)
        } else if self.instrument_sources.contains(source) {
            Ok(Section::Instrument)
        } else {
            Err(Error::SourceNotFound(source.to_string()))
        }
    }

    /// Validate a (source, key) pair, resolving a bare control key to its
    /// stored `.value` form when only that exists.
    pub(crate) fn resolve_key(&self, source: &str, key: &str) -> Result<String> {
        let keys = self.keys_for_source(source)?;
        if keys.contains(key) {
            return Ok(key.to_string());
        }
        if self.control_sources.contains(source) {
            let with_value = format!("{}.value", key);
            if keys.contains(&with_value) {
                return Ok(with_value);
            }
        }
        Err(Error::KeyNotFound {
            source_name: source.to_string(),
            key: key.to_string(),
        })
    }

    /// Locate the segment and in-segment position holding a train ID for a
    /// source, scanning segments in registration order.
    pub(crate) fn find_data(&self, source: &str, train_id: u64) -> Option<(&Segment, usize)> {
        for segment in self.segments.get(source)? {
            if let Some(pos) = segment.train_ids.iter().position(|&tid| tid == train_id) {
                return Some((segment, pos));
            }
        }
        None
    }

    /// Sorted dedup union of all segment train IDs currently registered
    pub(crate) fn recompute_train_ids(&mut self) {
        let mut union = BTreeSet::new();
        for segments in self.segments.values() {
            for segment in segments {
                union.extend(segment.train_ids.iter().copied());
            }
        }
        self.train_ids = union.into_iter().collect();
    }
}
