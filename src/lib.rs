//! # trainfile - Train-Synchronized Run Data Access
//!
//! `trainfile` provides read-only access to experiment data recorded by a
//! facility control system across one or more append-only HDF5 files. Each
//! file stores time-ordered records ("trains") for many independently
//! sampled data sources; a logical run may span many files, and a single
//! source's data may appear, with gaps, in a subset of them.
//!
//! The crate builds an in-memory index over those files so a client can ask
//! "give me the value of key K for source S at train T", or "give me an
//! aligned array for key K over a train-ID range", without scanning files
//! linearly and without loading more raw data than requested.
//!
//! ## Key Features
//!
//! - **Multi-file runs**: sources are stitched across files and re-sorted
//!   chronologically, whatever order the files were added in.
//! - **Lazy indexing**: per-(file, source, group) first/count indices are
//!   read on first use and memoized.
//! - **Selection**: restrict a collection by exact names, per-source key
//!   sets, or glob patterns; restrictions produce independent derived
//!   collections, never mutate the original.
//! - **Train ranges**: slice a run by train ID (gap-tolerant) or by
//!   position.
//! - **Per-train iteration**: walk trains one at a time with cached file
//!   positions, optionally skipping trains that lack data for some source.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trainfile::collection::{DataCollection, TrainRange};
//!
//! // Open every .h5 file of a run directory as one collection
//! let run = DataCollection::open_run("/data/raw/r0042")?;
//!
//! // Restrict to one beam monitor and a train window
//! let xgm = run
//!     .select_glob("SA1_XTD2_XGM/*", "beamPosition.*")?
//!     .select_trains(&TrainRange::by_id(10_000, 20_000))?;
//!
//! // Aligned, labeled data across all files of the run
//! let pos = xgm.get_array::<f64>("SA1_XTD2_XGM/XGM/MAIN", "beamPosition.ixPos")?;
//! println!("{} rows, first train {}", pos.len(), pos.train_ids()[0]);
//!
//! // Lazy train-by-train access
//! for train in run.trains(None, None, false)? {
//!     let (train_id, data) = train?;
//!     println!("{}: {} sources", train_id, data.len());
//! }
//! # Ok::<(), trainfile::error::Error>(())
//! ```
//!
//! ## File Layout
//!
//! Each run file is consumed read-only through a fixed layout:
//!
//! ```text
//! METADATA/dataSourceId             declared sources, CONTROL/... or INSTRUMENT/...
//! INDEX/trainId                     train IDs recorded in this file (0 = unused)
//! INDEX/<source>/<group>/first      row offset of each train's first record
//! INDEX/<source>/<group>/count      records per train (or last + status)
//! CONTROL/<source>/...              one record per train
//! INSTRUMENT/<source>/<group>/...   zero or more records per train
//! ```
//!
//! ## Architecture
//!
//! - [`collection`]: the queryable [`collection::DataCollection`] - source
//!   registry, index cache, selection, train ranges, data assembly, and the
//!   train iterator
//! - [`file`]: thin HDF5 backend wrapper (open files, typed row reads)
//! - [`summary`]: human-readable run overviews built on the public API
//! - [`error`]: the crate-wide error type

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod collection;
pub mod error;
pub mod file;
pub mod summary;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::collection::{
        DataCollection, DataFrame, DetectorInfo, Selector, Series, SeriesIndex, TrainArray,
        TrainData, TrainIterator, TrainRange,
    };
    pub use crate::error::{Error, Result};
    pub use crate::file::{DatasetValue, RunFile, Section};
    pub use crate::summary::{ModuleSummary, RunSummary};
}
