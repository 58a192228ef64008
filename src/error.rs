//! Crate-wide error type for run-data access.

/// Errors raised while opening, selecting, or reading run data
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HDF5 backend error
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// No source with this name in the collection
    #[error("no source named {0:?} in this run")]
    SourceNotFound(String),

    /// The source exists but has no such key
    #[error("source {source_name:?} has no key {key:?}")]
    KeyNotFound {
        /// Source that was queried
        source_name: String,
        /// Key that was not found
        key: String,
    },

    /// A glob selector pair matched nothing
    #[error("no matches for pattern ({source_glob:?}, {key_glob:?})")]
    NoPatternMatch {
        /// Source-name glob of the failing pair
        source_glob: String,
        /// Key glob of the failing pair
        key_glob: String,
    },

    /// Instrument data has several records per train where one was required
    #[error("{source_name}/{group} has more than one data point per train")]
    MultipleRecordsPerTrain {
        /// Instrument source
        source_name: String,
        /// Index group within the source
        group: String,
    },

    /// A train-ID range stop lies before the first train of the run
    #[error("train ID {id} is before this run (starts at {first})")]
    TrainIdBeforeRun {
        /// Requested train ID
        id: u64,
        /// First train ID of the run
        first: u64,
    },

    /// A train-ID range start lies after the last train of the run
    #[error("train ID {id} is after this run (ends at {last})")]
    TrainIdAfterRun {
        /// Requested train ID
        id: u64,
        /// Last train ID of the run
        last: u64,
    },

    /// A file declares a data-source category other than CONTROL/INSTRUMENT
    #[error("unknown data category {0:?}")]
    UnknownCategory(String),

    /// The file contents violate an assumption of the format
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
