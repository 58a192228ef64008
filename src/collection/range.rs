//! Train-range selection by train ID or by position.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::error::{Error, Result};

use super::DataCollection;

/// A slice of a run's train-ID list, expressed either in ID space or as an
/// ordinary positional slice. Stops are exclusive; steps count positions
/// and are forward-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainRange {
    /// Endpoints are train IDs; `None` means the corresponding end of the
    /// run. IDs falling in a gap resolve to the next recorded train.
    ById {
        /// First train ID to keep
        start: Option<u64>,
        /// Train ID to stop before
        stop: Option<u64>,
        /// Stride over the resolved positions
        step: usize,
    },
    /// Endpoints are positions in the train-ID list
    ByIndex {
        /// First position to keep
        start: usize,
        /// Position to stop before; `None` means the end
        stop: Option<usize>,
        /// Stride over positions
        step: usize,
    },
}

impl TrainRange {
    /// Range in train-ID space, stride 1
    pub fn by_id(start: impl Into<Option<u64>>, stop: impl Into<Option<u64>>) -> Self {
        TrainRange::ById {
            start: start.into(),
            stop: stop.into(),
            step: 1,
        }
    }

    /// Range in train-ID space with a positional stride
    pub fn by_id_step(
        start: impl Into<Option<u64>>,
        stop: impl Into<Option<u64>>,
        step: usize,
    ) -> Self {
        TrainRange::ById {
            start: start.into(),
            stop: stop.into(),
            step,
        }
    }

    /// Positional range, stride 1
    pub fn by_index(start: usize, stop: impl Into<Option<usize>>) -> Self {
        TrainRange::ByIndex {
            start,
            stop: stop.into(),
            step: 1,
        }
    }

    /// Positional range with a stride
    pub fn by_index_step(start: usize, stop: impl Into<Option<usize>>, step: usize) -> Self {
        TrainRange::ByIndex {
            start,
            stop: stop.into(),
            step,
        }
    }

    /// The whole run
    pub fn all() -> Self {
        TrainRange::by_index(0, None)
    }
}

/// Convert a train ID to a position for slicing.
///
/// An ID present in the run maps to its exact position; an ID in an
/// interior gap maps to the next recorded train. Outside the run the two
/// endpoints behave asymmetrically: a start before the run clamps to the
/// beginning and a stop past the end clamps to the end, while a stop before
/// the run or a start past the end cannot overlap any trains and is an
/// error.
fn id_to_position(train_ids: &[u64], tid: Option<u64>, is_stop: bool) -> Result<Option<usize>> {
    let Some(tid) = tid else {
        return Ok(None);
    };
    let (first, last) = match (train_ids.first(), train_ids.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok(None),
    };
    match train_ids.binary_search(&tid) {
        Ok(pos) => Ok(Some(pos)),
        Err(_) if tid < first => {
            if is_stop {
                Err(Error::TrainIdBeforeRun { id: tid, first })
            } else {
                Ok(None)
            }
        }
        Err(_) if tid > last => {
            if is_stop {
                Ok(None)
            } else {
                Err(Error::TrainIdAfterRun { id: tid, last })
            }
        }
        Err(insertion) => Ok(Some(insertion)),
    }
}

impl DataCollection {
    /// Derive a collection restricted to a train range.
    ///
    /// Sources whose segments no longer intersect the restricted train-ID
    /// list are dropped entirely, so source-existence checks stay honest on
    /// the result.
    pub fn select_trains(&self, range: &TrainRange) -> Result<DataCollection> {
        let total = self.train_ids.len();
        let (start, stop, step) = match *range {
            TrainRange::ById { start, stop, step } => (
                id_to_position(&self.train_ids, start, false)?.unwrap_or(0),
                id_to_position(&self.train_ids, stop, true)?.unwrap_or(total),
                step,
            ),
            TrainRange::ByIndex { start, stop, step } => {
                (start.min(total), stop.unwrap_or(total).min(total), step)
            }
        };
        let stop = stop.max(start);
        let step = step.max(1);

        let mut res = DataCollection::new();
        res.train_ids = self.train_ids[start..stop]
            .iter()
            .copied()
            .step_by(step)
            .collect();

        let keep: HashSet<u64> = res.train_ids.iter().copied().collect();
        for (source, segments) in &self.segments {
            let kept: Vec<_> = segments
                .iter()
                .filter(|segment| segment.train_ids.iter().any(|tid| keep.contains(tid)))
                .cloned()
                .collect();
            if !kept.is_empty() {
                res.segments.insert(source.clone(), kept);
            }
        }

        res.control_sources = self
            .control_sources
            .iter()
            .filter(|source| res.segments.contains_key(*source))
            .cloned()
            .collect();
        res.instrument_sources = self
            .instrument_sources
            .iter()
            .filter(|source| res.segments.contains_key(*source))
            .cloned()
            .collect();
        res.source_keys = RefCell::new(
            self.source_keys
                .borrow()
                .iter()
                .filter(|(source, _)| res.segments.contains_key(*source))
                .map(|(source, keys)| (source.clone(), keys.clone()))
                .collect(),
        );
        res.index_cache = RefCell::new(
            self.index_cache
                .borrow()
                .filtered(|source| res.segments.contains_key(source)),
        );

        log::debug!(
            "restricted to {} of {} trains, {} sources retained",
            res.train_ids.len(),
            total,
            res.segments.len()
        );
        Ok(res)
    }
}
