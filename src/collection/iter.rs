//! Lazy per-train iteration and one-shot train lookups.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::Result;
use crate::file::{read_records, DatasetValue, RunFile, Section};

use super::{DataCollection, Selector, TrainRange};

/// Nested per-train mapping: source name → key → raw value(s)
pub type TrainData = BTreeMap<String, BTreeMap<String, DatasetValue>>;

impl DataCollection {
    /// All data recorded for one train ID.
    ///
    /// Sources with no data for this train yield empty entries; instrument
    /// keys whose group reports a zero count are omitted. `devices`
    /// restricts the lookup through an ordinary selection first.
    pub fn train_from_id(
        &self,
        train_id: u64,
        devices: Option<&Selector>,
    ) -> Result<(u64, TrainData)> {
        if let Some(selector) = devices {
            return self.select(selector)?.train_from_id(train_id, None);
        }

        let mut res = TrainData::new();
        for source in &self.control_sources {
            let entry = res.entry(source.clone()).or_default();
            let Some((segment, pos)) = self.find_data(source, train_id) else {
                continue;
            };
            for key in self.keys_for_source(source)? {
                let ds = segment.file.dataset(Section::Control, source, &key)?;
                entry.insert(key, read_records(&ds, pos, 1)?);
            }
        }

        for source in &self.instrument_sources {
            let entry = res.entry(source.clone()).or_default();
            let Some((segment, pos)) = self.find_data(source, train_id) else {
                continue;
            };
            for key in self.keys_for_source(source)? {
                let group = key.split('.').next().unwrap_or(&key).to_string();
                let index = self.index(&segment.file, source, &group)?;
                let (Some(&first), Some(&count)) =
                    (index.firsts.get(pos), index.counts.get(pos))
                else {
                    continue;
                };
                if count == 0 {
                    continue;
                }
                let ds = segment.file.dataset(Section::Instrument, source, &key)?;
                entry.insert(key, read_records(&ds, first as usize, count as usize)?);
            }
        }

        Ok((train_id, res))
    }

    /// All data recorded for the train at a position in the train-ID list
    pub fn train_from_index(
        &self,
        train_index: usize,
        devices: Option<&Selector>,
    ) -> Result<(u64, TrainData)> {
        let train_id = self.train_ids.get(train_index).copied().ok_or_else(|| {
            crate::error::Error::InvalidData(format!(
                "train index {} out of range for {} trains",
                train_index,
                self.train_ids.len()
            ))
        })?;
        self.train_from_id(train_id, devices)
    }

    /// Lazy iterator over the selected trains, in train-ID order.
    ///
    /// `devices` and `train_range` restrict the iteration through ordinary
    /// `select`/`select_trains` first. With `require_all`, trains missing
    /// any control source, or reporting zero records for any instrument
    /// group, are skipped instead of yielded.
    pub fn trains(
        &self,
        devices: Option<&Selector>,
        train_range: Option<&TrainRange>,
        require_all: bool,
    ) -> Result<TrainIterator> {
        let mut collection = match devices {
            Some(selector) => self.select(selector)?,
            None => self.clone(),
        };
        if let Some(range) = train_range {
            collection = collection.select_trains(range)?;
        }
        Ok(TrainIterator::new(collection, require_all))
    }

    /// True when any selected source has no data for this train.
    ///
    /// Decided once per train from the segment registry and the index
    /// cache, not per individual key.
    pub(crate) fn check_data_missing(&self, train_id: u64) -> Result<bool> {
        for source in &self.control_sources {
            if self.find_data(source, train_id).is_none() {
                return Ok(true);
            }
        }

        for source in &self.instrument_sources {
            let Some((segment, pos)) = self.find_data(source, train_id) else {
                return Ok(true);
            };
            let groups: BTreeSet<String> = self
                .keys_for_source(source)?
                .iter()
                .map(|key| key.split('.').next().unwrap_or(key).to_string())
                .collect();
            for group in groups {
                let index = self.index(&segment.file, source, &group)?;
                if index.counts.get(pos).copied().unwrap_or(0) == 0 {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

/// Where a (source, key) was last found; reused while consecutive trains
/// stay in the same file.
struct CachedDataset {
    train_ids: Arc<Vec<u64>>,
    file: Arc<RunFile>,
    dataset: hdf5::Dataset,
}

/// Forward-only iterator over the trains of a collection.
///
/// Yields `(train ID, source → key → value)` pairs one train at a time,
/// resolving each (source, key)'s file position on demand. The resolution
/// is cached across steps and refreshed by a fresh segment scan whenever
/// the requested train leaves the cached file.
pub struct TrainIterator {
    data: DataCollection,
    require_all: bool,
    pos: usize,
    exhausted: bool,
    datasets: HashMap<(String, String), CachedDataset>,
}

impl TrainIterator {
    fn new(data: DataCollection, require_all: bool) -> Self {
        Self {
            data,
            require_all,
            pos: 0,
            exhausted: false,
            datasets: HashMap::new(),
        }
    }

    /// The filtered collection this iterator walks
    pub fn collection(&self) -> &DataCollection {
        &self.data
    }

    fn find_data(
        &mut self,
        section: Section,
        source: &str,
        key: &str,
        train_id: u64,
    ) -> Result<Option<(Arc<RunFile>, usize, hdf5::Dataset)>> {
        let cache_key = (source.to_string(), key.to_string());
        if let Some(cached) = self.datasets.get(&cache_key) {
            if let Some(pos) = cached.train_ids.iter().position(|&tid| tid == train_id) {
                return Ok(Some((
                    Arc::clone(&cached.file),
                    pos,
                    cached.dataset.clone(),
                )));
            }
        }

        let Some(segments) = self.data.segments.get(source) else {
            return Ok(None);
        };
        for segment in segments {
            if let Some(pos) = segment.train_ids.iter().position(|&tid| tid == train_id) {
                let ds = segment.file.dataset(section, source, key)?;
                self.datasets.insert(
                    cache_key,
                    CachedDataset {
                        train_ids: Arc::clone(&segment.train_ids),
                        file: Arc::clone(&segment.file),
                        dataset: ds.clone(),
                    },
                );
                return Ok(Some((Arc::clone(&segment.file), pos, ds)));
            }
        }
        Ok(None)
    }

    fn assemble(&mut self, train_id: u64) -> Result<TrainData> {
        let mut res = TrainData::new();

        let control: Vec<String> = self.data.control_sources.iter().cloned().collect();
        for source in control {
            let keys = self.data.keys_for_source(&source)?;
            let mut entry = BTreeMap::new();
            for key in keys {
                let Some((_, pos, ds)) = self.find_data(Section::Control, &source, &key, train_id)?
                else {
                    continue;
                };
                entry.insert(key, read_records(&ds, pos, 1)?);
            }
            res.insert(source, entry);
        }

        let instrument: Vec<String> = self.data.instrument_sources.iter().cloned().collect();
        for source in instrument {
            let keys = self.data.keys_for_source(&source)?;
            let mut entry = BTreeMap::new();
            for key in keys {
                let Some((file, pos, ds)) =
                    self.find_data(Section::Instrument, &source, &key, train_id)?
                else {
                    continue;
                };
                let group = key.split('.').next().unwrap_or(&key).to_string();
                let index = self.data.index(&file, &source, &group)?;
                let (Some(&first), Some(&count)) =
                    (index.firsts.get(pos), index.counts.get(pos))
                else {
                    continue;
                };
                entry.insert(key, read_records(&ds, first as usize, count as usize)?);
            }
            res.insert(source, entry);
        }

        Ok(res)
    }
}

impl Iterator for TrainIterator {
    type Item = Result<(u64, TrainData)>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            let train_id = match self.data.train_ids.get(self.pos) {
                Some(&tid) => tid,
                None => {
                    self.exhausted = true;
                    return None;
                }
            };
            self.pos += 1;

            if self.require_all {
                match self.data.check_data_missing(train_id) {
                    Ok(true) => {
                        log::debug!("skipping train {}: not all sources present", train_id);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.exhausted = true;
                        return Some(Err(e));
                    }
                }
            }

            return match self.assemble(train_id) {
                Ok(data) => Some(Ok((train_id, data))),
                Err(e) => {
                    self.exhausted = true;
                    Some(Err(e))
                }
            };
        }
        None
    }
}
