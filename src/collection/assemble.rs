//! Labeled data assembly across file segments.
//!
//! Everything here walks a source's segments, reads the requested rows from
//! each file, labels them with train IDs, and concatenates the per-file
//! pieces in ascending first-train-ID order. Files may have been added in
//! any order; chronology is restored here.

use std::collections::HashMap;
use std::sync::Arc;

use hdf5::H5Type;
use ndarray::{ArrayD, Axis};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::file::{read_rows, Section};

use super::index::expand_train_ids;
use super::{DataCollection, Selector};

/// N-dimensional data labeled by train ID along its leading axis
#[derive(Debug, Clone)]
pub struct TrainArray<T> {
    data: ArrayD<T>,
    train_ids: Vec<u64>,
    dims: Vec<String>,
}

impl<T> TrainArray<T> {
    /// The raw data; the leading axis is aligned with [`TrainArray::train_ids`]
    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    /// One train-ID label per row. Instrument data may repeat a label when
    /// a train contributed several records.
    pub fn train_ids(&self) -> &[u64] {
        &self.train_ids
    }

    /// Dimension names, `trainId` first
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// Number of labeled rows
    pub fn len(&self) -> usize {
        self.train_ids.len()
    }

    /// Whether the array holds no rows
    pub fn is_empty(&self) -> bool {
        self.train_ids.is_empty()
    }

    /// Consume into (data, train-ID labels)
    pub fn into_inner(self) -> (ArrayD<T>, Vec<u64>) {
        (self.data, self.train_ids)
    }
}

/// Index of a [`Series`]: plain train IDs, or compound (train, pulse)
/// entries for pulse-resolved instrument data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesIndex {
    /// One entry per train
    Trains(Vec<u64>),
    /// One entry per (train, pulse) record
    TrainPulse(Vec<(u64, u64)>),
}

impl SeriesIndex {
    /// Number of index entries
    pub fn len(&self) -> usize {
        match self {
            SeriesIndex::Trains(ids) => ids.len(),
            SeriesIndex::TrainPulse(pairs) => pairs.len(),
        }
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries as (train, optional pulse) pairs
    pub fn entries(&self) -> Vec<(u64, Option<u64>)> {
        match self {
            SeriesIndex::Trains(ids) => ids.iter().map(|&tid| (tid, None)).collect(),
            SeriesIndex::TrainPulse(pairs) => {
                pairs.iter().map(|&(tid, pulse)| (tid, Some(pulse))).collect()
            }
        }
    }

    fn first_train(&self) -> Option<u64> {
        match self {
            SeriesIndex::Trains(ids) => ids.first().copied(),
            SeriesIndex::TrainPulse(pairs) => pairs.first().map(|&(tid, _)| tid),
        }
    }
}

/// One labeled table column: scalar values indexed by train (and pulse,
/// when the data is pulse-resolved)
#[derive(Debug, Clone)]
pub struct Series<T> {
    name: String,
    index: SeriesIndex,
    values: Vec<T>,
}

impl<T> Series<T> {
    /// Column name, `source/key` with any trailing `.value` stripped
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index labels, aligned with [`Series::values`]
    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    /// The scalar values
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Labeled table of f64 columns aligned on the union of their indices;
/// cells a column has no entry for hold NaN
#[derive(Debug, Clone)]
pub struct DataFrame {
    index: Vec<(u64, Option<u64>)>,
    columns: Vec<(String, Vec<f64>)>,
}

impl DataFrame {
    fn from_series(series: Vec<Series<f64>>) -> Self {
        let mut entries: Vec<(u64, Option<u64>)> = series
            .iter()
            .flat_map(|s| s.index.entries())
            .collect();
        entries.sort_unstable();
        entries.dedup();
        let positions: HashMap<(u64, Option<u64>), usize> = entries
            .iter()
            .enumerate()
            .map(|(pos, &entry)| (entry, pos))
            .collect();

        let columns = series
            .into_iter()
            .map(|s| {
                let mut column = vec![f64::NAN; entries.len()];
                for (entry, &value) in s.index.entries().into_iter().zip(s.values.iter()) {
                    if let Some(&pos) = positions.get(&entry) {
                        column[pos] = value;
                    }
                }
                (s.name, column)
            })
            .collect();

        DataFrame {
            index: entries,
            columns,
        }
    }

    /// Row labels as (train, optional pulse) entries
    pub fn index(&self) -> &[(u64, Option<u64>)] {
        &self.index
    }

    /// Iterate over (name, values) columns
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Values of one column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

/// Aggregate statistics over one instrument source's `image` group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorInfo {
    /// Trailing (pixel) dimensions of the image data
    pub dims: Vec<usize>,
    /// Largest per-train frame count; trains with zero frames exist
    pub frames_per_train: u64,
    /// Total frames recorded across the run
    pub total_frames: u64,
}

impl DataCollection {
    /// Labeled N-D array for one (source, key) across all files.
    ///
    /// Control data yields one row per train. Instrument data is expanded
    /// through the group index: each train's label repeats once per
    /// physical record, trains with zero records contribute nothing.
    pub fn get_array<T: H5Type + Clone>(&self, source: &str, key: &str) -> Result<TrainArray<T>> {
        self.assemble_array(source, key, None, false)
    }

    /// [`DataCollection::get_array`] with caller-named trailing dimensions
    pub fn get_array_with_dims<T: H5Type + Clone>(
        &self,
        source: &str,
        key: &str,
        extra_dims: &[&str],
    ) -> Result<TrainArray<T>> {
        self.assemble_array(source, key, Some(extra_dims), false)
    }

    /// Like [`DataCollection::get_array`], but fails with
    /// [`Error::MultipleRecordsPerTrain`] when any train holds more than one
    /// record, the shape contract of control-style consumers.
    pub fn get_array_single<T: H5Type + Clone>(
        &self,
        source: &str,
        key: &str,
    ) -> Result<TrainArray<T>> {
        self.assemble_array(source, key, None, true)
    }

    fn assemble_array<T: H5Type + Clone>(
        &self,
        source: &str,
        key: &str,
        extra_dims: Option<&[&str]>,
        require_single: bool,
    ) -> Result<TrainArray<T>> {
        let key = self.resolve_key(source, key)?;
        let section = self.section_of(source)?;
        let segments = self
            .segments
            .get(source)
            .ok_or_else(|| Error::SourceNotFound(source.to_string()))?;

        let mut parts: Vec<(Vec<u64>, ArrayD<T>)> = Vec::new();
        for segment in segments {
            let ds = segment.file.dataset(section, source, &key)?;
            let rows = ds.shape().first().copied().unwrap_or(0);
            let labels = match section {
                Section::Control => segment.train_ids.to_vec(),
                Section::Instrument => {
                    let group = key.split('.').next().unwrap_or(&key);
                    let index = self.index(&segment.file, source, group)?;
                    if require_single && index.counts.iter().any(|&count| count > 1) {
                        return Err(Error::MultipleRecordsPerTrain {
                            source_name: source.to_string(),
                            group: group.to_string(),
                        });
                    }
                    expand_train_ids(&index.counts, &segment.train_ids)
                }
            };
            let n = labels.len().min(rows);
            let data = read_rows::<T>(&ds, 0, n)?;
            parts.push((labels[..n].to_vec(), data));
        }

        if parts.is_empty() {
            return Err(Error::InvalidData(format!(
                "no file holds data for source {:?}, key {:?}",
                source, key
            )));
        }

        // Chronological order is by each file's first train, not add order.
        let mut non_empty: Vec<&(Vec<u64>, ArrayD<T>)> =
            parts.iter().filter(|(labels, _)| !labels.is_empty()).collect();
        if non_empty.is_empty() {
            // All per-file pieces are empty; the first one still carries the
            // right trailing shape for the caller.
            let (labels, data) = parts.swap_remove(0);
            let dims = dimension_names(data.ndim(), extra_dims)?;
            return Ok(TrainArray {
                data,
                train_ids: labels,
                dims,
            });
        }
        non_empty.sort_by_key(|(labels, _)| labels.first().copied());

        let train_ids: Vec<u64> = non_empty
            .iter()
            .flat_map(|(labels, _)| labels.iter().copied())
            .collect();
        let views: Vec<_> = non_empty.iter().map(|(_, data)| data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| Error::InvalidData(format!("mismatched segment shapes: {}", e)))?;
        let dims = dimension_names(data.ndim(), extra_dims)?;

        Ok(TrainArray {
            data,
            train_ids,
            dims,
        })
    }

    /// Labeled table column for one (source, key).
    ///
    /// The data must hold one scalar per record. Pulse-resolved instrument
    /// data (several records per train) degrades the index to compound
    /// (train, pulse) entries read from the group's `pulseId` dataset.
    pub fn get_series<T: H5Type + Clone>(&self, source: &str, key: &str) -> Result<Series<T>> {
        let key = self.resolve_key(source, key)?;
        let section = self.section_of(source)?;
        let segments = self
            .segments
            .get(source)
            .ok_or_else(|| Error::SourceNotFound(source.to_string()))?;

        let mut name = format!("{}/{}", source, key);
        if let Some(stripped) = name.strip_suffix(".value") {
            name = stripped.to_string();
        }

        let mut parts: Vec<(SeriesIndex, Vec<T>)> = Vec::new();
        for segment in segments {
            let ds = segment.file.dataset(section, source, &key)?;
            let rows = ds.shape().first().copied().unwrap_or(0);
            match section {
                Section::Control => {
                    if ds.ndim() != 1 {
                        return Err(Error::InvalidData(format!(
                            "{}/{} is not 1-D, cannot build a series",
                            source, key
                        )));
                    }
                    let n = segment.train_ids.len().min(rows);
                    let values = read_rows::<T>(&ds, 0, n)?.into_raw_vec();
                    parts.push((SeriesIndex::Trains(segment.train_ids[..n].to_vec()), values));
                }
                Section::Instrument => {
                    let group = key.split('.').next().unwrap_or(&key);
                    let index = self.index(&segment.file, source, group)?;
                    let expanded = expand_train_ids(&index.counts, &segment.train_ids);
                    let pulse_resolved = index.counts.iter().any(|&count| count > 1);
                    let n = expanded.len().min(rows);
                    if !pulse_resolved {
                        if ds.ndim() != 1 {
                            return Err(Error::InvalidData(format!(
                                "{}/{} is not 1-D, cannot build a series",
                                source, key
                            )));
                        }
                        let values = read_rows::<T>(&ds, 0, n)?.into_raw_vec();
                        parts.push((SeriesIndex::Trains(expanded[..n].to_vec()), values));
                    } else {
                        // Pulse-resolved data carries one scalar per record
                        // along a trailing length-1 axis.
                        if ds.ndim() != 2 || ds.shape()[1] != 1 {
                            return Err(Error::InvalidData(format!(
                                "{}/{} is pulse-resolved but not shaped (records, 1)",
                                source, key
                            )));
                        }
                        let values = read_rows::<T>(&ds, 0, n)?
                            .index_axis_move(Axis(1), 0)
                            .into_raw_vec();
                        let pulses = self.read_pulse_ids(segment, source, group, n)?;
                        let pairs = expanded[..n]
                            .iter()
                            .copied()
                            .zip(pulses)
                            .collect();
                        parts.push((SeriesIndex::TrainPulse(pairs), values));
                    }
                }
            }
        }

        if parts.is_empty() {
            return Err(Error::InvalidData(format!(
                "no file holds data for source {:?}, key {:?}",
                source, key
            )));
        }
        parts.sort_by_key(|(index, _)| index.first_train());

        let mut plain = Vec::new();
        let mut compound = Vec::new();
        let mut values = Vec::new();
        let mut mixed = (false, false);
        for (index, mut part_values) in parts {
            if index.is_empty() {
                continue;
            }
            match index {
                SeriesIndex::Trains(ids) => {
                    mixed.0 = true;
                    plain.extend(ids);
                }
                SeriesIndex::TrainPulse(pairs) => {
                    mixed.1 = true;
                    compound.extend(pairs);
                }
            }
            values.append(&mut part_values);
        }
        let index = match mixed {
            (true, true) => {
                return Err(Error::InvalidData(format!(
                    "{}/{} mixes pulse-resolved and per-train files",
                    source, key
                )))
            }
            (false, true) => SeriesIndex::TrainPulse(compound),
            // No data at all also lands here, as an empty plain index.
            _ => SeriesIndex::Trains(plain),
        };

        Ok(Series {
            name,
            index,
            values,
        })
    }

    fn read_pulse_ids(
        &self,
        segment: &super::Segment,
        source: &str,
        group: &str,
        n: usize,
    ) -> Result<Vec<u64>> {
        let ds = segment
            .file
            .dataset(Section::Instrument, source, &format!("{}.pulseId", group))?;
        let n = n.min(ds.shape().first().copied().unwrap_or(0));
        let raw = read_rows::<u64>(&ds, 0, n)?;
        Ok(match raw.ndim() {
            1 => raw.into_raw_vec(),
            2 => raw.index_axis_move(Axis(1), 0).into_raw_vec(),
            _ => {
                return Err(Error::InvalidData(format!(
                    "{}/{}/pulseId has unexpected rank",
                    source, group
                )))
            }
        })
    }

    /// Labeled table over every selected (source, key), one f64 column
    /// each, aligned on the union of their indices.
    ///
    /// `fields` restricts the table through an ordinary selection first.
    /// Timestamp bookkeeping keys (`*.timestamp`) are omitted.
    pub fn get_dataframe(&self, fields: Option<&Selector>) -> Result<DataFrame> {
        if let Some(selector) = fields {
            return self.select(selector)?.get_dataframe(None);
        }
        let mut series = Vec::new();
        for source in self.all_sources() {
            for key in self.keys_for_source(&source)? {
                if key.ends_with(".timestamp") {
                    continue;
                }
                series.push(self.get_series::<f64>(&source, &key)?);
            }
        }
        Ok(DataFrame::from_series(series))
    }

    /// Aggregate statistics over an instrument source's `image` group
    pub fn detector_info(&self, source: &str) -> Result<DetectorInfo> {
        let segments = self
            .segments
            .get(source)
            .ok_or_else(|| Error::SourceNotFound(source.to_string()))?;

        let mut all_counts: Vec<u64> = Vec::new();
        let mut last_file = None;
        for segment in segments {
            let index = self.index(&segment.file, source, "image")?;
            all_counts.extend(index.counts.iter().copied());
            last_file = Some(Arc::clone(&segment.file));
        }
        let file = last_file.ok_or_else(|| Error::SourceNotFound(source.to_string()))?;

        let shape = file.dataset(Section::Instrument, source, "image.data")?.shape();
        let dims = shape[shape.len().saturating_sub(2)..].to_vec();

        Ok(DetectorInfo {
            dims,
            frames_per_train: all_counts.iter().copied().max().unwrap_or(0),
            total_frames: all_counts.iter().sum(),
        })
    }
}

fn dimension_names(ndim: usize, extra_dims: Option<&[&str]>) -> Result<Vec<String>> {
    let trailing = ndim.saturating_sub(1);
    let mut dims = Vec::with_capacity(ndim);
    dims.push("trainId".to_string());
    match extra_dims {
        Some(names) => {
            if names.len() != trailing {
                return Err(Error::InvalidData(format!(
                    "{} extra dimension names given for {} trailing axes",
                    names.len(),
                    trailing
                )));
            }
            dims.extend(names.iter().map(|name| name.to_string()));
        }
        None => dims.extend((0..trailing).map(|i| format!("dim_{}", i))),
    }
    Ok(dims)
}
