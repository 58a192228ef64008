//! Human-readable run summaries, built only from the public query API.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::collection::{DataCollection, DetectorInfo};
use crate::error::{Error, Result};

// Trains tick at the facility rate of 10 per second.
const TRAINS_PER_SECOND: f64 = 10.0;

/// Statistics for one detector module, shown as a representative example
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    /// Detector name plus module number
    pub module: String,
    /// Pixel dimensions of the image data
    pub dims: Vec<usize>,
    /// Largest per-train frame count
    pub frames_per_train: u64,
    /// Total frames across the run
    pub total_frames: u64,
}

/// Overview of a run: train span, detector modules, and source listings
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Number of trains in the run
    pub train_count: usize,
    /// First train ID, absent for an empty run
    pub first_train_id: Option<u64>,
    /// Last train ID, absent for an empty run
    pub last_train_id: Option<u64>,
    /// Wall-clock span of the run in seconds
    pub duration_seconds: f64,
    /// Number of detector-module sources
    pub detector_module_count: usize,
    /// Detector name(s); a run should have one, but joins several
    pub detector_name: String,
    /// Detail for the first module; the others should be similar
    pub example_module: Option<ModuleSummary>,
    /// Instrument sources excluding detector modules, sorted
    pub instrument_sources: Vec<String>,
    /// Control sources, sorted
    pub control_sources: Vec<String>,
}

impl DataCollection {
    /// Summarize this collection for display or serialization
    pub fn summary(&self) -> Result<RunSummary> {
        let train_ids = self.train_ids();
        let first = train_ids.first().copied();
        let last = train_ids.last().copied();
        let duration_seconds = match (first, last) {
            (Some(first), Some(last)) => (last - first) as f64 / TRAINS_PER_SECOND,
            _ => 0.0,
        };

        // Detector modules follow the <name>/DET/<n>CH... source convention.
        let module_re = Regex::new(r"(.+)/DET/(\d+)CH")
            .map_err(|e| Error::InvalidData(e.to_string()))?;

        let mut modules: Vec<(String, String, String)> = Vec::new();
        let mut other_instruments = Vec::new();
        for source in self.instrument_sources() {
            match module_re.captures(source) {
                Some(caps) => modules.push((
                    caps[1].to_string(),
                    caps[2].to_string(),
                    source.clone(),
                )),
                None => other_instruments.push(source.clone()),
            }
        }
        modules.sort();

        let mut detector_names: Vec<String> =
            modules.iter().map(|(name, _, _)| name.clone()).collect();
        detector_names.sort();
        detector_names.dedup();

        let example_module = match modules.first() {
            Some((name, modno, source)) => {
                let DetectorInfo {
                    dims,
                    frames_per_train,
                    total_frames,
                } = self.detector_info(source)?;
                Some(ModuleSummary {
                    module: format!("{} {}", name, modno),
                    dims,
                    frames_per_train,
                    total_frames,
                })
            }
            None => None,
        };

        Ok(RunSummary {
            train_count: train_ids.len(),
            first_train_id: first,
            last_train_id: last,
            duration_seconds,
            detector_module_count: modules.len(),
            detector_name: detector_names.join(","),
            example_module,
            instrument_sources: other_instruments,
            control_sources: self.control_sources().iter().cloned().collect(),
        })
    }
}

fn format_duration(seconds: f64) -> String {
    let whole = seconds as u64;
    format!(
        "{}:{:02}:{:02}",
        whole / 3600,
        (whole % 3600) / 60,
        whole % 60
    )
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# of trains:    {}", self.train_count)?;
        writeln!(f, "Duration:       {}", format_duration(self.duration_seconds))?;
        if let Some(first) = self.first_train_id {
            writeln!(f, "First train ID: {}", first)?;
        }
        if let Some(last) = self.last_train_id {
            writeln!(f, "Last train ID:  {}", last)?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{} detector modules ({})",
            self.detector_module_count, self.detector_name
        )?;
        if let Some(module) = &self.example_module {
            let dims = module
                .dims
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" x ");
            writeln!(f, "  e.g. module {} : {} pixels", module.module, dims)?;
            writeln!(
                f,
                "  {} frames per train, {} total frames",
                module.frames_per_train, module.total_frames
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{} instrument sources (excluding detectors):",
            self.instrument_sources.len()
        )?;
        for source in &self.instrument_sources {
            writeln!(f, "  - {}", source)?;
        }
        writeln!(f)?;
        writeln!(f, "{} control sources:", self.control_sources.len())?;
        for source in &self.control_sources {
            writeln!(f, "  - {}", source)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats_as_h_mm_ss() {
        assert_eq!(format_duration(0.0), "0:00:00");
        assert_eq!(format_duration(61.5), "0:01:01");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }
}
