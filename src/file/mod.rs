//! # File Backend
//!
//! Thin wrapper around one read-only HDF5 run file. A facility file holds:
//!
//! - `METADATA/dataSourceId`: the declared data sources, one string per slot
//! - `INDEX/trainId`: the train IDs recorded in this file (zero = unused slot)
//! - `INDEX/<source>/<group>`: per-train first/count index arrays
//! - `CONTROL/<source>`, `INSTRUMENT/<source>`: the data areas, leaf datasets
//!   addressed by dotted keys (`a.b.c` maps to the `a/b/c` subpath)
//!
//! Everything here is plain blocking I/O; the query logic lives in
//! [`crate::collection`].

mod values;

pub use values::{read_records, read_row, read_rows, DatasetValue};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::Group;

use crate::error::{Error, Result};

/// Data area a source's datasets live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// One record per train, slow control data
    Control,
    /// Zero or more records per train, organized into index groups
    Instrument,
}

impl Section {
    /// Top-level HDF5 group name of this section
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Control => "CONTROL",
            Section::Instrument => "INSTRUMENT",
        }
    }
}

// Process-unique ids give cache keys a stable file identity that survives
// sharing one open file across derived collections.
static NEXT_FILE_ID: AtomicUsize = AtomicUsize::new(1);

/// One open, read-only run file
#[derive(Debug)]
pub struct RunFile {
    id: usize,
    path: PathBuf,
    file: hdf5::File,
}

impl RunFile {
    /// Open a run file read-only. The handle stays open until the last
    /// collection referring to it is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = hdf5::File::open(&path)?;
        let id = NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("opened {} (file id {})", path.display(), id);
        Ok(Self { id, path, file })
    }

    /// Process-unique identity of this open file
    pub fn id(&self) -> usize {
        self.id
    }

    /// Path the file was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Train IDs recorded in this file, in file order, zero slots removed
    pub fn train_ids(&self) -> Result<Vec<u64>> {
        let raw = self.file.dataset("INDEX/trainId")?.read_raw::<u64>()?;
        Ok(raw.into_iter().filter(|&tid| tid != 0).collect())
    }

    /// Declared data-source identifiers, empty slots removed
    pub fn source_ids(&self) -> Result<Vec<String>> {
        let ds = self.file.dataset("METADATA/dataSourceId")?;
        let ids: Vec<String> = match ds.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => ds
                .read_raw::<VarLenUnicode>()?
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            TypeDescriptor::VarLenAscii => ds
                .read_raw::<VarLenAscii>()?
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            other => {
                return Err(Error::InvalidData(format!(
                    "unsupported dataSourceId string type {:?} in {}",
                    other,
                    self.path.display()
                )))
            }
        };
        Ok(ids.into_iter().filter(|s| !s.is_empty()).collect())
    }

    /// Raw first/count index arrays for one (source, group).
    ///
    /// Newer files carry an explicit `count` dataset; older ones store
    /// `last` and `status` instead, with a zero status forcing a zero count
    /// regardless of what first/last suggest.
    pub fn read_index(&self, source: &str, group: &str) -> Result<(Vec<u64>, Vec<u64>)> {
        let ix = self.file.group(&format!("INDEX/{}/{}", source, group))?;
        let firsts = ix.dataset("first")?.read_raw::<u64>()?;
        let counts = if ix.link_exists("count") {
            ix.dataset("count")?.read_raw::<u64>()?
        } else {
            let lasts = ix.dataset("last")?.read_raw::<u64>()?;
            let status = ix.dataset("status")?.read_raw::<u64>()?;
            firsts
                .iter()
                .zip(lasts)
                .zip(status)
                .map(|((&first, last), status)| {
                    if status == 0 {
                        0
                    } else {
                        last.saturating_add(1).saturating_sub(first)
                    }
                })
                .collect()
        };
        Ok((firsts, counts))
    }

    /// Leaf dataset for a dotted key under a source's data area
    pub fn dataset(&self, section: Section, source: &str, key: &str) -> Result<hdf5::Dataset> {
        let path = format!("{}/{}/{}", section.as_str(), source, key.replace('.', "/"));
        Ok(self.file.dataset(&path)?)
    }

    /// All dotted leaf-dataset keys under a source's data area
    pub fn keys(&self, section: Section, source: &str) -> Result<BTreeSet<String>> {
        let root = self
            .file
            .group(&format!("{}/{}", section.as_str(), source))?;
        let mut keys = BTreeSet::new();
        collect_leaf_keys(&root, "", &mut keys)?;
        Ok(keys)
    }
}

fn collect_leaf_keys(group: &Group, prefix: &str, out: &mut BTreeSet<String>) -> Result<()> {
    for name in group.member_names()? {
        let dotted = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        // Members that are not groups are leaf datasets.
        match group.group(&name) {
            Ok(sub) => collect_leaf_keys(&sub, &dotted, out)?,
            Err(_) => {
                out.insert(dotted);
            }
        }
    }
    Ok(())
}
