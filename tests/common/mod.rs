//! Fixture run files for integration tests, written through the same HDF5
//! stack the crate reads with.

use std::path::Path;

use hdf5::types::VarLenUnicode;
use hdf5::H5Type;
use ndarray::{Array2, Array3};

/// Builds one run file: train IDs up front, then declared sources, index
/// groups, and leaf datasets; `finish` writes the source-id table.
pub struct RunFileBuilder {
    file: hdf5::File,
    source_ids: Vec<String>,
}

impl RunFileBuilder {
    pub fn create(path: &Path, train_ids: &[u64]) -> hdf5::Result<Self> {
        let file = hdf5::File::create(path)?;
        let index = file.create_group("INDEX")?;
        index
            .new_dataset_builder()
            .with_data(train_ids)
            .create("trainId")?;
        Ok(Self {
            file,
            source_ids: Vec::new(),
        })
    }

    /// Add one raw dataSourceId entry, e.g. `CONTROL/SA1/XGM/MAIN`
    pub fn declare(&mut self, source_id: &str) -> &mut Self {
        self.source_ids.push(source_id.to_string());
        self
    }

    pub fn write_1d<T: H5Type>(&self, path: &str, values: &[T]) -> hdf5::Result<()> {
        let (group, leaf) = self.parent_of(path)?;
        group.new_dataset_builder().with_data(values).create(leaf)?;
        Ok(())
    }

    pub fn write_2d<T: H5Type>(&self, path: &str, values: &Array2<T>) -> hdf5::Result<()> {
        let (group, leaf) = self.parent_of(path)?;
        group.new_dataset_builder().with_data(values).create(leaf)?;
        Ok(())
    }

    pub fn write_3d<T: H5Type>(&self, path: &str, values: &Array3<T>) -> hdf5::Result<()> {
        let (group, leaf) = self.parent_of(path)?;
        group.new_dataset_builder().with_data(values).create(leaf)?;
        Ok(())
    }

    /// Write the first/count index for one (source, group)
    pub fn index(
        &self,
        source: &str,
        group: &str,
        firsts: &[u64],
        counts: &[u64],
    ) -> hdf5::Result<()> {
        let ix = ensure_group(&self.file, &format!("INDEX/{}/{}", source, group))?;
        ix.new_dataset_builder().with_data(firsts).create("first")?;
        ix.new_dataset_builder().with_data(counts).create("count")?;
        Ok(())
    }

    /// Write the older last/status index layout instead of a count dataset
    pub fn index_last_status(
        &self,
        source: &str,
        group: &str,
        firsts: &[u64],
        lasts: &[u64],
        status: &[u64],
    ) -> hdf5::Result<()> {
        let ix = ensure_group(&self.file, &format!("INDEX/{}/{}", source, group))?;
        ix.new_dataset_builder().with_data(firsts).create("first")?;
        ix.new_dataset_builder().with_data(lasts).create("last")?;
        ix.new_dataset_builder().with_data(status).create("status")?;
        Ok(())
    }

    pub fn finish(self) -> hdf5::Result<()> {
        let ids: Vec<VarLenUnicode> = self
            .source_ids
            .iter()
            .map(|id| id.parse().expect("valid source id"))
            .collect();
        let metadata = ensure_group(&self.file, "METADATA")?;
        metadata
            .new_dataset_builder()
            .with_data(&ids)
            .create("dataSourceId")?;
        Ok(())
    }

    fn parent_of<'a>(&self, path: &'a str) -> hdf5::Result<(hdf5::Group, &'a str)> {
        match path.rsplit_once('/') {
            Some((parent, leaf)) => Ok((ensure_group(&self.file, parent)?, leaf)),
            None => Ok((self.file.group("/")?, path)),
        }
    }
}

fn ensure_group(file: &hdf5::File, path: &str) -> hdf5::Result<hdf5::Group> {
    let mut group = file.group("/")?;
    for part in path.split('/').filter(|part| !part.is_empty()) {
        group = if group.link_exists(part) {
            group.group(part)?
        } else {
            group.create_group(part)?
        };
    }
    Ok(group)
}

/// One-call fixture: a file holding a single control source with one 1-D
/// f64 key.
pub fn control_file(
    path: &Path,
    source: &str,
    key: &str,
    train_ids: &[u64],
    values: &[f64],
) -> hdf5::Result<()> {
    let mut builder = RunFileBuilder::create(path, train_ids)?;
    builder.declare(&format!("CONTROL/{}", source));
    builder.write_1d(
        &format!("CONTROL/{}/{}", source, key.replace('.', "/")),
        values,
    )?;
    builder.finish()
}
