//! Typed and dynamically-typed row reads from leaf datasets.
//!
//! All reads address rows by absolute offset along the leading axis and pull
//! exactly the requested range, whatever the trailing shape of the dataset.

use hdf5::types::TypeDescriptor;
use hdf5::{Dataset, H5Type};
use ndarray::{s, ArrayD, Axis, Ix2, Ix3, Ix4, IxDyn, Slice};

use crate::error::{Error, Result};

/// Value read from a leaf dataset whose element type is only known at
/// runtime. Unsigned, signed, and floating storage are widened to 64 bits;
/// anything else is rejected as unsupported.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValue {
    /// Unsigned integer data
    UInt(ArrayD<u64>),
    /// Signed integer data
    Int(ArrayD<i64>),
    /// Floating-point data
    Float(ArrayD<f64>),
}

impl DatasetValue {
    /// Shape of the contained array
    pub fn shape(&self) -> &[usize] {
        match self {
            DatasetValue::UInt(a) => a.shape(),
            DatasetValue::Int(a) => a.shape(),
            DatasetValue::Float(a) => a.shape(),
        }
    }

    /// Unsigned view, if that is what was stored
    pub fn as_uint(&self) -> Option<&ArrayD<u64>> {
        match self {
            DatasetValue::UInt(a) => Some(a),
            _ => None,
        }
    }

    /// Signed view, if that is what was stored
    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            DatasetValue::Int(a) => Some(a),
            _ => None,
        }
    }

    /// Float view, if that is what was stored
    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            DatasetValue::Float(a) => Some(a),
            _ => None,
        }
    }
}

/// Read rows `[start, end)` along the leading axis, keeping that axis.
pub fn read_rows<T: H5Type + Clone>(ds: &Dataset, start: usize, end: usize) -> Result<ArrayD<T>> {
    let shape = ds.shape();
    if shape.is_empty() {
        return Err(Error::InvalidData(format!(
            "cannot slice rows of scalar dataset {}",
            ds.name()
        )));
    }
    // An empty hyperslab is not a valid HDF5 selection; synthesize the
    // zero-row array instead.
    if start >= end {
        let mut empty = shape;
        empty[0] = 0;
        return ArrayD::from_shape_vec(IxDyn(&empty), Vec::new())
            .map_err(|e| Error::InvalidData(e.to_string()));
    }
    let arr = match shape.len() {
        1 => ds.read_slice_1d::<T, _>(s![start..end])?.into_dyn(),
        2 => ds.read_slice::<T, _, Ix2>(s![start..end, ..])?.into_dyn(),
        3 => ds
            .read_slice::<T, _, Ix3>(s![start..end, .., ..])?
            .into_dyn(),
        4 => ds
            .read_slice::<T, _, Ix4>(s![start..end, .., .., ..])?
            .into_dyn(),
        _ => {
            // Rank > 4 is unusual enough that a full read is acceptable.
            let all = ds.read_dyn::<T>()?;
            all.slice_axis(Axis(0), Slice::from(start..end)).to_owned()
        }
    };
    Ok(arr)
}

/// Read one row at `pos`, dropping the leading axis.
pub fn read_row<T: H5Type + Clone>(ds: &Dataset, pos: usize) -> Result<ArrayD<T>> {
    Ok(read_rows::<T>(ds, pos, pos + 1)?.index_axis_move(Axis(0), 0))
}

/// Read `count` records starting at row `first`, dispatching on the stored
/// element type. A single record comes back without its leading axis, a
/// larger block keeps it.
pub fn read_records(ds: &Dataset, first: usize, count: usize) -> Result<DatasetValue> {
    match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::Unsigned(_) => Ok(DatasetValue::UInt(read_block::<u64>(ds, first, count)?)),
        TypeDescriptor::Integer(_) => Ok(DatasetValue::Int(read_block::<i64>(ds, first, count)?)),
        TypeDescriptor::Float(_) => Ok(DatasetValue::Float(read_block::<f64>(ds, first, count)?)),
        other => Err(Error::InvalidData(format!(
            "unsupported dataset type {:?} at {}",
            other,
            ds.name()
        ))),
    }
}

fn read_block<T: H5Type + Clone>(ds: &Dataset, first: usize, count: usize) -> Result<ArrayD<T>> {
    if count == 1 {
        read_row::<T>(ds, first)
    } else {
        read_rows::<T>(ds, first, first + count)
    }
}
