// Matrix loading from scientific containers.
// MATLAB level 5 files go through `matfile`, JSON containers through serde_json.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use matfile::{MatFile, NumericData};
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, IxDyn, ShapeBuilder};
use serde_json::Value;

use crate::error::{Error, Result};

/// A dense real matrix, `rows x cols`.
pub type Matrix = Array2<f64>;

/// Container formats the loader understands, picked by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Mat,
    Json,
}

impl Container {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mat") => Ok(Container::Mat),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Container::Json),
            _ => Err(Error::format(path, "unknown container (expected .mat or .json)")),
        }
    }
}

/// Load `variable` from the container at `path`.
///
/// 2-D variables come back as stored (or transposed). 3-D variables are a
/// stack of matrices and come back with one flattened slice per row: slices
/// run along the first axis, or along the last axis when `transpose` is set.
pub fn load<P: AsRef<Path>>(path: P, variable: &str, transpose: bool) -> Result<Matrix> {
    let path = path.as_ref();
    let array = read_variable(path, variable)?;
    stack_rows(array, transpose).map_err(|reason| {
        Error::format(path, format!("variable '{}': {}", variable, reason))
    })
}

/// Load `variable` as a list of whole matrices.
///
/// A 2-D variable is one matrix (transposed when asked). A 3-D variable
/// yields its slices along the first axis, or along the last axis when
/// `transpose` is set.
pub fn load_stack<P: AsRef<Path>>(path: P, variable: &str, transpose: bool) -> Result<Vec<Matrix>> {
    let path = path.as_ref();
    let array = read_variable(path, variable)?;
    split_slices(array, transpose).map_err(|reason| {
        Error::format(path, format!("variable '{}': {}", variable, reason))
    })
}

/// Stack matrices with the same column count on top of each other.
pub fn concat_rows(mats: &[Matrix]) -> Result<Matrix> {
    let cols = match mats.first() {
        Some(first) => first.ncols(),
        None => return Err(Error::Shape("no matrices to concatenate".to_string())),
    };
    if let Some(other) = mats.iter().find(|m| m.ncols() != cols) {
        return Err(Error::Shape(format!(
            "cannot stack rows of {} and {} columns",
            cols,
            other.ncols()
        )));
    }
    let views: Vec<ArrayView2<f64>> = mats.iter().map(|m| m.view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|e| Error::Shape(e.to_string()))
}

fn read_variable(path: &Path, variable: &str) -> Result<ArrayD<f64>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("file '{}'", path.display())));
    }
    match Container::from_path(path)? {
        Container::Mat => read_mat_variable(path, variable),
        Container::Json => read_json_variable(path, variable),
    }
}

fn read_mat_variable(path: &Path, variable: &str) -> Result<ArrayD<f64>> {
    let file = File::open(path)?;
    let mat = MatFile::parse(BufReader::new(file)).map_err(|e| Error::format(path, e))?;

    let array = mat.find_by_name(variable).ok_or_else(|| {
        Error::NotFound(format!("variable '{}' in '{}'", variable, path.display()))
    })?;

    let dims = array.size().to_vec();
    let data = widen(array.data()).map_err(|reason| {
        Error::format(path, format!("variable '{}': {}", variable, reason))
    })?;

    // MATLAB stores column-major
    ArrayD::from_shape_vec(IxDyn(&dims).f(), data).map_err(|e| Error::format(path, e))
}

macro_rules! widen_real {
    ($real:expr, $imag:expr) => {{
        if $imag.is_some() {
            return Err("complex data is not supported".to_string());
        }
        $real.iter().map(|&v| v as f64).collect()
    }};
}

fn widen(data: &NumericData) -> std::result::Result<Vec<f64>, String> {
    let values = match data {
        NumericData::Double { real, imag } => widen_real!(real, imag),
        NumericData::Single { real, imag } => widen_real!(real, imag),
        NumericData::Int8 { real, imag } => widen_real!(real, imag),
        NumericData::UInt8 { real, imag } => widen_real!(real, imag),
        NumericData::Int16 { real, imag } => widen_real!(real, imag),
        NumericData::UInt16 { real, imag } => widen_real!(real, imag),
        NumericData::Int32 { real, imag } => widen_real!(real, imag),
        NumericData::UInt32 { real, imag } => widen_real!(real, imag),
        NumericData::Int64 { real, imag } => widen_real!(real, imag),
        NumericData::UInt64 { real, imag } => widen_real!(real, imag),
    };
    Ok(values)
}

fn read_json_variable(path: &Path, variable: &str) -> Result<ArrayD<f64>> {
    let file = File::open(path)?;
    let root: serde_json::Map<String, Value> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::format(path, e))?;

    let value = root.get(variable).ok_or_else(|| {
        Error::NotFound(format!("variable '{}' in '{}'", variable, path.display()))
    })?;

    let mut shape = Vec::new();
    let mut data = Vec::new();
    flatten_nested(value, 0, &mut shape, &mut data).map_err(|reason| {
        Error::format(path, format!("variable '{}': {}", variable, reason))
    })?;

    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| Error::format(path, e))
}

/// Flatten nested JSON arrays in row-major order, recording the extent of
/// each level and rejecting ragged input.
fn flatten_nested(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    data: &mut Vec<f64>,
) -> std::result::Result<(), String> {
    match value {
        Value::Array(items) => {
            if depth == shape.len() {
                if !data.is_empty() {
                    return Err("ragged nesting".to_string());
                }
                shape.push(items.len());
            } else if depth > shape.len() || shape[depth] != items.len() {
                return Err(format!("ragged array at depth {}", depth));
            }
            for item in items {
                flatten_nested(item, depth + 1, shape, data)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            if depth != shape.len() {
                return Err("ragged nesting".to_string());
            }
            let v = n.as_f64().ok_or("number out of range")?;
            data.push(v);
            Ok(())
        }
        other => Err(format!("expected a number or an array, found {}", other)),
    }
}

fn stack_rows(array: ArrayD<f64>, transpose: bool) -> std::result::Result<Matrix, String> {
    match array.ndim() {
        2 => {
            let mat = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| e.to_string())?;
            let mat = if transpose { mat.reversed_axes() } else { mat };
            Ok(mat.as_standard_layout().into_owned())
        }
        3 => {
            let axis = if transpose { Axis(2) } else { Axis(0) };
            let count = array.len_of(axis);
            let width = if count == 0 { 0 } else { array.len() / count };

            let mut rows = Vec::with_capacity(array.len());
            for slice in array.axis_iter(axis) {
                rows.extend(slice.iter().copied());
            }
            Array2::from_shape_vec((count, width), rows).map_err(|e| e.to_string())
        }
        n => Err(format!("unsupported number of dimensions: {}", n)),
    }
}

fn split_slices(array: ArrayD<f64>, transpose: bool) -> std::result::Result<Vec<Matrix>, String> {
    match array.ndim() {
        2 => stack_rows(array, transpose).map(|mat| vec![mat]),
        3 => {
            let axis = if transpose { Axis(2) } else { Axis(0) };
            array
                .axis_iter(axis)
                .map(|slice| {
                    slice
                        .into_dimensionality::<Ix2>()
                        .map(|mat| mat.as_standard_layout().into_owned())
                        .map_err(|e| e.to_string())
                })
                .collect()
        }
        n => Err(format!("unsupported number of dimensions: {}", n)),
    }
}
