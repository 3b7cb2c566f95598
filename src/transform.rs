use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::Matrix;

/// Scalar used to normalize a matrix. Every mode divides by one value.
///
/// `Max` is taken over the whole loaded matrix. The matrix norms only make
/// sense for a coefficient matrix, so they are applied to each case after
/// reshaping (see [`crate::exhibit::build`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizeMode {
    /// Largest absolute entry.
    #[serde(rename = "max")]
    Max,
    /// Induced 1-norm: largest absolute column sum.
    #[serde(rename = "1")]
    One,
    /// Spectral norm: largest singular value.
    #[serde(rename = "2")]
    Two,
    /// Induced infinity norm: largest absolute row sum.
    #[serde(rename = "inf")]
    Inf,
    /// Frobenius norm.
    #[serde(rename = "fro")]
    Fro,
    /// Nuclear norm: sum of singular values.
    #[serde(rename = "nuc")]
    Nuc,
}

impl NormalizeMode {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizeMode::Max => "max",
            NormalizeMode::One => "1",
            NormalizeMode::Two => "2",
            NormalizeMode::Inf => "inf",
            NormalizeMode::Fro => "fro",
            NormalizeMode::Nuc => "nuc",
        }
    }

    /// True for modes applied to the whole loaded matrix by [`transform`].
    pub fn is_whole_matrix(&self) -> bool {
        matches!(self, NormalizeMode::Max)
    }

    /// The divisor this mode applies to `m`.
    pub fn norm(&self, m: &Matrix) -> f64 {
        match self {
            NormalizeMode::Max => m.iter().fold(0.0, |acc: f64, v| acc.max(v.abs())),
            NormalizeMode::One => m
                .columns()
                .into_iter()
                .map(|col| col.iter().map(|v| v.abs()).sum::<f64>())
                .fold(0.0, f64::max),
            NormalizeMode::Inf => m
                .rows()
                .into_iter()
                .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
                .fold(0.0, f64::max),
            NormalizeMode::Fro => m.iter().map(|v| v * v).sum::<f64>().sqrt(),
            NormalizeMode::Two => singular_values(m).into_iter().fold(0.0, f64::max),
            NormalizeMode::Nuc => singular_values(m).into_iter().sum(),
        }
    }
}

impl FromStr for NormalizeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(NormalizeMode::Max),
            "1" => Ok(NormalizeMode::One),
            "2" => Ok(NormalizeMode::Two),
            "inf" => Ok(NormalizeMode::Inf),
            "fro" => Ok(NormalizeMode::Fro),
            "nuc" => Ok(NormalizeMode::Nuc),
            other => Err(Error::InvalidParameter(format!(
                "unknown normalization '{}' (expected max, 1, 2, inf, fro or nuc)",
                other
            ))),
        }
    }
}

fn singular_values(m: &Matrix) -> Vec<f64> {
    if m.is_empty() {
        return Vec::new();
    }
    let (rows, cols) = m.dim();
    let dm = DMatrix::from_fn(rows, cols, |i, j| m[[i, j]]);
    dm.singular_values().iter().copied().collect()
}

/// Value transforms applied after loading.
///
/// `transpose` is honoured by the loader; the rest run in the fixed order
/// abs, clip, normalize. Only whole-matrix normalization happens here; the
/// per-case matrix norms are left to the configuration builder. Clip bounds
/// after `use_abs` are expected to be non-negative; that is not checked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    #[serde(default)]
    pub transpose: bool,
    #[serde(default)]
    pub use_abs: bool,
    #[serde(default)]
    pub clip: Option<(f64, f64)>,
    #[serde(default)]
    pub normalize: Option<NormalizeMode>,
}

/// Apply `params` to a copy of `m`.
pub fn transform(m: &Matrix, params: &TransformParams) -> Result<Matrix> {
    let mut out = m.clone();

    if params.use_abs {
        out.mapv_inplace(f64::abs);
    }

    if let Some((lo, hi)) = params.clip {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(Error::InvalidParameter(format!(
                "clip range [{}, {}] is empty",
                lo, hi
            )));
        }
        out.mapv_inplace(|v| v.clamp(lo, hi));
    }

    match params.normalize {
        Some(mode) if mode.is_whole_matrix() => normalize(&out, mode),
        _ => Ok(out),
    }
}

/// Divide `m` by its `mode` norm.
pub fn normalize(m: &Matrix, mode: NormalizeMode) -> Result<Matrix> {
    let divisor = mode.norm(m);
    if divisor == 0.0 || !divisor.is_finite() {
        return Err(Error::DegenerateInput(format!(
            "cannot normalize by the '{}' norm {}",
            mode.name(),
            divisor
        )));
    }
    Ok(m.mapv(|v| v / divisor))
}
