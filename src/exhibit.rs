//! Render configurations for the `netbrot` equi-M renderer.
//!
//! A [`RenderConfiguration`] bundles one [`Case`] per coefficient matrix
//! (plus an optional average) with the plot bounds and escape radius shared
//! by all of them. Each case can also be emitted as a standalone [`Exhibit`],
//! the per-matrix document the renderer reads.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use nalgebra::DMatrix;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::transform::{NormalizeMode, normalize};

/// Suffix reserved for the averaged case.
pub const AVERAGE_SUFFIX: &str = "avg";

/// Rectangle of the complex plane that gets rendered.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotBounds {
    pub xlim: [f64; 2],
    pub ylim: [f64; 2],
}

impl Default for PlotBounds {
    fn default() -> Self {
        PlotBounds {
            xlim: [-10.25, 7.5],
            ylim: [-7.5, 4.25],
        }
    }
}

impl PlotBounds {
    pub fn validate(&self) -> Result<()> {
        let finite = self.xlim.iter().chain(self.ylim.iter()).all(|v| v.is_finite());
        if !finite || self.xlim[0] >= self.xlim[1] {
            return Err(Error::InvalidParameter(format!(
                "invalid bounds: xmin {} xmax {}",
                self.xlim[0], self.xlim[1]
            )));
        }
        if self.ylim[0] >= self.ylim[1] {
            return Err(Error::InvalidParameter(format!(
                "invalid bounds: ymin {} ymax {}",
                self.ylim[0], self.ylim[1]
            )));
        }
        Ok(())
    }

    pub fn upper_left(&self) -> [f64; 2] {
        [self.xlim[0], self.ylim[1]]
    }

    pub fn lower_right(&self) -> [f64; 2] {
        [self.xlim[1], self.ylim[0]]
    }
}

/// How the shared escape radius is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeRadius {
    /// Use this radius for every case.
    Fixed(f64),
    /// Estimate per case from the smallest singular value, cap at `max`, and
    /// share the largest capped estimate.
    Estimated { max: f64 },
}

impl Default for EscapeRadius {
    fn default() -> Self {
        EscapeRadius::Estimated { max: f64::INFINITY }
    }
}

/// How a loaded matrix is split into coefficient matrices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseShape {
    /// A row of length `d * d` becomes a `d x d` matrix, row-major.
    #[default]
    Square,
    /// The row stays a `1 x cols` rectangular matrix.
    Row,
    /// The whole matrix is one case.
    Matrix,
}

impl FromStr for CaseShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "square" => Ok(CaseShape::Square),
            "row" => Ok(CaseShape::Row),
            "matrix" => Ok(CaseShape::Matrix),
            other => Err(Error::InvalidParameter(format!("unknown case shape '{}'", other))),
        }
    }
}

/// Rendering parameters common to every case of a configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedParams {
    #[serde(default)]
    pub bounds: PlotBounds,
    #[serde(default)]
    pub escape_radius: EscapeRadius,
    #[serde(default)]
    pub shape: CaseShape,
    /// Matrix norm each case is divided by. `max` is left to the loader
    /// transforms and ignored here.
    #[serde(default)]
    pub normalize: Option<NormalizeMode>,
}

/// Case identifiers: `{stem}-{index}` padded to the width of the case count,
/// and `{stem}-avg` for the average.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseNaming {
    pub stem: String,
}

impl CaseNaming {
    pub fn new(stem: impl Into<String>) -> Self {
        CaseNaming { stem: stem.into() }
    }

    /// Naming derived from the stem of an output or input file.
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "exhibit".to_string());
        CaseNaming { stem }
    }

    pub fn case_name(&self, index: usize, count: usize) -> String {
        let width = count.to_string().len();
        format!("{}-{:0width$}", self.stem, index, width = width)
    }

    pub fn average_name(&self) -> String {
        format!("{}-{}", self.stem, AVERAGE_SUFFIX)
    }
}

/// One named render unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub name: String,
    #[serde(default)]
    pub average: bool,
    #[serde(with = "renderer_matrix")]
    pub mat: Matrix,
}

impl Case {
    pub fn is_average(&self) -> bool {
        self.average
    }

    /// `2 sqrt(n) / sigma_min^2` for an `n`-row coefficient matrix.
    ///
    /// Singular matrices give `f64::INFINITY`.
    pub fn estimated_escape_radius(&self) -> f64 {
        let sigma = singular_values(&self.mat);
        let largest = sigma.iter().copied().fold(0.0, f64::max);
        let smallest = sigma.iter().copied().fold(f64::INFINITY, f64::min);
        // rank tolerance, as in numerical rank estimates
        let (rows, cols) = self.mat.dim();
        let tol = largest * rows.max(cols) as f64 * f64::EPSILON;
        if sigma.is_empty() || smallest <= tol || !smallest.is_finite() {
            return f64::INFINITY;
        }
        let n = self.mat.nrows() as f64;
        2.0 * n.sqrt() / (smallest * smallest)
    }

    /// Ratio of the extreme singular values, infinite for singular matrices.
    pub fn condition_number(&self) -> f64 {
        let sigma = singular_values(&self.mat);
        let largest = sigma.iter().copied().fold(0.0, f64::max);
        let smallest = sigma.iter().copied().fold(f64::INFINITY, f64::min);
        if smallest > 0.0 {
            largest / smallest
        } else {
            f64::INFINITY
        }
    }
}

fn singular_values(m: &Matrix) -> Vec<f64> {
    let (rows, cols) = m.dim();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    DMatrix::from_fn(rows, cols, |i, j| m[[i, j]])
        .singular_values()
        .iter()
        .copied()
        .collect()
}

/// The per-case document consumed by the external renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exhibit {
    #[serde(with = "renderer_matrix")]
    pub mat: Matrix,
    pub escape_radius: f64,
    pub upper_left: [f64; 2],
    pub lower_right: [f64; 2],
}

/// Everything needed to render a set of cases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfiguration {
    pub xlim: [f64; 2],
    pub ylim: [f64; 2],
    pub escape_radius: f64,
    pub cases: Vec<Case>,
}

/// Build one case per row of `m` (or a single case for
/// [`CaseShape::Matrix`]), plus the average when requested.
pub fn build(
    m: &Matrix,
    naming: &CaseNaming,
    include_average: bool,
    shared: &SharedParams,
) -> Result<RenderConfiguration> {
    let (rows, cols) = m.dim();
    if rows == 0 || cols == 0 {
        return Err(Error::Shape(format!("cannot build cases from a {}x{} matrix", rows, cols)));
    }

    let mats = match shared.shape {
        CaseShape::Matrix => vec![m.clone()],
        shape => {
            let dims = coefficient_shape(cols, shape)?;
            m.axis_iter(Axis(0))
                .map(|row| {
                    Array2::from_shape_vec(dims, row.to_vec())
                        .map_err(|e| Error::Shape(e.to_string()))
                })
                .collect::<Result<Vec<_>>>()?
        }
    };
    build_cases(mats, naming, include_average, shared)
}

/// Build one case per coefficient matrix, in order.
///
/// Matrix norms in `shared.normalize` are applied to each matrix before the
/// average is taken. All matrices must have the same shape.
pub fn build_cases(
    mats: Vec<Matrix>,
    naming: &CaseNaming,
    include_average: bool,
    shared: &SharedParams,
) -> Result<RenderConfiguration> {
    shared.bounds.validate()?;

    let dim = match mats.first() {
        Some(first) => first.dim(),
        None => return Err(Error::Shape("no coefficient matrices".to_string())),
    };
    if dim.0 == 0 || dim.1 == 0 {
        return Err(Error::Shape(format!("cannot build cases from a {}x{} matrix", dim.0, dim.1)));
    }
    if let Some(other) = mats.iter().find(|mat| mat.dim() != dim) {
        return Err(Error::Shape(format!(
            "case matrices differ in shape: {}x{} and {}x{}",
            dim.0,
            dim.1,
            other.nrows(),
            other.ncols()
        )));
    }

    let mats = match shared.normalize {
        Some(mode) if !mode.is_whole_matrix() => mats
            .iter()
            .map(|mat| normalize(mat, mode))
            .collect::<Result<Vec<_>>>()?,
        _ => mats,
    };

    let count = mats.len();
    let average = include_average.then(|| {
        let total = mats.iter().fold(Array2::<f64>::zeros(dim), |acc, mat| acc + mat);
        total / count as f64
    });

    let mut cases: Vec<Case> = mats
        .into_iter()
        .enumerate()
        .map(|(i, mat)| Case {
            name: naming.case_name(i, count),
            average: false,
            mat,
        })
        .collect();
    if let Some(mat) = average {
        cases.push(Case {
            name: naming.average_name(),
            average: true,
            mat,
        });
    }

    let escape_radius = shared_escape_radius(&cases, shared.escape_radius)?;

    Ok(RenderConfiguration {
        xlim: shared.bounds.xlim,
        ylim: shared.bounds.ylim,
        escape_radius,
        cases,
    })
}

fn coefficient_shape(cols: usize, shape: CaseShape) -> Result<(usize, usize)> {
    match shape {
        CaseShape::Row => Ok((1, cols)),
        CaseShape::Matrix => Err(Error::Shape("a whole matrix is not a row shape".to_string())),
        CaseShape::Square => {
            let d = (cols as f64).sqrt().round() as usize;
            if d * d != cols {
                return Err(Error::Shape(format!(
                    "row length {} is not a perfect square",
                    cols
                )));
            }
            Ok((d, d))
        }
    }
}

fn shared_escape_radius(cases: &[Case], policy: EscapeRadius) -> Result<f64> {
    let radius = match policy {
        EscapeRadius::Fixed(r) => r,
        EscapeRadius::Estimated { max } => {
            if max.is_nan() || max <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "maximum escape radius must be positive, got {}",
                    max
                )));
            }
            let mut radius: f64 = 0.0;
            for case in cases {
                radius = radius.max(case.estimated_escape_radius().min(max));
            }
            if radius.is_infinite() {
                let name = cases
                    .iter()
                    .find(|case| case.estimated_escape_radius().is_infinite())
                    .map(|case| case.name.as_str())
                    .unwrap_or_default();
                return Err(Error::DegenerateInput(format!(
                    "case '{}' is singular; set a maximum escape radius",
                    name
                )));
            }
            radius
        }
    };

    if !(radius > 0.0 && radius.is_finite()) {
        return Err(Error::InvalidParameter(format!(
            "escape radius must be positive and finite, got {}",
            radius
        )));
    }
    Ok(radius)
}

pub(crate) fn check_writable(path: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        return Err(Error::Overwrite(path.to_path_buf()));
    }
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(value).map_err(|e| Error::format(path, e))?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

impl RenderConfiguration {
    pub fn bounds(&self) -> PlotBounds {
        PlotBounds {
            xlim: self.xlim,
            ylim: self.ylim,
        }
    }

    pub fn average_cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.iter().filter(|case| case.is_average())
    }

    pub fn case(&self, name: &str) -> Option<&Case> {
        self.cases.iter().find(|case| case.name == name)
    }

    /// Deterministic JSON text of the configuration.
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        text.push('\n');
        Ok(text)
    }

    /// Write the configuration to exactly one file.
    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        check_writable(path, overwrite)?;
        write_json(path, self)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("file '{}'", path.display())));
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::format(path, e))
    }

    pub fn exhibit(&self, case: &Case) -> Exhibit {
        let bounds = self.bounds();
        Exhibit {
            mat: case.mat.clone(),
            escape_radius: self.escape_radius,
            upper_left: bounds.upper_left(),
            lower_right: bounds.lower_right(),
        }
    }

    /// Renderer documents for every case, in case order.
    pub fn exhibits(&self) -> Vec<(String, Exhibit)> {
        self.cases
            .iter()
            .map(|case| (case.name.clone(), self.exhibit(case)))
            .collect()
    }

    /// Write one `{case}.json` renderer document per case into `dir`.
    ///
    /// Nothing is written when any target exists and `overwrite` is off.
    pub fn write_exhibits<P: AsRef<Path>>(&self, dir: P, overwrite: bool) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let targets: Vec<(PathBuf, Exhibit)> = self
            .exhibits()
            .into_iter()
            .map(|(name, exhibit)| (dir.join(format!("{}.json", name)), exhibit))
            .collect();

        for (path, _) in &targets {
            check_writable(path, overwrite)?;
        }
        for (path, exhibit) in &targets {
            write_json(path, exhibit)?;
        }
        Ok(targets.into_iter().map(|(path, _)| path).collect())
    }
}

/// Serde format of the renderer for a complex matrix:
/// `[[[re, im], ...], nrows, ncols]` with entries in column-major order.
mod renderer_matrix {
    use ndarray::Array2;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::matrix::Matrix;

    pub fn serialize<S: Serializer>(m: &Matrix, serializer: S) -> Result<S::Ok, S::Error> {
        let (rows, cols) = m.dim();
        let entries: Vec<[f64; 2]> = m.t().iter().map(|&v| [v, 0.0]).collect();
        (entries, rows, cols).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Matrix, D::Error> {
        let (entries, rows, cols): (Vec<[f64; 2]>, usize, usize) =
            Deserialize::deserialize(deserializer)?;
        if entries.len() != rows * cols {
            return Err(D::Error::custom(format!(
                "expected {} entries for a {}x{} matrix, found {}",
                rows * cols,
                rows,
                cols,
                entries.len()
            )));
        }
        if entries.iter().any(|e| e[1] != 0.0) {
            return Err(D::Error::custom("complex coefficients are not supported"));
        }
        let real: Vec<f64> = entries.iter().map(|e| e[0]).collect();
        let transposed = Array2::from_shape_vec((cols, rows), real).map_err(D::Error::custom)?;
        Ok(transposed.reversed_axes().as_standard_layout().into_owned())
    }
}
