//! Truncated Fourier series of closed boundary curves.
//!
//! The curve `x + iy` is resampled uniformly in arclength and transformed
//! with an FFT; coefficients `c_k = 1/N sum_n z_n exp(-2 pi i k n / N)` are
//! kept for `k = -K..=K`.

use bincode::{Decode, Encode};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryCurve, extract, largest};
use crate::error::{Error, Result};
use crate::mask::RasterMask;
use crate::math::Point;

pub type Complex64 = Complex<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FourierSettings {
    /// Truncation order `K`; `2K + 1` coefficients are kept.
    pub order: usize,
    /// Number of arclength-uniform samples `N`, at least `2K + 1`.
    pub samples: usize,
}

impl Default for FourierSettings {
    fn default() -> Self {
        FourierSettings {
            order: 32,
            samples: 512,
        }
    }
}

impl FourierSettings {
    pub fn validate(&self) -> Result<()> {
        if self.samples < 2 * self.order + 1 {
            return Err(Error::InvalidParameter(format!(
                "{} samples cannot resolve order {} (need at least {})",
                self.samples,
                self.order,
                2 * self.order + 1
            )));
        }
        Ok(())
    }
}

/// Shape descriptor of one rendered case.
///
/// `coefficients[j]` holds frequency `j - order` as `[re, im]`, so the DC
/// term sits at position `order`. `area` is the absolute shoelace area and
/// `perimeter` the length of the traced (not resampled) boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct FourierDescriptor {
    pub case_id: String,
    pub order: usize,
    pub coefficients: Vec<[f64; 2]>,
    pub centroid: [f64; 2],
    pub area: f64,
    pub perimeter: f64,
}

impl FourierDescriptor {
    /// Coefficient of frequency `k`, if `|k| <= order`.
    pub fn coefficient(&self, k: isize) -> Option<Complex64> {
        let index = k + self.order as isize;
        if index < 0 {
            return None;
        }
        self.coefficients
            .get(index as usize)
            .map(|c| Complex64::new(c[0], c[1]))
    }

    /// `(frequency, coefficient)` pairs in ascending frequency.
    pub fn spectrum(&self) -> impl Iterator<Item = (isize, Complex64)> + '_ {
        let order = self.order as isize;
        self.coefficients
            .iter()
            .enumerate()
            .map(move |(j, c)| (j as isize - order, Complex64::new(c[0], c[1])))
    }

    pub fn centroid_point(&self) -> Point {
        Point::new(self.centroid[0], self.centroid[1])
    }
}

/// Resample a closed polygon to `n` points equally spaced in arclength,
/// starting at its first vertex.
pub fn resample(points: &[Point], n: usize) -> Result<Vec<Point>> {
    let count = points.len();
    let segments: Vec<f64> = (0..count)
        .map(|i| points[i].dist(points[(i + 1) % count]))
        .collect();
    let total: f64 = segments.iter().sum();
    if count < 2 || total <= 0.0 || !total.is_finite() {
        return Err(Error::DegenerateInput(
            "cannot resample a curve of zero length".to_string(),
        ));
    }

    let step = total / n as f64;
    let mut out = Vec::with_capacity(n);
    let mut i = 0;
    let mut start = 0.0;
    for j in 0..n {
        let target = j as f64 * step;
        while i + 1 < count && start + segments[i] < target {
            start += segments[i];
            i += 1;
        }
        let a = points[i];
        let b = points[(i + 1) % count];
        let point = if segments[i] > 0.0 {
            a.lerp(b, ((target - start) / segments[i]).clamp(0.0, 1.0))
        } else {
            a
        };
        out.push(point);
    }
    Ok(out)
}

/// Fourier descriptor of a closed boundary curve.
pub fn parametrize(
    case_id: &str,
    curve: &BoundaryCurve,
    settings: &FourierSettings,
) -> Result<FourierDescriptor> {
    settings.validate()?;
    if curve.len() < 3 {
        return Err(Error::DegenerateInput(format!(
            "boundary of '{}' has {} points",
            case_id,
            curve.len()
        )));
    }

    let n = settings.samples;
    let resampled = resample(curve.points(), n)?;

    let mut buffer: Vec<Complex64> = resampled
        .iter()
        .map(|p| Complex64::new(p.x, p.y))
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let scale = 1.0 / n as f64;
    let order = settings.order as isize;
    let coefficients: Vec<[f64; 2]> = (-order..=order)
        .map(|k| {
            let c = buffer[k.rem_euclid(n as isize) as usize] * scale;
            [c.re, c.im]
        })
        .collect();

    let dc = coefficients[settings.order];

    Ok(FourierDescriptor {
        case_id: case_id.to_string(),
        order: settings.order,
        coefficients,
        centroid: dc,
        area: curve.area(),
        perimeter: curve.perimeter(),
    })
}

/// Parametrize the largest bounded component of `mask`.
pub fn parametrize_mask(
    case_id: &str,
    mask: &RasterMask,
    settings: &FourierSettings,
) -> Result<FourierDescriptor> {
    let curve =
        largest(extract(mask)).ok_or_else(|| Error::EmptyBoundary(case_id.to_string()))?;
    parametrize(case_id, &curve, settings)
}
