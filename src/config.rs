// Explicit settings for every stage of the exhibit pipeline.
// Defaults match the values the rendering workflow has always used.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exhibit::{CaseShape, EscapeRadius, PlotBounds, SharedParams};
use crate::fourier::FourierSettings;
use crate::mask::MaskOptions;
use crate::render::RenderSettings;
use crate::transform::TransformParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhibitConfig {
    pub bounds: PlotBounds,
    /// Fixed radius, or the cap on the estimate when `estimate_escape_radius`.
    pub escape_radius: Option<f64>,
    pub estimate_escape_radius: bool,
    pub shape: CaseShape,
    pub include_average: bool,
    pub transform: TransformParams,
}

impl Default for ExhibitConfig {
    fn default() -> Self {
        ExhibitConfig {
            bounds: PlotBounds::default(),
            escape_radius: None,
            estimate_escape_radius: true,
            shape: CaseShape::default(),
            include_average: false,
            transform: TransformParams::default(),
        }
    }
}

impl ExhibitConfig {
    pub fn shared(&self) -> Result<SharedParams> {
        let escape_radius = match (self.estimate_escape_radius, self.escape_radius) {
            (true, cap) => EscapeRadius::Estimated {
                max: cap.unwrap_or(f64::INFINITY),
            },
            (false, Some(r)) => EscapeRadius::Fixed(r),
            (false, None) => {
                return Err(Error::InvalidParameter(
                    "a fixed escape radius needs a value".to_string(),
                ));
            }
        };
        Ok(SharedParams {
            bounds: self.bounds,
            escape_radius,
            shape: self.shape,
            normalize: self.transform.normalize,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub exhibit: ExhibitConfig,
    pub render: RenderSettings,
    pub fourier: FourierSettings,
    pub mask: MaskOptions,
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("config '{}'", path.display())));
        }
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|e| Error::format(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.exhibit.bounds.validate()?;
        if let Some(r) = self.exhibit.escape_radius {
            if !(r > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "escape radius must be positive, got {}",
                    r
                )));
            }
        }
        self.render.validate()?;
        self.fourier.validate()?;
        Ok(())
    }
}
