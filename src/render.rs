// Boundary to the external netbrot renderer.
// Every case of a configuration becomes one exhibit document and one image.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exhibit::{Exhibit, RenderConfiguration, check_writable, write_json};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Pixels per side.
    pub resolution: u32,
    /// Iteration cap.
    pub maxit: u32,
    /// Overrides the configuration's escape radius when set.
    pub escape_radius: Option<f64>,
    /// Render only the averaged cases.
    pub average_only: bool,
    pub outdir: PathBuf,
    /// Replace exhibit documents left by an earlier run.
    pub overwrite: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            resolution: 1024,
            maxit: 256,
            escape_radius: None,
            average_only: false,
            outdir: PathBuf::from("."),
            overwrite: false,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 || self.maxit == 0 {
            return Err(Error::InvalidParameter(format!(
                "resolution ({}) and maxit ({}) must be positive",
                self.resolution, self.maxit
            )));
        }
        if let Some(r) = self.escape_radius {
            if !(r > 0.0 && r.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "escape radius must be positive, got {}",
                    r
                )));
            }
        }
        Ok(())
    }
}

/// Something that turns one exhibit document into one raster image.
pub trait Renderer {
    /// Render `exhibit` into `outfile` and return the image path.
    fn render(&self, exhibit: &Path, outfile: &Path, settings: &RenderSettings) -> Result<PathBuf>;
}

/// Runs the `netbrot` executable once per exhibit.
#[derive(Clone, Debug)]
pub struct NetbrotRenderer {
    pub program: PathBuf,
}

impl Default for NetbrotRenderer {
    fn default() -> Self {
        NetbrotRenderer {
            program: PathBuf::from("netbrot"),
        }
    }
}

impl Renderer for NetbrotRenderer {
    fn render(&self, exhibit: &Path, outfile: &Path, settings: &RenderSettings) -> Result<PathBuf> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--resolution")
            .arg(settings.resolution.to_string())
            .arg("--maxit")
            .arg(settings.maxit.to_string())
            .arg("--outfile")
            .arg(outfile);
        if let Some(r) = settings.escape_radius {
            cmd.arg("--escape-radius").arg(r.to_string());
        }
        cmd.arg(exhibit);

        debug!(?cmd, "spawning renderer");
        let status = cmd.status().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("renderer program '{}'", self.program.display()))
            }
            _ => Error::Io(e),
        })?;

        if !status.success() {
            return Err(Error::Render(format!(
                "'{}' exited with {} on '{}'",
                self.program.display(),
                status,
                exhibit.display()
            )));
        }
        Ok(outfile.to_path_buf())
    }
}

/// Output image name: `{case}-r{resolution}-m{maxit}-{stamp}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedName {
    pub case: String,
    pub resolution: u32,
    pub maxit: u32,
    pub stamp: u64,
}

impl RenderedName {
    pub fn file_name(&self) -> String {
        format!(
            "{}-r{}-m{}-{}.png",
            self.case, self.resolution, self.maxit, self.stamp
        )
    }

    /// Parse a file stem produced by [`RenderedName::file_name`].
    pub fn parse(stem: &str) -> Option<RenderedName> {
        let mut parts = stem.rsplitn(4, '-');
        let stamp = parts.next()?.parse().ok()?;
        let maxit = parts.next()?.strip_prefix('m')?.parse().ok()?;
        let resolution = parts.next()?.strip_prefix('r')?.parse().ok()?;
        let case = parts.next().filter(|c| !c.is_empty())?;
        Some(RenderedName {
            case: case.to_string(),
            resolution,
            maxit,
            stamp,
        })
    }
}

fn now_stamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Render the cases of the configuration at `config_path`.
///
/// Exhibit documents are written next to the images in `settings.outdir`.
/// Nothing is written or rendered when one of them exists and
/// `settings.overwrite` is off. Returns the image of every rendered case,
/// keyed by case name.
pub fn render_configuration<R: Renderer + ?Sized>(
    renderer: &R,
    config_path: &Path,
    settings: &RenderSettings,
) -> Result<BTreeMap<String, PathBuf>> {
    settings.validate()?;
    let config = RenderConfiguration::read(config_path)?;
    fs::create_dir_all(&settings.outdir)?;

    let mut targets: Vec<(&str, PathBuf, Exhibit)> = Vec::new();
    for case in &config.cases {
        if settings.average_only && !case.is_average() {
            continue;
        }
        let mut exhibit = config.exhibit(case);
        if let Some(r) = settings.escape_radius {
            exhibit.escape_radius = r;
        }
        let exhibit_path = settings.outdir.join(format!("{}.json", case.name));
        check_writable(&exhibit_path, settings.overwrite)?;
        targets.push((case.name.as_str(), exhibit_path, exhibit));
    }

    let stamp = now_stamp();
    let mut images = BTreeMap::new();

    for (case, exhibit_path, exhibit) in targets {
        write_json(&exhibit_path, &exhibit)?;

        let name = RenderedName {
            case: case.to_string(),
            resolution: settings.resolution,
            maxit: settings.maxit,
            stamp,
        };
        let outfile = settings.outdir.join(name.file_name());

        info!(case = %case, outfile = %outfile.display(), "rendering");
        let image = renderer.render(&exhibit_path, &outfile, settings)?;
        images.insert(case.to_string(), image);
    }

    if images.is_empty() {
        return Err(Error::NotFound(format!(
            "no cases to render in '{}'",
            config_path.display()
        )));
    }
    Ok(images)
}
