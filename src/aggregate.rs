//! Batch parametrization of rendered images and the descriptor container.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::fourier::{FourierDescriptor, FourierSettings, parametrize_mask};
use crate::mask::{MaskOptions, load_mask};
use crate::render::RenderedName;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// What a batch does when one image fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Abort on the first failure, in case-id order.
    #[default]
    FailFast,
    /// Keep going and report every failure next to the successes.
    Collect,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AggregateOptions {
    pub fourier: FourierSettings,
    pub mask: MaskOptions,
    pub mode: FailureMode,
    /// Spread images over the rayon thread pool.
    pub parallel: bool,
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct Batch {
    pub descriptors: BTreeMap<String, FourierDescriptor>,
    pub failures: Vec<(String, Error)>,
}

impl Batch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The descriptors, or `AggregationPartialFailure` if anything failed.
    pub fn into_result(self) -> Result<BTreeMap<String, FourierDescriptor>> {
        if self.failures.is_empty() {
            return Ok(self.descriptors);
        }
        Err(Error::AggregationPartialFailure {
            descriptors: self.descriptors.into_values().collect(),
            failures: self.failures,
        })
    }
}

/// Threshold, trace and parametrize one rendered image.
pub fn describe_image(
    case_id: &str,
    path: &Path,
    options: &AggregateOptions,
) -> Result<FourierDescriptor> {
    let mask = load_mask(path, options.mask)?;
    parametrize_mask(case_id, &mask, &options.fourier)
}

/// Parametrize every image of `inputs`, keyed by case id.
pub fn aggregate(inputs: &BTreeMap<String, PathBuf>, options: &AggregateOptions) -> Result<Batch> {
    options.fourier.validate()?;

    let mut batch = Batch::default();

    if !options.parallel && options.mode == FailureMode::FailFast {
        for (case_id, path) in inputs {
            let descriptor = describe_image(case_id, path, options)?;
            batch.descriptors.insert(case_id.clone(), descriptor);
        }
        return Ok(batch);
    }

    let results: Vec<(String, Result<FourierDescriptor>)> = if options.parallel {
        inputs
            .par_iter()
            .map(|(case_id, path)| (case_id.clone(), describe_image(case_id, path, options)))
            .collect()
    } else {
        inputs
            .iter()
            .map(|(case_id, path)| (case_id.clone(), describe_image(case_id, path, options)))
            .collect()
    };

    for (case_id, result) in results {
        match result {
            Ok(descriptor) => {
                batch.descriptors.insert(case_id, descriptor);
            }
            Err(err) if options.mode == FailureMode::FailFast => return Err(err),
            Err(err) => batch.failures.push((case_id, err)),
        }
    }

    Ok(batch)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Case id of a rendered image: its file stem without the renderer's
/// resolution/iteration/timestamp suffix.
pub fn case_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match RenderedName::parse(&stem) {
        Some(name) => name.case,
        None => stem,
    }
}

/// Expand glob patterns and directories into a case-id keyed input map.
pub fn collect_inputs<S: AsRef<str>>(patterns: &[S]) -> Result<BTreeMap<String, PathBuf>> {
    let mut inputs: BTreeMap<String, PathBuf> = BTreeMap::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched: Vec<PathBuf> = Vec::new();

        if Path::new(pattern).is_dir() {
            for entry in WalkDir::new(pattern).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                if entry.file_type().is_file() && is_image(entry.path()) {
                    matched.push(entry.into_path());
                }
            }
        } else {
            let paths = glob::glob(pattern).map_err(|e| {
                Error::InvalidParameter(format!("bad pattern '{}': {}", pattern, e))
            })?;
            for path in paths {
                matched.push(path.map_err(|e| Error::Io(e.into()))?);
            }
        }

        if matched.is_empty() {
            return Err(Error::NotFound(format!("no images match '{}'", pattern)));
        }

        for path in matched {
            let case_id = case_id_for(&path);
            match inputs.get(&case_id) {
                Some(existing) if *existing != path => {
                    return Err(Error::InvalidParameter(format!(
                        "case '{}' matches both '{}' and '{}'",
                        case_id,
                        existing.display(),
                        path.display()
                    )));
                }
                Some(_) => {}
                None => {
                    inputs.insert(case_id, path);
                }
            }
        }
    }

    Ok(inputs)
}

/// Serialized output of a batch run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct DescriptorSet {
    pub order: usize,
    pub samples: usize,
    pub descriptors: BTreeMap<String, FourierDescriptor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Json,
    Bincode,
}

fn encoding_for(path: &Path) -> Result<Encoding> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Encoding::Json),
        Some("bin") => Ok(Encoding::Bincode),
        _ => Err(Error::InvalidParameter(format!(
            "descriptor file '{}' must end in .json or .bin",
            path.display()
        ))),
    }
}

impl DescriptorSet {
    pub fn new(settings: &FourierSettings, descriptors: BTreeMap<String, FourierDescriptor>) -> Self {
        DescriptorSet {
            order: settings.order,
            samples: settings.samples,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        let encoding = encoding_for(path)?;
        if !overwrite && path.exists() {
            return Err(Error::Overwrite(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = match encoding {
            Encoding::Json => {
                let mut text =
                    serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
                text.push('\n');
                text.into_bytes()
            }
            Encoding::Bincode => {
                let cfg = bincode::config::standard();
                bincode::encode_to_vec(self, cfg).map_err(|e| Error::format(path, e))?
            }
        };
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let encoding = encoding_for(path)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("file '{}'", path.display())));
        }
        let data = fs::read(path)?;
        match encoding {
            Encoding::Json => serde_json::from_slice(&data).map_err(|e| Error::format(path, e)),
            Encoding::Bincode => {
                let cfg = bincode::config::standard();
                let (set, _len): (DescriptorSet, usize) =
                    bincode::decode_from_slice(&data, cfg).map_err(|e| Error::format(path, e))?;
                Ok(set)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::RasterMask;

    fn disk(size: usize, r: f64) -> RasterMask {
        let c = (size as f64 - 1.0) / 2.0;
        RasterMask::from_fn(size, size, |x, y| {
            let dx = x as f64 - c;
            let dy = y as f64 - c;
            dx * dx + dy * dy <= r * r
        })
    }

    fn write_disk(dir: &Path, name: &str, r: f64) -> PathBuf {
        let path = dir.join(name);
        disk(48, r).to_image().save(&path).unwrap();
        path
    }

    fn options(mode: FailureMode, parallel: bool) -> AggregateOptions {
        AggregateOptions {
            fourier: FourierSettings {
                order: 4,
                samples: 64,
            },
            mode,
            parallel,
            ..Default::default()
        }
    }

    #[test]
    fn fail_fast_stops_on_a_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), write_disk(dir.path(), "a.png", 10.0));
        let bad = dir.path().join("b.png");
        fs::write(&bad, b"garbage").unwrap();
        inputs.insert("b".to_string(), bad);

        let err = aggregate(&inputs, &options(FailureMode::FailFast, false)).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = BTreeMap::new();
        for (i, r) in [6.0, 9.0, 12.0, 15.0].iter().enumerate() {
            let name = format!("c{}", i);
            inputs.insert(name.clone(), write_disk(dir.path(), &format!("{}.png", name), *r));
        }

        let seq = aggregate(&inputs, &options(FailureMode::Collect, false)).unwrap();
        let par = aggregate(&inputs, &options(FailureMode::Collect, true)).unwrap();
        assert!(seq.is_complete());
        assert_eq!(seq.descriptors, par.descriptors);
    }

    #[test]
    fn blank_image_is_reported_as_empty_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.png");
        RasterMask::new(16, 16).to_image().save(&blank).unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("blank".to_string(), blank);

        let batch = aggregate(&inputs, &options(FailureMode::Collect, false)).unwrap();
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(batch.failures[0].1, Error::EmptyBoundary(_)));
        assert!(matches!(
            batch.into_result(),
            Err(Error::AggregationPartialFailure { .. })
        ));
    }

    #[test]
    fn inputs_from_directories_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        write_disk(dir.path(), "w-0-r48-m100-1700000000.png", 5.0);
        write_disk(dir.path(), "w-avg-r48-m100-1700000000.png", 5.0);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let from_dir = collect_inputs(&[dir.path().to_string_lossy()]).unwrap();
        assert_eq!(from_dir.keys().collect::<Vec<_>>(), ["w-0", "w-avg"]);

        let pattern = format!("{}/*-avg-*.png", dir.path().display());
        let from_glob = collect_inputs(&[pattern]).unwrap();
        assert_eq!(from_glob.keys().collect::<Vec<_>>(), ["w-avg"]);

        let nothing = format!("{}/*.tiff", dir.path().display());
        assert!(matches!(collect_inputs(&[nothing]), Err(Error::NotFound(_))));
    }

    #[test]
    fn duplicate_case_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_disk(dir.path(), "w-0-r48-m100-1.png", 5.0);
        write_disk(dir.path(), "w-0-r48-m100-2.png", 5.0);
        let err = collect_inputs(&[dir.path().to_string_lossy()]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn container_round_trips_in_both_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("d".to_string(), write_disk(dir.path(), "d.png", 11.0));
        let opts = options(FailureMode::FailFast, false);
        let descriptors = aggregate(&inputs, &opts).unwrap().into_result().unwrap();
        let set = DescriptorSet::new(&opts.fourier, descriptors);

        for name in ["out.json", "out.bin"] {
            let path = dir.path().join(name);
            set.write(&path, false).unwrap();
            assert_eq!(DescriptorSet::read(&path).unwrap(), set);
            assert!(matches!(set.write(&path, false), Err(Error::Overwrite(_))));
            set.write(&path, true).unwrap();
        }

        assert!(matches!(
            set.write(dir.path().join("out.csv"), false),
            Err(Error::InvalidParameter(_))
        ));
    }
}
