use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::array;
use tempfile::TempDir;

use netbrot_exhibits::{
    AggregateOptions, CaseNaming, CaseShape, DescriptorSet, Error, EscapeRadius, Exhibit,
    FailureMode, FourierSettings, MaskOptions, PlotBounds, RasterMask, RenderConfiguration,
    NormalizeMode, RenderSettings, Renderer, Result, SharedParams, TransformParams, aggregate,
    build, build_cases, check_connectivity, collect_inputs, concat_rows, load, load_mask,
    load_stack, parametrize_mask, render_configuration, transform,
};

// Minimal little-endian MAT level 5 writer: one uncompressed double array
// per variable.
fn mat_file(vars: &[(&str, &[i32], &[f64])]) -> Vec<u8> {
    fn pad(buf: &mut Vec<u8>) {
        while buf.len() % 8 != 0 {
            buf.push(0);
        }
    }
    fn element(ty: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ty.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        pad(&mut out);
        out
    }

    let mut text = b"MATLAB 5.0 MAT-file, written by the netbrot-exhibits tests".to_vec();
    text.resize(116, b' ');
    let mut out = text;
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&[0x00, 0x01, b'I', b'M']);

    for (name, dims, data) in vars {
        let mut body = Vec::new();
        // mxDOUBLE_CLASS, no flags
        let flags: Vec<u8> = [6u32, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
        body.extend(element(6, &flags));
        let dims: Vec<u8> = dims.iter().flat_map(|d| d.to_le_bytes()).collect();
        body.extend(element(5, &dims));
        body.extend(element(1, name.as_bytes()));
        let real: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        body.extend(element(9, &real));

        out.extend_from_slice(&14u32.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
    }
    out
}

fn disk(size: usize, cx: f64, cy: f64, r: f64) -> RasterMask {
    RasterMask::from_fn(size, size, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        dx * dx + dy * dy <= r * r
    })
}

fn write_json(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn mat_variables_load_column_major() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.mat");
    let bytes = mat_file(&[
        ("w", &[2, 3], &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]),
        ("stack", &[2, 2, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
    ]);
    fs::write(&path, bytes).unwrap();

    let w = load(&path, "w", false).unwrap();
    assert_eq!(w, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

    // stack(:, :, 1) read row by row
    let s = load(&path, "stack", true).unwrap();
    assert_eq!(s.dim(), (2, 4));
    assert_eq!(s.row(0).to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
    assert_eq!(s.row(1).to_vec(), vec![5.0, 7.0, 6.0, 8.0]);

    assert!(matches!(load(&path, "missing", false), Err(Error::NotFound(_))));
}

#[test]
fn three_by_three_rows_with_average() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(
        &dir,
        "conn.json",
        r#"{"w": [[1, 0, 0], [0, 2, 0], [0, 0, 3]]}"#,
    );
    let m = load(&path, "w", false).unwrap();
    let naming = CaseNaming::new("w");

    let shared = SharedParams {
        shape: CaseShape::Row,
        ..Default::default()
    };
    let rc = build(&m, &naming, true, &shared).unwrap();
    let names: Vec<&str> = rc.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["w-0", "w-1", "w-2", "w-avg"]);
    for case in &rc.cases {
        assert_eq!(case.mat.dim(), (1, 3));
    }
    assert_eq!(rc.cases[3].mat, array![[1.0 / 3.0, 2.0 / 3.0, 1.0]]);
    assert_eq!(rc.average_cases().count(), 1);

    // a single row of a 1 x 3 matrix has sigma = |row|; the smallest row
    // norm (1) gives the largest estimate 2 / 1
    assert!((rc.escape_radius - 2.0).abs() < 1e-9);

    let square = SharedParams::default();
    assert!(matches!(build(&m, &naming, true, &square), Err(Error::Shape(_))));
}

#[test]
fn three_by_nine_rows_become_square_cases() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(
        &dir,
        "conn.json",
        r#"{"w": [
            [2, 0, 0, 0, 2, 0, 0, 0, 2],
            [4, 0, 0, 0, 4, 0, 0, 0, 4],
            [1, 1, 0, 0, 1, 0, 0, 0, 1]
        ]}"#,
    );
    let m = load(&path, "w", false).unwrap();
    let shared = SharedParams {
        escape_radius: EscapeRadius::Estimated { max: 10.0 },
        ..Default::default()
    };
    let rc = build(&m, &CaseNaming::new("conn"), true, &shared).unwrap();

    assert_eq!(rc.cases.len(), 4);
    for case in &rc.cases {
        assert_eq!(case.mat.dim(), (3, 3));
    }
    assert_eq!(rc.cases[1].mat, array![[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);
    assert!(rc.escape_radius > 0.0 && rc.escape_radius <= 10.0);
}

#[test]
fn stack_is_normalized_per_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "stack.json", r#"{"w": [[[2, 0], [0, 2]], [[4, 0], [0, 4]]]}"#);
    let params = TransformParams {
        normalize: Some(NormalizeMode::Two),
        ..Default::default()
    };
    let shared = SharedParams {
        shape: CaseShape::Matrix,
        normalize: params.normalize,
        ..Default::default()
    };

    let mats = load_stack(&path, "w", false)
        .unwrap()
        .iter()
        .map(|m| transform(m, &params).unwrap())
        .collect();
    let rc = build_cases(mats, &CaseNaming::new("w"), true, &shared).unwrap();
    assert_eq!(rc.cases.len(), 3);
    for case in &rc.cases {
        assert!((NormalizeMode::Two.norm(&case.mat) - 1.0).abs() < 1e-12);
    }
    assert!((rc.escape_radius - 2.0 * 2f64.sqrt()).abs() < 1e-9);

    // the flattened rows reshape back to the same normalized cases
    let m = transform(&load(&path, "w", false).unwrap(), &params).unwrap();
    let square = SharedParams {
        shape: CaseShape::Square,
        ..shared
    };
    let flat = build(&m, &CaseNaming::new("w"), true, &square).unwrap();
    assert_eq!(flat, rc);
}

#[test]
fn repeated_variables_are_concatenated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(
        &dir,
        "conn.json",
        r#"{
            "a": [[1, 0, 0, 1]],
            "b": [[2, 0, 0, 2], [3, 0, 0, 3]],
            "w": [[1, 0, 0, 0], [0, 2, 0, 0], [0, 0, 3, 0], [0, 0, 0, 4]]
        }"#,
    );
    let shared = SharedParams {
        escape_radius: EscapeRadius::Fixed(2.0),
        ..Default::default()
    };

    let parts: Vec<_> = ["a", "b"].iter().map(|v| load(&path, v, false).unwrap()).collect();
    let m = concat_rows(&parts).unwrap();
    let rc = build(&m, &CaseNaming::new("conn"), false, &shared).unwrap();
    let names: Vec<&str> = rc.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["conn-0", "conn-1", "conn-2"]);
    assert_eq!(rc.cases[2].mat, array![[3.0, 0.0], [0.0, 3.0]]);

    // a 2-D variable is one whole case
    let whole = SharedParams {
        shape: CaseShape::Matrix,
        ..shared
    };
    let mats = load_stack(&path, "w", false).unwrap();
    let rc = build_cases(mats, &CaseNaming::new("w"), false, &whole).unwrap();
    assert_eq!(rc.cases.len(), 1);
    assert_eq!(rc.cases[0].mat.dim(), (4, 4));
}

#[test]
fn clipping_can_disconnect_a_subnetwork() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("net.mat");
    // two 3x3 slices along the last axis, column-major: a ring with every
    // link excitatory, and a chain whose second link is inhibitory
    let ring = [0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0];
    let chain = [0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, -1.0, 0.0];
    let data: Vec<f64> = ring.iter().chain(chain.iter()).copied().collect();
    fs::write(&path, mat_file(&[("w", &[3, 3, 2], &data)])).unwrap();

    let mats = load_stack(&path, "w", true).unwrap();
    let reports = check_connectivity(&mats, None).unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].raw.connected && reports[0].clipped.connected);
    assert_eq!(reports[0].clipped.edges, 3);
    assert!(reports[1].raw.connected);
    assert!(!reports[1].clipped.connected);
    assert_eq!(reports[1].clipped.edges, 1);
}

#[test]
fn building_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(
        &dir,
        "conn.json",
        r#"{"w": [[0.5, -1.5, 2.0, 1.0], [3.0, 0.25, -0.75, 1.0]]}"#,
    );
    let params = TransformParams {
        use_abs: true,
        clip: Some((0.5, 2.5)),
        normalize: Some(netbrot_exhibits::NormalizeMode::Fro),
        ..Default::default()
    };
    let shared = SharedParams {
        bounds: PlotBounds {
            xlim: [-4.0, 4.0],
            ylim: [-3.0, 3.0],
        },
        escape_radius: EscapeRadius::Fixed(5.0),
        shape: CaseShape::Square,
        normalize: params.normalize,
    };

    let run = |out: &Path| {
        let m = load(&path, "w", false).unwrap();
        let m = transform(&m, &params).unwrap();
        let rc = build(&m, &CaseNaming::from_path(out), true, &shared).unwrap();
        rc.write(out, false).unwrap();
        rc
    };
    let a = dir.path().join("a").join("conn.json");
    let b = dir.path().join("b").join("conn.json");
    let rc_a = run(&a);
    let rc_b = run(&b);

    assert_eq!(rc_a, rc_b);
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    assert_eq!(RenderConfiguration::read(&a).unwrap(), rc_a);
    assert_eq!(rc_a.escape_radius, 5.0);
}

#[test]
fn outputs_are_not_overwritten_silently() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedParams {
        escape_radius: EscapeRadius::Fixed(2.0),
        ..Default::default()
    };
    let rc = build(&array![[1.0, 0.0, 0.0, 1.0]], &CaseNaming::new("one"), false, &shared)
        .unwrap();

    let out = dir.path().join("one.json");
    rc.write(&out, false).unwrap();
    assert!(matches!(rc.write(&out, false), Err(Error::Overwrite(p)) if p == out));
    rc.write(&out, true).unwrap();

    let split = dir.path().join("split");
    let written = rc.write_exhibits(&split, false).unwrap();
    assert_eq!(written, vec![split.join("one-0.json")]);
    assert!(matches!(rc.write_exhibits(&split, false), Err(Error::Overwrite(_))));

    let set = DescriptorSet::new(&FourierSettings::default(), BTreeMap::new());
    let bin = dir.path().join("descriptors.bin");
    set.write(&bin, false).unwrap();
    assert!(matches!(set.write(&bin, false), Err(Error::Overwrite(_))));
}

#[test]
fn disk_area_and_centroid() {
    let r = 40.0;
    let mask = disk(128, 63.5, 60.0, r);
    let d = parametrize_mask("disk", &mask, &FourierSettings::default()).unwrap();

    let expected = PI * r * r;
    assert!((d.area - expected).abs() / expected < 0.03, "area {}", d.area);
    assert!((d.perimeter - 2.0 * PI * r).abs() / (2.0 * PI * r) < 0.1);
    assert!((d.centroid[0] - 63.5).abs() < 1.0);
    assert!((d.centroid[1] - 60.0).abs() < 1.0);

    // the first harmonic carries the radius
    let first = d.coefficient(1).unwrap().norm() + d.coefficient(-1).unwrap().norm();
    assert!((first - r).abs() < 1.0, "first harmonic {}", first);
}

#[test]
fn blank_image_has_no_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.png");
    RasterMask::new(32, 32).to_image().save(&path).unwrap();

    let mask = load_mask(&path, MaskOptions::default()).unwrap();
    let err = parametrize_mask("blank", &mask, &FourierSettings::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyBoundary(_)));
}

fn batch_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        let path = dir.path().join(format!("img-{}.png", i));
        if i == 3 {
            fs::write(&path, b"\x89PNG but not really").unwrap();
        } else {
            disk(48, 24.0, 24.0, 8.0 + i as f64).to_image().save(&path).unwrap();
        }
    }
    dir
}

#[test]
fn corrupt_image_is_collected() {
    let dir = batch_dir();
    let inputs = collect_inputs(&[dir.path().to_string_lossy()]).unwrap();
    assert_eq!(inputs.len(), 5);

    let options = AggregateOptions {
        fourier: FourierSettings {
            order: 8,
            samples: 128,
        },
        mode: FailureMode::Collect,
        ..Default::default()
    };
    let batch = aggregate(&inputs, &options).unwrap();
    assert_eq!(batch.descriptors.len(), 4);
    assert_eq!(batch.failures.len(), 1);
    let (case_id, err) = &batch.failures[0];
    assert_eq!(case_id, "img-3");
    assert!(matches!(err, Error::Format { .. }));

    // larger disks have larger areas
    let areas: Vec<f64> = batch.descriptors.values().map(|d| d.area).collect();
    assert!(areas.windows(2).all(|w| w[0] < w[1]));

    match batch.into_result() {
        Err(Error::AggregationPartialFailure { descriptors, failures }) => {
            assert_eq!(descriptors.len(), 4);
            assert_eq!(failures.len(), 1);
        }
        other => panic!("expected a partial failure, got {:?}", other.map(|m| m.len())),
    }
}

#[test]
fn fail_fast_stops_on_the_corrupt_image() {
    let dir = batch_dir();
    let inputs = collect_inputs(&[dir.path().to_string_lossy()]).unwrap();

    for parallel in [false, true] {
        let options = AggregateOptions {
            parallel,
            ..Default::default()
        };
        let err = aggregate(&inputs, &options).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }
}

/// Paints a disk whose radius grows with the escape radius instead of
/// running netbrot.
struct DiskRenderer;

impl Renderer for DiskRenderer {
    fn render(&self, exhibit: &Path, outfile: &Path, settings: &RenderSettings) -> Result<PathBuf> {
        let text = fs::read_to_string(exhibit)?;
        let exhibit: Exhibit = serde_json::from_str(&text).unwrap();
        let size = settings.resolution as usize;
        let c = size as f64 / 2.0;
        let r = (exhibit.escape_radius * 4.0).min(c - 2.0);
        disk(size, c, c, r).to_image().save(outfile).unwrap();
        Ok(outfile.to_path_buf())
    }
}

#[test]
fn render_then_describe() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedParams {
        escape_radius: EscapeRadius::Fixed(6.0),
        ..Default::default()
    };
    let rc = build(
        &array![[1.0, 0.0, 0.0, 1.0], [2.0, 1.0, 0.0, 2.0]],
        &CaseNaming::new("conn"),
        true,
        &shared,
    )
    .unwrap();
    let config_path = dir.path().join("conn.json");
    rc.write(&config_path, false).unwrap();

    let settings = RenderSettings {
        resolution: 64,
        outdir: dir.path().join("renders"),
        ..Default::default()
    };
    let images = render_configuration(&DiskRenderer, &config_path, &settings).unwrap();
    let cases: Vec<&str> = images.keys().map(|k| k.as_str()).collect();
    assert_eq!(cases, ["conn-0", "conn-1", "conn-avg"]);
    assert!(settings.outdir.join("conn-avg.json").exists());

    // rendered names map back to their cases
    let found = collect_inputs(&[format!("{}/*.png", settings.outdir.display())]).unwrap();
    assert_eq!(found, images);

    let batch = aggregate(&images, &AggregateOptions::default()).unwrap();
    assert!(batch.is_complete());
    let set = DescriptorSet::new(&FourierSettings::default(), batch.descriptors);
    let out = dir.path().join("descriptors.json");
    set.write(&out, false).unwrap();
    let back = DescriptorSet::read(&out).unwrap();
    assert_eq!(back.len(), 3);
    for d in back.descriptors.values() {
        assert!((d.area - PI * 24.0 * 24.0).abs() / (PI * 24.0 * 24.0) < 0.05);
    }

    let averages = RenderSettings {
        average_only: true,
        overwrite: true,
        ..settings
    };
    let only = render_configuration(&DiskRenderer, &config_path, &averages).unwrap();
    assert_eq!(only.keys().collect::<Vec<_>>(), ["conn-avg"]);
}
