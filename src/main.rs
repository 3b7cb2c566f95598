//! netbrot-exhibits
//!
//! Builds render configurations for the `netbrot` equi-M renderer from
//! connectivity matrices, drives the renderer, and reduces the rendered
//! images to boundary Fourier descriptors.
//!
//! # Commands
//!
//! - `exhibits`: matrix file -> render configuration (or one exhibit per case)
//! - `render`: render configuration -> one image per case
//! - `fourier`: rendered images -> descriptor set (.json or .bin)
//! - `connectivity`: matrix stack -> graph connectivity before and after clipping

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use netbrot_exhibits::{
    AggregateOptions, CaseNaming, CaseShape, DescriptorSet, Error, FailureMode, NetbrotRenderer,
    NormalizeMode, PipelineConfig, RenderConfiguration, Result, aggregate, build, build_cases,
    check_connectivity, collect_inputs, concat_rows, load, load_stack, render_configuration,
    transform,
};

#[derive(Parser)]
#[command(name = "netbrot-exhibits")]
#[command(version)]
#[command(about = "Render configurations and Fourier descriptors for netbrot equi-M sets")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Pipeline settings (JSON); flags override its fields
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a render configuration from a matrix file
    Exhibits(ExhibitsArgs),
    /// Render every case of a configuration with netbrot
    Render(RenderArgs),
    /// Compute Fourier descriptors of rendered images
    Fourier(FourierArgs),
    /// Check whether each matrix of a stack is a connected graph
    Connectivity(ConnectivityArgs),
}

#[derive(Args)]
struct ExhibitsArgs {
    /// Matrix container (.mat or .json)
    file: PathBuf,

    /// Variable holding the matrix; repeat to concatenate several
    #[arg(short = 'n', long = "variable-name", default_value = "w")]
    variables: Vec<String>,

    /// Transpose the stored matrix before building cases
    #[arg(long)]
    transpose: bool,

    /// Take absolute values of all entries
    #[arg(long)]
    abs: bool,

    /// Clamp entries to [MIN, MAX]
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    clip: Option<Vec<f64>>,

    /// Divide by a matrix norm: max, 1, 2, inf, fro or nuc
    #[arg(long, value_name = "MODE")]
    normalize: Option<NormalizeMode>,

    /// Add the row average as an extra case
    #[arg(long)]
    include_average: bool,

    /// How the matrix becomes cases: square, row or matrix
    #[arg(long, value_name = "SHAPE")]
    shape: Option<CaseShape>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    xlim: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    ylim: Option<Vec<f64>>,

    /// Escape radius; caps the estimate with --estimate-escape-radius
    #[arg(long, value_name = "R")]
    escape_radius: Option<f64>,

    /// Estimate the escape radius from each case's singular values
    #[arg(long)]
    estimate_escape_radius: bool,

    /// Output configuration [default: <FILE stem>.json]
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Also write one exhibit document per case into DIR
    #[arg(long, value_name = "DIR")]
    split: Option<PathBuf>,

    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct RenderArgs {
    /// Render configuration written by `exhibits`
    config_file: PathBuf,

    #[arg(long)]
    resolution: Option<u32>,

    #[arg(long)]
    maxit: Option<u32>,

    /// Override the configuration's escape radius
    #[arg(long, value_name = "R")]
    escape_radius: Option<f64>,

    /// Render only the averaged cases
    #[arg(long)]
    average_only: bool,

    /// Replace exhibit documents from an earlier run
    #[arg(long)]
    overwrite: bool,

    /// Renderer executable
    #[arg(long, default_value = "netbrot")]
    program: PathBuf,

    #[arg(long)]
    outdir: Option<PathBuf>,
}

#[derive(Args)]
struct FourierArgs {
    /// Images, directories or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Descriptor set (.json or .bin)
    #[arg(short, long)]
    outfile: PathBuf,

    /// Truncation order K
    #[arg(long)]
    order: Option<usize>,

    /// Arclength samples N (at least 2K + 1)
    #[arg(long)]
    samples: Option<usize>,

    /// Luminance below this is bounded
    #[arg(long)]
    threshold: Option<u8>,

    /// Treat bright pixels as bounded
    #[arg(long)]
    invert: bool,

    /// Process every image and report all failures at the end
    #[arg(long)]
    keep_going: bool,

    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct ConnectivityArgs {
    /// Matrix container (.mat or .json)
    file: PathBuf,

    /// Variable holding the adjacency stack; may be repeated
    #[arg(short = 'n', long = "variable-name", default_value = "w")]
    variables: Vec<String>,

    /// Slice 3-D stacks along the last axis
    #[arg(long)]
    transpose: bool,

    /// Keep weights in [MIN, MAX] for the second check [default: 0 inf]
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    clip: Option<Vec<f64>>,
}

fn pair(values: &Option<Vec<f64>>) -> Option<[f64; 2]> {
    match values.as_deref() {
        Some([a, b]) => Some([*a, *b]),
        _ => None,
    }
}

fn run_exhibits(mut config: PipelineConfig, args: ExhibitsArgs) -> Result<()> {
    let ec = &mut config.exhibit;
    ec.transform.transpose |= args.transpose;
    ec.transform.use_abs |= args.abs;
    if let Some([lo, hi]) = pair(&args.clip) {
        ec.transform.clip = Some((lo, hi));
    }
    if args.normalize.is_some() {
        ec.transform.normalize = args.normalize;
    }
    ec.include_average |= args.include_average;
    if let Some(shape) = args.shape {
        ec.shape = shape;
    }
    if let Some(xlim) = pair(&args.xlim) {
        ec.bounds.xlim = xlim;
    }
    if let Some(ylim) = pair(&args.ylim) {
        ec.bounds.ylim = ylim;
    }
    if let Some(r) = args.escape_radius {
        ec.escape_radius = Some(r);
        ec.estimate_escape_radius = args.estimate_escape_radius;
    } else if args.estimate_escape_radius {
        ec.estimate_escape_radius = true;
    }
    config.validate()?;
    let shared = config.exhibit.shared()?;

    let outfile = args.outfile.unwrap_or_else(|| {
        let stem = args.file.file_stem().unwrap_or(args.file.as_os_str());
        Path::new(stem).with_extension("json")
    });

    let naming = match args.variables.as_slice() {
        [variable] => CaseNaming::new(variable.as_str()),
        _ => CaseNaming::from_path(&outfile),
    };
    let params = &config.exhibit.transform;
    let include_average = config.exhibit.include_average;

    let rc = if shared.shape == CaseShape::Matrix {
        let mut mats = Vec::new();
        for variable in &args.variables {
            let stack = load_stack(&args.file, variable, params.transpose)?;
            info!(
                file = %args.file.display(),
                variable = %variable,
                matrices = stack.len(),
                "loaded matrices"
            );
            for m in &stack {
                mats.push(transform(m, params)?);
            }
        }
        build_cases(mats, &naming, include_average, &shared)?
    } else {
        let mut parts = Vec::with_capacity(args.variables.len());
        for variable in &args.variables {
            let m = load(&args.file, variable, params.transpose)?;
            info!(
                file = %args.file.display(),
                variable = %variable,
                rows = m.nrows(),
                cols = m.ncols(),
                "loaded matrix"
            );
            parts.push(m);
        }
        let m = transform(&concat_rows(&parts)?, params)?;
        build(&m, &naming, include_average, &shared)?
    };
    log_cases(&rc);

    rc.write(&outfile, args.overwrite)?;
    info!(outfile = %outfile.display(), cases = rc.cases.len(), "wrote configuration");

    if let Some(dir) = args.split {
        let written = rc.write_exhibits(&dir, args.overwrite)?;
        info!(dir = %dir.display(), exhibits = written.len(), "wrote exhibits");
    }
    Ok(())
}

fn log_cases(rc: &RenderConfiguration) {
    info!(
        xlim = ?rc.xlim,
        ylim = ?rc.ylim,
        escape_radius = rc.escape_radius,
        "shared parameters"
    );
    for case in &rc.cases {
        let (rows, cols) = case.mat.dim();
        debug!(
            case = %case.name,
            shape = %format!("{}x{}", rows, cols),
            condition = case.condition_number(),
            estimate = case.estimated_escape_radius(),
            "case"
        );
    }
}

fn run_render(mut config: PipelineConfig, args: RenderArgs) -> Result<()> {
    let settings = &mut config.render;
    if let Some(resolution) = args.resolution {
        settings.resolution = resolution;
    }
    if let Some(maxit) = args.maxit {
        settings.maxit = maxit;
    }
    if args.escape_radius.is_some() {
        settings.escape_radius = args.escape_radius;
    }
    settings.average_only |= args.average_only;
    settings.overwrite |= args.overwrite;
    if let Some(outdir) = args.outdir {
        settings.outdir = outdir;
    }

    let renderer = NetbrotRenderer {
        program: args.program,
    };
    let images = render_configuration(&renderer, &args.config_file, &config.render)?;
    for (case, image) in &images {
        println!("{}\t{}", case, image.display());
    }
    Ok(())
}

fn run_fourier(mut config: PipelineConfig, args: FourierArgs) -> Result<()> {
    if let Some(order) = args.order {
        config.fourier.order = order;
    }
    if let Some(samples) = args.samples {
        config.fourier.samples = samples;
    }
    if let Some(threshold) = args.threshold {
        config.mask.threshold = threshold;
    }
    config.mask.invert |= args.invert;
    config.fourier.validate()?;

    let inputs = collect_inputs(&args.inputs)?;
    info!(images = inputs.len(), "collected inputs");

    let options = AggregateOptions {
        fourier: config.fourier,
        mask: config.mask,
        mode: if args.keep_going {
            FailureMode::Collect
        } else {
            FailureMode::FailFast
        },
        parallel: args.parallel,
    };
    let batch = aggregate(&inputs, &options)?;

    if batch.descriptors.is_empty() {
        warn!("no image produced a descriptor");
    } else {
        let set = DescriptorSet::new(&config.fourier, batch.descriptors.clone());
        set.write(&args.outfile, args.overwrite)?;
        info!(outfile = %args.outfile.display(), descriptors = set.len(), "wrote descriptors");
    }

    batch.into_result().map(|_| ())
}

fn run_connectivity(args: ConnectivityArgs) -> Result<()> {
    let clip = pair(&args.clip).map(|[lo, hi]| (lo, hi));
    println!("matrix\tnodes\tedges\tconnected\tclipped edges\tclipped connected");
    for variable in &args.variables {
        let mats = load_stack(&args.file, variable, args.transpose)?;
        for report in check_connectivity(&mats, clip)? {
            info!(
                variable = %variable,
                index = report.index,
                nodes = report.raw.nodes,
                edges = report.raw.edges,
                connected = report.raw.connected,
                clipped_edges = report.clipped.edges,
                clipped_connected = report.clipped.connected,
                "connectivity"
            );
            println!(
                "{}-{}\t{}\t{}\t{}\t{}\t{}",
                variable,
                report.index,
                report.raw.nodes,
                report.raw.edges,
                report.raw.connected,
                report.clipped.edges,
                report.clipped.connected
            );
        }
    }
    Ok(())
}

fn report(err: &Error) {
    error!(kind = ?err.kind(), "{}", err);
    eprintln!("error: {}", err);
    if let Error::AggregationPartialFailure { failures, .. } = err {
        for (case_id, cause) in failures {
            eprintln!("  {}: {}", case_id, cause);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else {
        match cli.verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    };

    let result = config.and_then(|config| match cli.command {
        Commands::Exhibits(args) => run_exhibits(config, args),
        Commands::Render(args) => run_render(config, args),
        Commands::Fourier(args) => run_fourier(config, args),
        Commands::Connectivity(args) => run_connectivity(args),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(err.kind().exit_code())
        }
    }
}
