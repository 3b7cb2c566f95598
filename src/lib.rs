pub mod error;
pub mod math;
pub mod matrix;
pub mod transform;
pub mod exhibit;
pub mod graph;
pub mod mask;
pub mod boundary;
pub mod fourier;
pub mod aggregate;
pub mod render;
pub mod config;

pub use error::{Error, ErrorKind, Result};
pub use math::Point;
pub use matrix::{Container, Matrix, concat_rows, load, load_stack};
pub use transform::{NormalizeMode, TransformParams, normalize, transform};
pub use exhibit::{
    Case, CaseNaming, CaseShape, EscapeRadius, Exhibit, PlotBounds, RenderConfiguration,
    SharedParams, build, build_cases
};
pub use graph::{ConnectivityReport, GraphSummary, check_connectivity, summarize};
pub use mask::{MaskOptions, RasterMask, load_mask};
pub use boundary::{BoundaryCurve, extract, largest};
pub use fourier::{FourierDescriptor, FourierSettings, parametrize, parametrize_mask};
pub use aggregate::{
    AggregateOptions, Batch, DescriptorSet, FailureMode, aggregate, collect_inputs,
    describe_image
};
pub use render::{NetbrotRenderer, RenderSettings, RenderedName, Renderer, render_configuration};
pub use config::{ExhibitConfig, PipelineConfig};
