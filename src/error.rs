use std::path::PathBuf;

use thiserror::Error;

use crate::fourier::FourierDescriptor;

/// Errors produced by the exhibit builder and the descriptor pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A file or a named variable inside a container does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A container or image could not be parsed.
    #[error("format error in '{path}': {reason}")]
    Format { path: PathBuf, reason: String },

    /// Matrix dimensions do not fit the requested reshape.
    #[error("shape error: {0}")]
    Shape(String),

    /// Mathematically undefined operation on the given input.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Output exists and overwriting was not requested.
    #[error("output file exists (use --overwrite): '{}'", .0.display())]
    Overwrite(PathBuf),

    /// No bounded region was found in a rendered image.
    #[error("no bounded region found in '{0}'")]
    EmptyBoundary(String),

    /// One or more items of a batch failed.
    #[error("{} of {} images failed", failures.len(), failures.len() + descriptors.len())]
    AggregationPartialFailure {
        descriptors: Vec<FourierDescriptor>,
        failures: Vec<(String, Error)>,
    },

    /// A caller supplied setting is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The external renderer failed.
    #[error("renderer failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short stable name of the error kind, used for exit codes and reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Format { .. } => ErrorKind::Format,
            Error::Shape(_) => ErrorKind::Shape,
            Error::DegenerateInput(_) => ErrorKind::DegenerateInput,
            Error::Overwrite(_) => ErrorKind::Overwrite,
            Error::EmptyBoundary(_) => ErrorKind::EmptyBoundary,
            Error::AggregationPartialFailure { .. } => ErrorKind::AggregationPartialFailure,
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::Render(_) => ErrorKind::Render,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Format,
    Shape,
    DegenerateInput,
    Overwrite,
    EmptyBoundary,
    AggregationPartialFailure,
    InvalidParameter,
    Render,
    Io,
}

impl ErrorKind {
    /// Process exit code reported by the command line front end.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::InvalidParameter => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Format => 4,
            ErrorKind::Shape => 5,
            ErrorKind::DegenerateInput => 6,
            ErrorKind::Overwrite => 7,
            ErrorKind::EmptyBoundary => 8,
            ErrorKind::AggregationPartialFailure => 9,
            ErrorKind::Render => 10,
            ErrorKind::Io => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
