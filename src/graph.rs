//! Connectivity of the graphs behind square coefficient matrices.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::transform::{TransformParams, transform};

/// Undirected view of a square matrix: node `i` links to node `j` when
/// either `a[i, j]` or `a[j, i]` is non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    /// Unordered pairs, self-loops included.
    pub edges: usize,
    pub connected: bool,
}

/// Summaries of one matrix before and after clipping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub index: usize,
    pub raw: GraphSummary,
    pub clipped: GraphSummary,
}

/// Clip range used when none is given: drops negative weights.
pub const DEFAULT_CLIP: (f64, f64) = (0.0, f64::INFINITY);

pub fn summarize(m: &Matrix) -> Result<GraphSummary> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(Error::Shape(format!(
            "adjacency matrix must be square, got {}x{}",
            rows, cols
        )));
    }
    if rows == 0 {
        return Err(Error::DegenerateInput("graph has no nodes".to_string()));
    }

    let linked = |i: usize, j: usize| m[[i, j]] != 0.0 || m[[j, i]] != 0.0;

    let mut edges = 0;
    for i in 0..rows {
        for j in i..rows {
            if linked(i, j) {
                edges += 1;
            }
        }
    }

    let mut visited = vec![false; rows];
    let mut frontier = VecDeque::with_capacity(rows);
    visited[0] = true;
    frontier.push_back(0);
    let mut reached = 1;
    while let Some(node) = frontier.pop_front() {
        for next in 0..rows {
            if !visited[next] && linked(node, next) {
                visited[next] = true;
                reached += 1;
                frontier.push_back(next);
            }
        }
    }

    Ok(GraphSummary {
        nodes: rows,
        edges,
        connected: reached == rows,
    })
}

/// Summarize every matrix as loaded and after clipping to `clip`
/// (or [`DEFAULT_CLIP`]).
pub fn check_connectivity(
    mats: &[Matrix],
    clip: Option<(f64, f64)>,
) -> Result<Vec<ConnectivityReport>> {
    let params = TransformParams {
        clip: Some(clip.unwrap_or(DEFAULT_CLIP)),
        ..Default::default()
    };
    mats.iter()
        .enumerate()
        .map(|(index, m)| {
            let raw = summarize(m)?;
            let clipped = summarize(&transform(m, &params)?)?;
            Ok(ConnectivityReport {
                index,
                raw,
                clipped,
            })
        })
        .collect()
}
