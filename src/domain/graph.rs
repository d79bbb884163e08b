use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge mark of the lagged graph array, in the usual `-->` / `<--` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeMark {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "-->")]
    Forward,
    #[serde(rename = "<--")]
    Backward,
}

impl fmt::Display for EdgeMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeMark::None => write!(f, ""),
            EdgeMark::Forward => write!(f, "-->"),
            EdgeMark::Backward => write!(f, "<--"),
        }
    }
}

/// Dense `N x N x (tau_max + 1)` array of edge marks. `get(i, j, tau)` is the
/// mark on the edge from `X^i_{t-tau}` to `X^j_t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagGraph {
    marks: Array3<EdgeMark>,
}

/// A directed ground-truth edge `source(t - lag) --> target(t)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub lag: usize,
}

impl LagGraph {
    pub fn new(n_vars: usize, tau_max: usize) -> Self {
        Self {
            marks: Array3::from_elem((n_vars, n_vars, tau_max + 1), EdgeMark::None),
        }
    }

    pub fn n_vars(&self) -> usize {
        self.marks.dim().0
    }

    pub fn tau_max(&self) -> usize {
        self.marks.dim().2 - 1
    }

    /// `None` when an index is out of bounds.
    pub fn get(&self, i: usize, j: usize, tau: usize) -> Option<EdgeMark> {
        self.marks.get((i, j, tau)).copied()
    }

    /// Returns `false` and leaves the graph untouched when an index is out of bounds.
    pub fn set(&mut self, i: usize, j: usize, tau: usize, mark: EdgeMark) -> bool {
        match self.marks.get_mut((i, j, tau)) {
            Some(slot) => {
                *slot = mark;
                true
            }
            None => false,
        }
    }

    /// All `-->` edges, ordered by source, target, then lag.
    pub fn edges(&self) -> Vec<Edge> {
        self.marks
            .indexed_iter()
            .filter(|(_, mark)| **mark == EdgeMark::Forward)
            .map(|((source, target, lag), _)| Edge {
                source,
                target,
                lag,
            })
            .collect()
    }
}
