//! Error types produced while editing or solving line sets.

use petgraph::graph::{EdgeIndex, NodeIndex};
use thiserror::Error;

use crate::node::NodeType;

/// Error returned when a derived quantity of a single line is queried before the
/// data it depends on has been computed.
///
/// These indicate an ordering bug in the caller (geometry, then forces, then sag)
/// and are never recovered from inside the solver.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LineError {
    /// Returned when the line tension has not been computed yet.
    #[error("line {line:?} has no computed force")]
    MissingForce {
        /// Name of the offending line.
        line: String,
    },
    /// Returned when the sag parameters have not been solved yet.
    #[error("line {line:?} has no sag parameters; run the sag pass first")]
    MissingSag {
        /// Name of the offending line.
        line: String,
    },
    /// Returned when a node projection is stale or was never computed.
    #[error("line {line:?} has no projected node positions; project the nodes first")]
    MissingProjection {
        /// Name of the offending line.
        line: String,
    },
    /// Returned when both endpoints of a line coincide.
    #[error("line {line:?} has zero length")]
    ZeroLength {
        /// Name of the offending line.
        line: String,
    },
    /// Returned when a correction is requested for a knot that is already in equilibrium.
    #[error("line {line:?} has no residual force to correct")]
    ZeroResidual {
        /// Name of the offending line.
        line: String,
    },
}

/// Error returned when a catalog entry describes a physically meaningless line.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LineTypeError {
    /// Returned when a stretch curve has no points.
    #[error("stretch curve of line type {name:?} is empty")]
    EmptyStretchCurve {
        /// Name of the line type.
        name: String,
    },
    /// Returned when the diameter is zero or negative.
    #[error("line type {name:?} must have a positive diameter (received {diameter} mm)")]
    NonPositiveDiameter {
        /// Name of the line type.
        name: String,
        /// Rejected diameter in millimetres.
        diameter: f64,
    },
}

/// Error returned when editing, validating or solving a [`LineSet`](crate::LineSet).
#[derive(Debug, Error)]
pub enum LineSetError {
    /// Returned when a node cannot be found in the line set.
    #[error("node {0:?} does not exist in this line set")]
    UnknownNode(NodeIndex),
    /// Returned when a line cannot be found in the line set.
    #[error("line {0:?} does not exist in this line set")]
    UnknownLine(EdgeIndex),
    /// Returned when a node would be fed by more than one line from below.
    #[error("node {node:?} has {count} lines connected from below, expected at most one")]
    MultipleLowerLines {
        /// Name of the offending node.
        node: String,
        /// Number of lines feeding the node from below.
        count: usize,
    },
    /// Returned when a new line would close a cycle.
    #[error("line from {lower:?} to {upper:?} would close a cycle")]
    Cycle {
        /// Name of the requested lower node.
        lower: String,
        /// Name of the requested upper node.
        upper: String,
    },
    /// Returned when a node of the wrong kind is used as a line endpoint.
    #[error("{node_type:?} node {node:?} cannot be the {end} end of a line")]
    InvalidEndpoint {
        /// Name of the offending node.
        node: String,
        /// Kind of the offending node.
        node_type: NodeType,
        /// Which end of the line was requested.
        end: &'static str,
    },
    /// Returned when a knot carries no line above it.
    #[error("knot {0:?} has no lines connected above it")]
    DanglingKnot(String),
    /// Returned when a node cannot be reached from any lower attachment point.
    #[error("node {0:?} is not reachable from any lower attachment point")]
    Unreachable(String),
    /// Returned when a query needs a lower attachment point and there is none.
    #[error("no lower attachment points available")]
    NoAttachmentPoints,
    /// Returned when vector arithmetic produced a non-finite value.
    #[error("non-finite value in {context}")]
    NotANumber {
        /// Description of the inputs that produced the value.
        context: String,
    },
    /// Returned when a line query fails.
    #[error(transparent)]
    Line(#[from] LineError),
    /// Returned when the sag system cannot be solved.
    #[error("sag matrix is singular; check the line topology")]
    SingularSagMatrix,
    /// Returned when a line type supplied with serialized data is invalid.
    #[error(transparent)]
    LineType(#[from] LineTypeError),
    /// Returned when a line type name is not in the registry.
    #[error("unknown line type {0:?}")]
    UnknownLineType(String),
    /// Returned when serialized data references a missing node.
    #[error("node index {index} is out of range ({count} nodes)")]
    NodeIndexOutOfRange {
        /// Referenced index.
        index: usize,
        /// Number of serialized nodes.
        count: usize,
    },
    /// Returned when JSON input or output fails.
    #[error("failed to (de)serialize line set: {0}")]
    Serialization(#[from] serde_json::Error),
}
