#![warn(clippy::all)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod data;
pub mod errors;
pub mod geometry;
pub mod length;
pub mod line;
pub mod line_type;
pub mod lineset;
pub mod node;
pub mod sag;
pub mod table;

pub use config::SolverConfig;
pub use data::{LineData, LineSetData};
pub use errors::{LineError, LineSetError, LineTypeError};
pub use geometry::{force, point, project_force, Vector};
pub use length::{KnotCorrection, KnotCorrections, LineLength};
pub use line::{Line, LineRef};
pub use line_type::{LineType, LineTypeRegistry, StretchCurve, DEFAULT_LINE_TYPE};
pub use lineset::{LineSet, LineTree, RecalcReport, WingGeometry};
pub use node::{Node, NodeType};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use sag::SagMatrix;
pub use table::Table;
