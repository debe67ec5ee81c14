//! JSON representation of a line set.

use serde::{Deserialize, Serialize};

use crate::errors::LineSetError;
use crate::geometry::Vector;
use crate::line::Line;
use crate::line_type::{LineType, LineTypeRegistry};
use crate::lineset::LineSet;
use crate::node::Node;

/// A line referencing its nodes by position in [`LineSetData::nodes`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineData {
    /// Index of the lower node.
    pub lower_node: usize,
    /// Index of the upper node.
    pub upper_node: usize,
    /// Name of the line type.
    pub line_type: String,
    /// Line name.
    #[serde(default)]
    pub name: String,
    /// Colour variant.
    #[serde(default = "default_color")]
    pub color: String,
    /// Manufacturing target length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_length: Option<f64>,
    /// Geometric length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_length: Option<f64>,
    /// Manual trim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_correction: Option<f64>,
}

fn default_color() -> String {
    "default".to_owned()
}

/// Flat, node-deduplicated form of a [`LineSet`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSetData {
    /// Every node once.
    pub nodes: Vec<Node>,
    /// Lines referencing `nodes` by index.
    pub lines: Vec<LineData>,
    /// Ambient flow.
    pub v_inf: Vector,
    /// Line types that are not part of the builtin catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_types: Vec<LineType>,
}

impl LineSet {
    /// Flatten into the serializable representation.
    #[must_use]
    pub fn to_data(&self) -> LineSetData {
        let builtin = LineTypeRegistry::builtin();
        let nodes = self
            .node_indices()
            .filter_map(|node| self.node(node).cloned())
            .collect();

        let mut line_types: Vec<LineType> = Vec::new();
        let lines = self
            .lines()
            .map(|line| {
                let stored = line.line();
                let line_type = stored.line_type();
                let known = builtin
                    .get(&line_type.name)
                    .is_some_and(|entry| *entry == **line_type);
                if !known && !line_types.iter().any(|lt| lt.name == line_type.name) {
                    line_types.push((**line_type).clone());
                }
                LineData {
                    lower_node: line.lower_index().index(),
                    upper_node: line.upper_index().index(),
                    line_type: line_type.name.clone(),
                    name: stored.name.clone(),
                    color: stored.color.clone(),
                    target_length: stored.target_length(),
                    init_length: stored.init_length(),
                    trim_correction: stored.trim_correction(),
                }
            })
            .collect();

        LineSetData {
            nodes,
            lines,
            v_inf: self.v_inf(),
            line_types,
        }
    }

    /// Rebuild a line set, resolving line type names against the builtin
    /// catalog extended by `data.line_types`.
    ///
    /// The geometry is not solved; call [`recalc`](Self::recalc) afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::LineType`] for an invalid embedded line type,
    /// [`LineSetError::NodeIndexOutOfRange`] for a dangling node
    /// reference, [`LineSetError::UnknownLineType`] for an unknown line type and
    /// any topology error of [`add_line`](Self::add_line) or [`validate`](Self::validate).
    pub fn from_data(data: LineSetData) -> Result<Self, LineSetError> {
        let mut registry = LineTypeRegistry::builtin().clone();
        for line_type in data.line_types {
            line_type.validate()?;
            registry.insert(line_type);
        }

        let mut lineset = Self::new(data.v_inf);
        let count = data.nodes.len();
        let nodes: Vec<_> = data
            .nodes
            .into_iter()
            .map(|node| lineset.add_node(node))
            .collect();

        for line in data.lines {
            let resolve = |index: usize| {
                nodes
                    .get(index)
                    .copied()
                    .ok_or(LineSetError::NodeIndexOutOfRange { index, count })
            };
            let lower = resolve(line.lower_node)?;
            let upper = resolve(line.upper_node)?;
            let line_type = registry
                .get(&line.line_type)
                .ok_or_else(|| LineSetError::UnknownLineType(line.line_type.clone()))?;

            let mut new_line = Line::new(line_type)
                .with_name(&line.name)
                .with_color(&line.color);
            new_line.set_target_length(line.target_length);
            new_line.set_init_length(line.init_length);
            if let Some(trim_correction) = line.trim_correction {
                new_line = new_line.with_trim_correction(trim_correction);
            }
            lineset.add_line(lower, upper, new_line)?;
        }

        lineset.validate()?;
        Ok(lineset)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Serialization`] when encoding fails.
    pub fn to_json(&self) -> Result<String, LineSetError> {
        Ok(serde_json::to_string_pretty(&self.to_data())?)
    }

    /// Parse JSON written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Serialization`] for malformed JSON and the
    /// errors of [`from_data`](Self::from_data).
    pub fn from_json(json: &str) -> Result<Self, LineSetError> {
        Self::from_data(serde_json::from_str(json)?)
    }
}
