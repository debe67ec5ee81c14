//! Points of the line tree.

use serde::{Deserialize, Serialize};

use crate::geometry::{normalized_or_zero, project_to_plane, Vector};

/// Role of a node in the line tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Fixed anchor below the tree, e.g. the harness attachment or a brake handle.
    Lower,
    /// Free branching point between lines.
    Knot,
    /// Attachment point on the wing, positioned by the wing geometry.
    Upper,
}

/// A point of the line tree.
///
/// Within a [`LineSet`](crate::LineSet) nodes are identified by their index:
/// two nodes at the same coordinates are distinct.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Name used for reporting and for naming the lines above leaves.
    pub name: String,
    node_type: NodeType,
    position: Vector,
    /// External force acting on an attachment point in newtons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    force: Option<Vector>,
    /// Canopy loop or brake offset added to the length of the line below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<f64>,
    /// Chordwise position of an attachment point, used to order lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rib_pos: Option<f64>,
    #[serde(skip)]
    vec_proj: Option<Vector>,
}

impl Node {
    /// Create a node of the given kind.
    #[must_use]
    pub fn new(name: &str, node_type: NodeType, position: Vector) -> Self {
        Self {
            name: name.to_owned(),
            node_type,
            position,
            force: None,
            offset: None,
            rib_pos: None,
            vec_proj: None,
        }
    }

    /// Create a fixed anchor below the tree.
    #[must_use]
    pub fn lower(name: &str, position: Vector) -> Self {
        Self::new(name, NodeType::Lower, position)
    }

    /// Create a free knot. Its position is computed by the geometry pass.
    #[must_use]
    pub fn knot(name: &str) -> Self {
        Self::new(name, NodeType::Knot, Vector::zeros())
    }

    /// Create a wing attachment point carrying `force`.
    #[must_use]
    pub fn upper(name: &str, position: Vector, force: Vector) -> Self {
        Self {
            force: Some(force),
            ..Self::new(name, NodeType::Upper, position)
        }
    }

    /// Attach a loop or brake offset in metres.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach a chordwise position used for ordering lines.
    #[must_use]
    pub fn with_rib_pos(mut self, rib_pos: f64) -> Self {
        self.rib_pos = Some(rib_pos);
        self
    }

    /// Role of the node in the tree.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vector {
        self.position
    }

    /// Move the node. Invalidates the cached projection.
    pub fn set_position(&mut self, position: Vector) {
        self.position = position;
        self.vec_proj = None;
    }

    /// External force on the node.
    #[must_use]
    pub fn force(&self) -> Option<Vector> {
        self.force
    }

    /// Replace the external force on the node.
    pub fn set_force(&mut self, force: Option<Vector>) {
        self.force = force;
    }

    /// Loop or brake offset in metres.
    #[must_use]
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    /// Chordwise position of an attachment point.
    #[must_use]
    pub fn rib_pos(&self) -> Option<f64> {
        self.rib_pos
    }

    /// Cached projection onto the plane normal to the flow, if current.
    #[must_use]
    pub fn vec_proj(&self) -> Option<Vector> {
        self.vec_proj
    }

    /// Project the position onto the plane normal to `v_inf` and cache the result.
    pub fn calc_proj_vec(&mut self, v_inf: &Vector) -> Vector {
        let projected = project_to_plane(&self.position, v_inf);
        self.vec_proj = Some(projected);
        projected
    }

    /// Drop the cached projection, e.g. after the flow direction changed.
    pub fn clear_proj_vec(&mut self) {
        self.vec_proj = None;
    }

    /// Offset of the node from its projection, i.e. its component along the flow.
    #[must_use]
    pub fn get_diff(&self) -> Option<Vector> {
        self.vec_proj.map(|projected| self.position - projected)
    }

    /// Unit direction from `position` towards this node.
    #[must_use]
    pub fn calc_force_infl(&self, position: &Vector) -> Vector {
        normalized_or_zero(&(self.position - position))
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        self.set_position(self.position * factor);
        if let Some(force) = self.force.as_mut() {
            *force *= factor * factor;
        }
    }
}

/// Compares the stored data, not identity: two distinct nodes of a
/// [`LineSet`](crate::LineSet) with the same fields are equal. Use the
/// [`NodeIndex`](crate::NodeIndex) to tell nodes apart. The cached projection
/// is ignored.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.node_type == other.node_type
            && self.position == other.position
            && self.force == other.force
            && self.offset == other.offset
            && self.rib_pos == other.rib_pos
    }
}
