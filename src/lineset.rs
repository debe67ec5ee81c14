//! The line tree and its relaxation solver.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use tracing::{debug, error, info, warn};

use crate::config::SolverConfig;
use crate::errors::LineSetError;
use crate::geometry::{project_force, Vector};
use crate::length::{KnotCorrections, LineLength};
use crate::line::{Line, LineRef};
use crate::node::{Node, NodeType};
use crate::sag::SagMatrix;

/// Residual forces below this leave a line's direction unchanged.
const RESIDUAL_EPSILON: f64 = 1.0e-10;

/// Weight of the chordwise position against the spanwise position when ordering lines.
pub const X_FACTOR: f64 = 10.0;

/// Source of attachment point positions for the current wing shape.
pub trait WingGeometry {
    /// Position of the attachment point `node`, or `None` to keep its current position.
    fn get_position(&self, node: &Node) -> Option<Vector>;
}

impl<S: BuildHasher> WingGeometry for HashMap<String, Vector, S> {
    fn get_position(&self, node: &Node) -> Option<Vector> {
        self.get(&node.name).copied()
    }
}

/// Convergence diagnostics of a recalculation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecalcReport {
    /// Largest residual force at any knot after each relaxation pass, in newtons.
    pub residuals: Vec<f64>,
}

impl RecalcReport {
    /// Residual after the last pass.
    #[must_use]
    pub fn final_residual(&self) -> Option<f64> {
        self.residuals.last().copied()
    }
}

/// A line together with the lines continuing above it, ordered by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineTree {
    /// The line.
    pub line: EdgeIndex,
    /// Subtrees starting at the line's upper node.
    pub upper: Vec<LineTree>,
}

/// Set of lines forming a forest of trees rooted at lower attachment points.
///
/// Lines point from their lower to their upper node. Every node is fed by at
/// most one line from below, which [`add_line`](Self::add_line) enforces.
#[derive(Clone, Debug, Default)]
pub struct LineSet {
    graph: Graph<Node, Line>,
    v_inf: Vector,
    config: SolverConfig,
    knot_corrections: KnotCorrections,
}

impl LineSet {
    /// Create an empty line set in the flow `v_inf`.
    ///
    /// # Examples
    /// ```
    /// use linesetx::{point, LineSet};
    ///
    /// let lines = LineSet::new(point(10.0, 0.0, 1.0));
    /// assert_eq!(lines.line_count(), 0);
    /// ```
    #[must_use]
    pub fn new(v_inf: Vector) -> Self {
        Self {
            v_inf,
            ..Self::default()
        }
    }

    /// Replace the solver settings.
    #[must_use]
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Solver settings.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Mutable solver settings.
    pub fn config_mut(&mut self) -> &mut SolverConfig {
        &mut self.config
    }

    /// Knot corrections used by [`get_line_length`](Self::get_line_length).
    #[must_use]
    pub fn knot_corrections(&self) -> &KnotCorrections {
        &self.knot_corrections
    }

    /// Replace the knot correction table.
    pub fn set_knot_corrections(&mut self, knot_corrections: KnotCorrections) {
        self.knot_corrections = knot_corrections;
    }

    /// Ambient flow.
    #[must_use]
    pub fn v_inf(&self) -> Vector {
        self.v_inf
    }

    /// Change the ambient flow and broadcast it to every line.
    pub fn set_v_inf(&mut self, v_inf: Vector) {
        self.v_inf = v_inf;
        let rho_air = self.config.rho_air;
        for line in self.graph.edge_weights_mut() {
            line.set_flow(v_inf, rho_air);
        }
        for node in self.graph.node_weights_mut() {
            node.clear_proj_vec();
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add a node.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Connect `lower` to `upper` with `line`.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::UnknownNode`] for a missing node,
    /// [`LineSetError::InvalidEndpoint`] when an attachment point is used as a
    /// lower end or an anchor as an upper end, [`LineSetError::MultipleLowerLines`]
    /// when `upper` is already fed from below and [`LineSetError::Cycle`] when
    /// the line would close a loop.
    ///
    /// # Examples
    /// ```
    /// use linesetx::{force, point, Line, LineSet, LineTypeRegistry, Node};
    ///
    /// let mut lines = LineSet::new(point(0.0, 0.0, 0.0));
    /// let main = lines.add_node(Node::lower("main", point(0.0, 0.0, 0.0)));
    /// let a1 = lines.add_node(Node::upper("A1", point(0.0, 0.0, 5.0), force(0.0, 0.0, 10.0)));
    /// let line_type = LineTypeRegistry::builtin().get("default").expect("builtin");
    /// lines.add_line(main, a1, Line::new(line_type)).expect("valid line");
    /// assert_eq!(lines.line_count(), 1);
    /// ```
    pub fn add_line(
        &mut self,
        lower: NodeIndex,
        upper: NodeIndex,
        line: Line,
    ) -> Result<EdgeIndex, LineSetError> {
        let lower_node = self.node(lower).ok_or(LineSetError::UnknownNode(lower))?;
        let upper_node = self.node(upper).ok_or(LineSetError::UnknownNode(upper))?;

        if lower_node.node_type() == NodeType::Upper {
            return Err(LineSetError::InvalidEndpoint {
                node: lower_node.name.clone(),
                node_type: NodeType::Upper,
                end: "lower",
            });
        }
        if upper_node.node_type() == NodeType::Lower {
            return Err(LineSetError::InvalidEndpoint {
                node: upper_node.name.clone(),
                node_type: NodeType::Lower,
                end: "upper",
            });
        }
        let feeders = self.get_lower_connected_lines(upper).len();
        if feeders > 0 {
            return Err(LineSetError::MultipleLowerLines {
                node: upper_node.name.clone(),
                count: feeders + 1,
            });
        }
        if lower == upper || has_path_connecting(&self.graph, upper, lower, None) {
            return Err(LineSetError::Cycle {
                lower: lower_node.name.clone(),
                upper: upper_node.name.clone(),
            });
        }

        let mut line = line;
        line.set_flow(self.v_inf, self.config.rho_air);
        Ok(self.graph.add_edge(lower, upper, line))
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, node: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(node)
    }

    /// Look up a node for editing.
    pub fn node_mut(&mut self, node: NodeIndex) -> Option<&mut Node> {
        self.graph.node_weight_mut(node)
    }

    /// Look up a line together with its endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::UnknownLine`] when `line` is not part of this set.
    pub fn line(&self, line: EdgeIndex) -> Result<LineRef<'_>, LineSetError> {
        let (lower, upper) = self
            .graph
            .edge_endpoints(line)
            .ok_or(LineSetError::UnknownLine(line))?;
        Ok(LineRef::new(
            line,
            &self.graph[line],
            (lower, &self.graph[lower]),
            (upper, &self.graph[upper]),
        ))
    }

    /// Look up a line for editing its lengths, type or name.
    pub fn line_mut(&mut self, line: EdgeIndex) -> Option<&mut Line> {
        self.graph.edge_weight_mut(line)
    }

    /// All lines in insertion order.
    pub fn lines(&self) -> impl Iterator<Item = LineRef<'_>> + '_ {
        self.graph.edge_references().map(move |edge| {
            LineRef::new(
                edge.id(),
                edge.weight(),
                (edge.source(), &self.graph[edge.source()]),
                (edge.target(), &self.graph[edge.target()]),
            )
        })
    }

    /// Indices of all lines in insertion order.
    pub fn line_indices(&self) -> impl Iterator<Item = EdgeIndex> {
        self.graph.edge_indices()
    }

    /// Indices of all nodes in insertion order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// First line called `name`.
    #[must_use]
    pub fn find_line(&self, name: &str) -> Option<EdgeIndex> {
        self.graph
            .edge_indices()
            .find(|&edge| self.graph[edge].name == name)
    }

    /// First node called `name`.
    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&node| self.graph[node].name == name)
    }

    fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&node| self.graph[node].node_type() == node_type)
            .collect()
    }

    /// Lines hanging from a lower attachment point.
    #[must_use]
    pub fn lowest_lines(&self) -> Vec<EdgeIndex> {
        self.graph
            .edge_references()
            .filter(|edge| self.graph[edge.source()].node_type() == NodeType::Lower)
            .map(|edge| edge.id())
            .collect()
    }

    /// Lines ending at a wing attachment point.
    #[must_use]
    pub fn uppermost_lines(&self) -> Vec<EdgeIndex> {
        self.graph
            .edge_references()
            .filter(|edge| self.graph[edge.target()].node_type() == NodeType::Upper)
            .map(|edge| edge.id())
            .collect()
    }

    /// Wing attachment points.
    #[must_use]
    pub fn attachment_points(&self) -> Vec<NodeIndex> {
        self.nodes_of_type(NodeType::Upper)
    }

    /// Wing attachment points ordered chordwise, then spanwise.
    #[must_use]
    pub fn get_attachment_points_sorted(&self) -> Vec<NodeIndex> {
        let mut nodes = self.attachment_points();
        nodes.sort_by(|&a, &b| {
            self.node_sort_value(a, X_FACTOR)
                .total_cmp(&self.node_sort_value(b, X_FACTOR))
        });
        nodes
    }

    /// Anchors below the tree.
    #[must_use]
    pub fn lower_attachment_points(&self) -> Vec<NodeIndex> {
        self.nodes_of_type(NodeType::Lower)
    }

    /// The harness attachment point: the anchor called `MAIN`, then `0`, then
    /// the first anchor.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NoAttachmentPoints`] when there is no anchor.
    pub fn get_main_attachment_point(&self) -> Result<NodeIndex, LineSetError> {
        let lower = self.lower_attachment_points();
        let named = |target: &str| {
            lower
                .iter()
                .copied()
                .filter(|&node| self.graph[node].name.to_uppercase() == target)
                .last()
        };
        if let Some(node) = named("MAIN").or_else(|| named("0")) {
            return Ok(node);
        }
        error!("no 'main' attachment point");
        lower.first().copied().ok_or(LineSetError::NoAttachmentPoints)
    }

    fn adjacent_lines(&self, node: NodeIndex, direction: Direction) -> Vec<EdgeIndex> {
        let mut lines: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, direction)
            .map(|edge| edge.id())
            .collect();
        lines.sort_unstable();
        lines
    }

    /// Lines leaving `node` upwards, in insertion order.
    #[must_use]
    pub fn get_upper_connected_lines(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        self.adjacent_lines(node, Direction::Outgoing)
    }

    /// Lines arriving at `node` from below.
    #[must_use]
    pub fn get_lower_connected_lines(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        self.adjacent_lines(node, Direction::Incoming)
    }

    /// Lines above and below `node`.
    #[must_use]
    pub fn get_connected_lines(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut lines = self.get_upper_connected_lines(node);
        lines.extend(self.get_lower_connected_lines(node));
        lines
    }

    /// All lines above `node`, breadth first.
    #[must_use]
    pub fn get_upper_lines(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut lines = self.get_upper_connected_lines(node);
        let mut next = 0;
        while next < lines.len() {
            if let Some((_, upper)) = self.graph.edge_endpoints(lines[next]) {
                lines.extend(self.get_upper_connected_lines(upper));
            }
            next += 1;
        }
        lines
    }

    /// Wing attachment points at or above `node`.
    #[must_use]
    pub fn get_upper_influence_nodes(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(weight) = self.graph.node_weight(current) else {
                continue;
            };
            if weight.node_type() == NodeType::Upper {
                result.push(current);
                continue;
            }
            let mut upper: Vec<NodeIndex> = self
                .get_upper_connected_lines(current)
                .into_iter()
                .filter_map(|line| self.graph.edge_endpoints(line).map(|(_, upper)| upper))
                .collect();
            upper.reverse();
            stack.extend(upper);
        }
        result
    }

    /// Lines reachable from `start_lines`, each line before the lines above it.
    fn pre_order(&self, start_lines: &[EdgeIndex]) -> Vec<EdgeIndex> {
        let mut order = Vec::with_capacity(self.graph.edge_count());
        let mut stack: Vec<EdgeIndex> = start_lines.iter().rev().copied().collect();
        while let Some(line) = stack.pop() {
            order.push(line);
            if let Some((_, upper)) = self.graph.edge_endpoints(line) {
                stack.extend(self.get_upper_connected_lines(upper).into_iter().rev());
            }
        }
        order
    }

    /// Check that the lines form a forest of trees rooted at anchors.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: a cycle, a node fed by several lines,
    /// a line starting at an attachment point or ending at an anchor, a knot
    /// without lines above it, or a node that no anchor reaches.
    pub fn validate(&self) -> Result<(), LineSetError> {
        if let Err(cycle) = toposort(&self.graph, None) {
            let node = cycle.node_id();
            let lower = self
                .get_lower_connected_lines(node)
                .first()
                .and_then(|&line| self.graph.edge_endpoints(line))
                .map(|(lower, _)| self.graph[lower].name.clone())
                .unwrap_or_default();
            return Err(LineSetError::Cycle {
                lower,
                upper: self.graph[node].name.clone(),
            });
        }

        for node in self.graph.node_indices() {
            let weight = &self.graph[node];
            let lower_lines = self.get_lower_connected_lines(node).len();
            let upper_lines = self.get_upper_connected_lines(node).len();
            if lower_lines > 1 {
                return Err(LineSetError::MultipleLowerLines {
                    node: weight.name.clone(),
                    count: lower_lines,
                });
            }
            match weight.node_type() {
                NodeType::Lower if lower_lines > 0 => {
                    return Err(LineSetError::InvalidEndpoint {
                        node: weight.name.clone(),
                        node_type: NodeType::Lower,
                        end: "upper",
                    });
                }
                NodeType::Upper if upper_lines > 0 => {
                    return Err(LineSetError::InvalidEndpoint {
                        node: weight.name.clone(),
                        node_type: NodeType::Upper,
                        end: "lower",
                    });
                }
                NodeType::Knot if upper_lines == 0 => {
                    return Err(LineSetError::DanglingKnot(weight.name.clone()));
                }
                NodeType::Lower | NodeType::Upper | NodeType::Knot => {}
            }
        }

        let mut reached = HashSet::new();
        for root in self.lower_attachment_points() {
            let mut dfs = Dfs::new(&self.graph, root);
            while let Some(node) = dfs.next(&self.graph) {
                reached.insert(node);
            }
        }
        if let Some(node) = self
            .graph
            .node_indices()
            .find(|node| !reached.contains(node))
        {
            return Err(LineSetError::Unreachable(self.graph[node].name.clone()));
        }
        Ok(())
    }

    /// Floor of every node: the number of line levels up to the highest
    /// attachment point above it.
    fn node_floors(&self) -> HashMap<NodeIndex, usize> {
        let mut floors: HashMap<NodeIndex, usize> = HashMap::new();
        for line in self.pre_order(&self.lowest_lines()).into_iter().rev() {
            if let Some((lower, upper)) = self.graph.edge_endpoints(line) {
                let floor = floors.get(&upper).copied().unwrap_or(0) + 1;
                let entry = floors.entry(lower).or_insert(0);
                *entry = (*entry).max(floor);
            }
        }
        floors
    }

    /// Number of line levels above every anchor.
    #[must_use]
    pub fn floors(&self) -> HashMap<NodeIndex, usize> {
        let floors = self.node_floors();
        self.lower_attachment_points()
            .into_iter()
            .map(|node| (node, floors.get(&node).copied().unwrap_or(0)))
            .collect()
    }

    /// Lines `target_floor` levels above `node` (default: the main attachment point).
    ///
    /// With `en_style`, branches ending below the requested floor contribute
    /// their uppermost line instead (EN 926-1).
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NoAttachmentPoints`] when no start node is given
    /// and the set has no anchor.
    pub fn get_lines_by_floor(
        &self,
        target_floor: usize,
        node: Option<NodeIndex>,
        en_style: bool,
    ) -> Result<Vec<EdgeIndex>, LineSetError> {
        let start = match node {
            Some(node) => node,
            None => self.get_main_attachment_point()?,
        };
        let mut result = Vec::new();
        let mut stack = vec![(start, 0)];
        while let Some((current, level)) = stack.pop() {
            let lines = self.get_upper_connected_lines(current);
            if lines.is_empty() && en_style {
                result.extend(self.get_lower_connected_lines(current));
            } else if level == target_floor {
                result.extend(lines);
            } else {
                for line in lines.into_iter().rev() {
                    if let Some((_, upper)) = self.graph.edge_endpoints(line) {
                        stack.push((upper, level + 1));
                    }
                }
            }
        }
        Ok(result)
    }

    /// Summed minimum break load of every floor above `node` (default: the
    /// main attachment point).
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NoAttachmentPoints`] when no start node is given
    /// and the set has no anchor.
    pub fn get_floor_strength(&self, node: Option<NodeIndex>) -> Result<Vec<f64>, LineSetError> {
        let node = match node {
            Some(node) => node,
            None => self.get_main_attachment_point()?,
        };
        let floors = self.node_floors().get(&node).copied().unwrap_or(0);
        let mut strength = Vec::with_capacity(floors);
        for floor in 0..floors {
            let mut total = 0.0;
            for line in self.get_lines_by_floor(floor, Some(node), true)? {
                let line_type = self.graph[line].line_type();
                match line_type.min_break_load {
                    Some(load) => total += load,
                    None => warn!(line_type = %line_type.name, "no min_break_load set"),
                }
            }
            strength.push(total);
        }
        Ok(strength)
    }

    /// Recalculate the geometry with the configured number of passes.
    ///
    /// # Errors
    ///
    /// See [`recalc_with`](Self::recalc_with).
    pub fn recalc(&mut self, wing: Option<&dyn WingGeometry>) -> Result<RecalcReport, LineSetError> {
        self.recalc_with(wing, self.config.iterations)
    }

    /// Recalculate the geometry with `iterations` relaxation passes.
    ///
    /// Each pass places the knots, computes the line forces and, when
    /// enabled, solves the sag system.
    ///
    /// # Errors
    ///
    /// Returns the validation error of an ill-formed tree, or the first
    /// non-finite value or singular sag system encountered.
    pub fn recalc_with(
        &mut self,
        wing: Option<&dyn WingGeometry>,
        iterations: usize,
    ) -> Result<RecalcReport, LineSetError> {
        self.validate()?;
        info!(
            lines = self.graph.edge_count(),
            iterations,
            sag = self.config.calculate_sag,
            "recalculating line set"
        );

        for line in self.graph.edge_weights_mut() {
            line.set_force(None);
        }
        if let Some(wing) = wing {
            for node in self.graph.node_weights_mut() {
                if node.node_type() != NodeType::Upper {
                    continue;
                }
                if let Some(position) = wing.get_position(node) {
                    node.set_position(position);
                }
            }
        }
        self.set_v_inf(self.v_inf);

        let mut report = RecalcReport::default();
        for pass in 0..iterations {
            self.calc_geo()?;
            if self.config.calculate_sag {
                self.calc_sag()?;
            } else {
                self.project_nodes();
                let lowest = self.lowest_lines();
                self.calc_forces(&lowest)?;
                for line in self.graph.edge_weights_mut() {
                    line.set_sag_parameters(None);
                }
            }
            let residual = self.max_knot_residual()?;
            debug!(pass, residual, "relaxation pass");
            report.residuals.push(residual);
        }
        Ok(report)
    }

    fn project_nodes(&mut self) {
        let v_inf = self.v_inf;
        for node in self.graph.node_weights_mut() {
            node.calc_proj_vec(&v_inf);
        }
    }

    fn max_knot_residual(&self) -> Result<f64, LineSetError> {
        let mut max: f64 = 0.0;
        for knot in self.nodes_of_type(NodeType::Knot) {
            max = max.max(self.get_residual_force(knot)?.norm());
        }
        Ok(max)
    }

    /// Place every knot at `lower + tangential * init_length`, walking up from
    /// the anchors. Lines without an initial length keep their upper node.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NotANumber`] when a position becomes non-finite.
    pub fn calc_geo(&mut self) -> Result<(), LineSetError> {
        let mut stack: Vec<EdgeIndex> = self.lowest_lines();
        stack.reverse();
        while let Some(edge) = stack.pop() {
            let (upper, position) = {
                let line = self.line(edge)?;
                if line.upper_node().node_type() != NodeType::Knot {
                    continue;
                }
                let Some(init_length) = line.line().init_length() else {
                    continue;
                };
                let lower_point = line.lower_node().position();
                let tangential = self.get_tangential_comp(edge, &lower_point)?;
                let upper_point = lower_point + tangential * init_length;
                if !upper_point.iter().all(|value| value.is_finite()) {
                    return Err(LineSetError::NotANumber {
                        context: format!(
                            "geometry of line {:?}: lower {lower_point:?}, tangential {tangential:?}, length {init_length}",
                            line.name()
                        ),
                    });
                }
                (line.upper_index(), upper_point)
            };
            self.graph[upper].set_position(position);
            stack.extend(self.get_upper_connected_lines(upper).into_iter().rev());
        }
        Ok(())
    }

    /// Direction of `line` for the next geometry pass, seen from `position`.
    ///
    /// With forces from a previous pass, the current direction is nudged
    /// along the residual force at the upper node. Otherwise the unit
    /// directions towards all attachment points above are averaged.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NotANumber`] when the direction degenerates.
    pub fn get_tangential_comp(
        &self,
        line: EdgeIndex,
        position: &Vector,
    ) -> Result<Vector, LineSetError> {
        let line = self.line(line)?;
        if line.has_geo() && line.line().force().is_some() {
            let residual = self.get_residual_force(line.upper_index())?;
            let diff = line.diff_vector()?;
            if residual.norm() < RESIDUAL_EPSILON {
                return Ok(diff);
            }

            let mut stiffness = line.get_correction_influence(&residual)?;
            for connected in self.get_connected_lines(line.upper_index()) {
                stiffness += self.line(connected)?.get_correction_influence(&residual)?;
            }
            let comp = diff + residual / stiffness * self.config.correction_damping;
            let normalized = comp.normalize();
            if !normalized.iter().all(|value| value.is_finite()) {
                return Err(LineSetError::NotANumber {
                    context: format!(
                        "direction of line {:?}: comp {comp:?}, residual {residual:?}, stiffness {stiffness}",
                        line.name()
                    ),
                });
            }
            return Ok(normalized);
        }

        let mut tangent = Vector::zeros();
        for node in self.get_upper_influence_nodes(line.upper_index()) {
            tangent += self.graph[node].calc_force_infl(position);
        }
        let normalized = tangent.normalize();
        if !normalized.iter().all(|value| value.is_finite()) {
            return Err(LineSetError::NotANumber {
                context: format!(
                    "initial direction of line {:?}: tangent {tangent:?}",
                    line.name()
                ),
            });
        }
        Ok(normalized)
    }

    /// Compute the tension of `start_lines` and every line above them.
    ///
    /// Lines ending at an attachment point carry the projection of its force.
    /// Every other line carries the summed force of the lines above, projected
    /// onto its own direction.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::NotANumber`] for non-finite forces.
    pub fn calc_forces(&mut self, start_lines: &[EdgeIndex]) -> Result<(), LineSetError> {
        for edge in self.pre_order(start_lines).into_iter().rev() {
            let force = {
                let line = self.line(edge)?;
                let direction = line.diff_vector()?;
                match line.upper_node().node_type() {
                    NodeType::Upper => {
                        let node_force = line.upper_node().force().unwrap_or_else(Vector::zeros);
                        let tension = match project_force(&node_force, &direction) {
                            Some(force) => force,
                            None => {
                                error!(
                                    line = %line.name(),
                                    line_type = %line.line().line_type(),
                                    ?node_force,
                                    ?direction,
                                    fallback = self.config.fallback_force,
                                    "invalid line force"
                                );
                                self.config.fallback_force
                            }
                        };
                        if !tension.is_finite() {
                            return Err(LineSetError::NotANumber {
                                context: format!(
                                    "force of line {:?}: node force {node_force:?}, direction {direction:?}",
                                    line.name()
                                ),
                            });
                        }
                        tension
                    }
                    NodeType::Knot => {
                        let mut total = Vector::zeros();
                        for upper in self.get_upper_connected_lines(line.upper_index()) {
                            let upper_line = self.line(upper)?;
                            let Some(upper_force) = upper_line.line().force() else {
                                warn!(line = %upper_line.name(), "line force not set");
                                continue;
                            };
                            let line_force = upper_line.diff_vector()? * upper_force;
                            if !line_force.norm().is_finite() {
                                return Err(LineSetError::NotANumber {
                                    context: format!(
                                        "force of line {:?}: {upper_force}",
                                        upper_line.name()
                                    ),
                                });
                            }
                            total += line_force;
                        }
                        let result = total.dot(&direction);
                        if !result.is_finite() {
                            return Err(LineSetError::NotANumber {
                                context: format!(
                                    "force of line {:?}: total {total:?}, direction {direction:?}",
                                    line.name()
                                ),
                            });
                        }
                        result
                    }
                    NodeType::Lower => {
                        return Err(LineSetError::InvalidEndpoint {
                            node: line.upper_node().name.clone(),
                            node_type: NodeType::Lower,
                            end: "upper",
                        });
                    }
                }
            };
            self.graph[edge].set_force(Some(force));
        }
        Ok(())
    }

    /// Project all nodes, compute forces, then build and solve the sag system
    /// and store the parameters on every line.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::SingularSagMatrix`] when the system cannot be
    /// solved, or any error of [`calc_forces`](Self::calc_forces).
    pub fn calc_sag(&mut self) -> Result<SagMatrix, LineSetError> {
        self.project_nodes();
        let start = self.lowest_lines();
        self.calc_forces(&start)?;

        let mut matrix = SagMatrix::new(self.graph.edge_count());
        for edge in self.pre_order(&start) {
            self.calc_matrix_entries(&mut matrix, edge)?;
        }
        matrix.solve()?;

        let mut parameters = Vec::with_capacity(self.graph.edge_count());
        for edge in self.graph.edge_indices() {
            parameters.push((edge, matrix.get_sag_parameters(&self.line(edge)?)?));
        }
        for (edge, parameters) in parameters {
            self.graph[edge].set_sag_parameters(Some(parameters));
        }
        Ok(matrix)
    }

    fn calc_matrix_entries(
        &self,
        matrix: &mut SagMatrix,
        edge: EdgeIndex,
    ) -> Result<(), LineSetError> {
        let line = self.line(edge)?;
        match line.lower_node().node_type() {
            NodeType::Lower => matrix.insert_type_0_lower(&line)?,
            NodeType::Knot => {
                let lower_lines = self.get_lower_connected_lines(line.lower_index());
                let lower_line = lower_lines
                    .first()
                    .ok_or_else(|| LineSetError::Unreachable(line.lower_node().name.clone()))?;
                matrix.insert_type_1_lower(&line, &self.line(*lower_line)?)?;
            }
            NodeType::Upper => {
                return Err(LineSetError::InvalidEndpoint {
                    node: line.lower_node().name.clone(),
                    node_type: NodeType::Upper,
                    end: "lower",
                });
            }
        }
        match line.upper_node().node_type() {
            NodeType::Knot => {
                let upper_lines = self
                    .get_upper_connected_lines(line.upper_index())
                    .into_iter()
                    .map(|upper| self.line(upper))
                    .collect::<Result<Vec<_>, _>>()?;
                matrix.insert_type_1_upper(&line, &upper_lines)?;
            }
            NodeType::Upper => matrix.insert_type_2_upper(&line)?,
            NodeType::Lower => {
                return Err(LineSetError::InvalidEndpoint {
                    node: line.upper_node().name.clone(),
                    node_type: NodeType::Lower,
                    end: "upper",
                });
            }
        }
        Ok(())
    }

    /// Sum of the line forces leaving `node` upwards.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] for a zero-length line.
    pub fn get_upper_connected_force(&self, node: NodeIndex) -> Result<Vector, LineSetError> {
        let mut force = Vector::zeros();
        for edge in self.get_upper_connected_lines(node) {
            let line = self.line(edge)?;
            if let Some(tension) = line.line().force().filter(|&tension| tension != 0.0) {
                force += line.diff_vector()? * tension;
            }
        }
        Ok(force)
    }

    /// Net line force at `node`: lines above minus lines below. Zero at equilibrium.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] for a zero-length line.
    pub fn get_residual_force(&self, node: NodeIndex) -> Result<Vector, LineSetError> {
        let mut residual = Vector::zeros();
        for edge in self.get_upper_connected_lines(node) {
            let line = self.line(edge)?;
            residual += line.diff_vector()? * line.line().force().unwrap_or(0.0);
        }
        for edge in self.get_lower_connected_lines(node) {
            let line = self.line(edge)?;
            residual -= line.diff_vector()? * line.line().force().unwrap_or(0.0);
        }
        Ok(residual)
    }

    /// Adjust every initial length towards its target length, recalculating
    /// after each of `steps` corrections.
    ///
    /// # Errors
    ///
    /// Returns any error of [`recalc`](Self::recalc) or
    /// [`get_line_length`](Self::get_line_length).
    pub fn iterate_target_length(
        &mut self,
        steps: usize,
        pre_load: f64,
    ) -> Result<RecalcReport, LineSetError> {
        let mut report = self.recalc(None)?;
        let with_sag = self.config.calculate_sag;
        for step in 0..steps {
            let mut max_diff: f64 = 0.0;
            for edge in self.graph.edge_indices() {
                let line = &self.graph[edge];
                let (Some(target), Some(init)) = (line.target_length(), line.init_length()) else {
                    continue;
                };
                let diff = self.get_line_length(edge, with_sag, pre_load)?.get_length() - target;
                max_diff = max_diff.max(diff.abs());
                self.graph[edge].set_init_length(Some(init - diff));
            }
            debug!(step, max_diff, "target length correction");
            report = self.recalc(None)?;
        }
        Ok(report)
    }

    /// Production length of `line` under `pre_load` with all corrections.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] when `with_sag` is set before the sag pass.
    pub fn get_line_length(
        &self,
        edge: EdgeIndex,
        with_sag: bool,
        pre_load: f64,
    ) -> Result<LineLength, LineSetError> {
        let line = self.line(edge)?;

        let mut loop_correction = 0.0;
        if self.get_upper_connected_lines(line.upper_index()).is_empty() {
            if let Some(offset) = line.upper_node().offset() {
                loop_correction += offset;
            }
        }

        let mut knot_correction = 0.0;
        if let Some(&lower_edge) = self.get_lower_connected_lines(line.lower_index()).first() {
            let siblings = self.get_upper_connected_lines(line.lower_index());
            let siblings = self.sort_lines(Some(siblings.as_slice()), X_FACTOR, true);
            let position = siblings.iter().position(|&sibling| sibling == edge).unwrap_or(0);
            knot_correction = self.knot_corrections.get(
                &self.graph[lower_edge].line_type().name,
                &line.line().line_type().name,
                siblings.len(),
                position,
            );
        }

        Ok(LineLength {
            length: line.get_stretched_length(pre_load, with_sag)?,
            seam_correction: line.line().line_type().seam_correction,
            loop_correction,
            knot_correction,
            manual_correction: line.line().trim_correction().unwrap_or(0.0),
        })
    }

    /// Length with the configured sag setting and pre-load.
    pub(crate) fn configured_line_length(&self, edge: EdgeIndex) -> Result<LineLength, LineSetError> {
        self.get_line_length(edge, self.config.calculate_sag, self.config.pre_load)
    }

    /// Summed check length from `node` down to its anchor.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::MultipleLowerLines`] when the path branches.
    pub fn get_checklength(&self, node: NodeIndex) -> Result<f64, LineSetError> {
        let mut length = 0.0;
        let mut current = node;
        loop {
            let lines = self.get_lower_connected_lines(current);
            match lines.as_slice() {
                [] => return Ok(length),
                [line] => {
                    length += self.configured_line_length(*line)?.get_checklength();
                    current = self.line(*line)?.lower_index();
                }
                _ => {
                    return Err(LineSetError::MultipleLowerLines {
                        node: self.graph[current].name.clone(),
                        count: lines.len(),
                    });
                }
            }
        }
    }

    /// Check length from each attachment point down to its anchor, in tree order.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_line_length`](Self::get_line_length).
    pub fn get_checklengths(&self) -> Result<Vec<(String, f64)>, LineSetError> {
        let mut lengths = Vec::new();
        for tree in self.create_tree(None) {
            lengths.extend(self.tree_checklengths(&tree)?);
        }
        Ok(lengths)
    }

    fn tree_checklengths(&self, tree: &LineTree) -> Result<Vec<(String, f64)>, LineSetError> {
        let length = self.configured_line_length(tree.line)?.get_checklength();
        if tree.upper.is_empty() {
            let upper = self.line(tree.line)?.upper_node().name.clone();
            return Ok(vec![(upper, length)]);
        }
        let mut lengths = Vec::new();
        for upper in &tree.upper {
            for (name, upper_length) in self.tree_checklengths(upper)? {
                lengths.push((name, upper_length + length));
            }
        }
        Ok(lengths)
    }

    /// Lines above `start_nodes` (default: all anchors) as nested trees in name order.
    #[must_use]
    pub fn create_tree(&self, start_nodes: Option<&[NodeIndex]>) -> Vec<LineTree> {
        let start_nodes = match start_nodes {
            Some(nodes) => nodes.to_vec(),
            None => self.lower_attachment_points(),
        };
        let lines: Vec<EdgeIndex> = start_nodes
            .iter()
            .flat_map(|&node| self.get_upper_connected_lines(node))
            .collect();
        self.sort_lines(Some(lines.as_slice()), X_FACTOR, true)
            .into_iter()
            .map(|line| {
                let upper = self
                    .graph
                    .edge_endpoints(line)
                    .map(|(_, upper)| self.create_tree(Some(std::slice::from_ref(&upper))))
                    .unwrap_or_default();
                LineTree { line, upper }
            })
            .collect()
    }

    fn node_sort_value(&self, node: NodeIndex, x_factor: f64) -> f64 {
        let node = &self.graph[node];
        let chordwise = node.rib_pos().unwrap_or(1000.0 * node.position().x);
        chordwise * x_factor + node.position().y
    }

    /// Order `lines` (default: all lines).
    ///
    /// With `by_names`, lines named like `2_AB3` sort by their letters, then
    /// floor, then number. Otherwise, or when a name does not follow that
    /// scheme, lines sort by the mean position of the attachment points above
    /// them, weighting the chordwise position by `x_factor`.
    #[must_use]
    pub fn sort_lines(
        &self,
        lines: Option<&[EdgeIndex]>,
        x_factor: f64,
        by_names: bool,
    ) -> Vec<EdgeIndex> {
        let mut sorted = match lines {
            Some(lines) => lines.to_vec(),
            None => self.graph.edge_indices().collect(),
        };

        if by_names {
            let keys: Option<HashMap<EdgeIndex, (f64, usize, u64)>> = sorted
                .iter()
                .map(|&line| parse_line_name(&self.graph[line].name).map(|key| (line, key)))
                .collect();
            if let Some(keys) = keys {
                sorted.sort_by(|a, b| {
                    let (a, b) = (keys[a], keys[b]);
                    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2))
                });
                return sorted;
            }
        }

        let keys: HashMap<EdgeIndex, f64> = sorted
            .iter()
            .map(|&line| {
                let nodes = self
                    .graph
                    .edge_endpoints(line)
                    .map(|(_, upper)| self.get_upper_influence_nodes(upper))
                    .unwrap_or_default();
                let total: f64 = nodes
                    .iter()
                    .map(|&node| self.node_sort_value(node, x_factor))
                    .sum();
                (line, total / nodes.len().max(1) as f64)
            })
            .collect();
        sorted.sort_by(|a, b| keys[a].total_cmp(&keys[b]));
        sorted
    }

    /// Name every line `{floor}_{groups}{index}`.
    ///
    /// Floors count from the attachment points (`1_` ends at the wing). The
    /// group is the sorted set of letters of the attachment points above the
    /// line, the index counts within the group in [`sort_lines`](Self::sort_lines) order.
    pub fn rename_lines(&mut self) {
        if self.graph.edge_count() == 0 {
            return;
        }

        let mut groups: HashMap<EdgeIndex, (usize, String)> = HashMap::new();
        for edge in self.pre_order(&self.lowest_lines()).into_iter().rev() {
            let Some((_, upper)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let upper_lines = self.get_upper_connected_lines(upper);
            let group = if upper_lines.is_empty() {
                (0, leaf_prefix(&self.graph[upper].name))
            } else {
                let mut floor = 0;
                let mut letters = BTreeSet::new();
                for upper_line in &upper_lines {
                    if let Some((upper_floor, prefix)) = groups.get(upper_line) {
                        floor = floor.max(upper_floor + 1);
                        letters.extend(prefix.chars());
                    }
                }
                (floor, letters.into_iter().collect())
            };
            groups.insert(edge, group);
        }

        let mut by_floor: BTreeMap<usize, BTreeMap<String, Vec<EdgeIndex>>> = BTreeMap::new();
        for edge in self.graph.edge_indices() {
            if let Some((floor, prefix)) = groups.get(&edge) {
                by_floor
                    .entry(*floor)
                    .or_default()
                    .entry(prefix.clone())
                    .or_default()
                    .push(edge);
            }
        }

        for lines in by_floor.get(&0).into_iter().flat_map(BTreeMap::values) {
            for &edge in lines {
                if let Some((_, upper)) = self.graph.edge_endpoints(edge) {
                    let name = format!("1_{}", self.graph[upper].name);
                    self.graph[edge].name = name;
                }
            }
        }

        for (floor, prefixes) in &by_floor {
            for (prefix, lines) in prefixes {
                let sorted = self.sort_lines(Some(lines.as_slice()), X_FACTOR, true);
                for (i, edge) in sorted.into_iter().enumerate() {
                    self.graph[edge].name = format!("{}_{prefix}{}", floor + 1, i + 1);
                }
            }
        }
    }

    /// Centre of pressure and total drag of all lines.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] before the nodes were projected by a recalculation.
    pub fn get_drag(&self) -> Result<(Vector, f64), LineSetError> {
        let mut total = 0.0;
        let mut center = Vector::zeros();
        for line in self.lines() {
            let drag = line.drag_total()?;
            let sag = line.line().sag_parameters().is_some();
            total += drag;
            center += line.get_line_point(0.5, sag)? * drag;
        }
        if total == 0.0 {
            return Ok((Vector::zeros(), 0.0));
        }
        Ok((center / total, total))
    }

    /// Total drag divided by the dynamic pressure per unit density, `v² / 2`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_drag`](Self::get_drag).
    pub fn get_normalized_drag(&self) -> Result<f64, LineSetError> {
        let speed_squared = self.v_inf.norm_squared();
        if speed_squared == 0.0 {
            return Ok(0.0);
        }
        Ok(self.get_drag()?.1 / speed_squared * 2.0)
    }

    /// Weight of all lines in grams.
    #[must_use]
    pub fn get_weight(&self) -> f64 {
        self.lines().map(|line| line.get_weight()).sum()
    }

    /// Summed stretched length of all lines including manual corrections.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] when sag is enabled but not solved.
    pub fn total_length(&self) -> Result<f64, LineSetError> {
        let mut length = 0.0;
        for line in self.lines() {
            length += line.get_stretched_length(self.config.pre_load, self.config.calculate_sag)?;
            length += line.line().trim_correction().unwrap_or(0.0);
        }
        Ok(length)
    }

    /// Production length per line type.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_line_length`](Self::get_line_length).
    pub fn get_consumption(&self) -> Result<BTreeMap<String, f64>, LineSetError> {
        let mut consumption = BTreeMap::new();
        for edge in self.graph.edge_indices() {
            let length = self.configured_line_length(edge)?.get_length();
            *consumption
                .entry(self.graph[edge].line_type().name.clone())
                .or_insert(0.0) += length;
        }
        Ok(consumption)
    }

    /// Scale the geometry by `factor` and recalculate. Attachment forces scale
    /// with the area, i.e. `factor²`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`recalc`](Self::recalc).
    pub fn scale(&mut self, factor: f64) -> Result<RecalcReport, LineSetError> {
        for node in self.graph.node_weights_mut() {
            node.scale(factor);
        }
        for line in self.graph.edge_weights_mut() {
            line.scale(factor);
        }
        self.recalc(None)
    }
}

/// Sort key of line names like `2_AB3`: mean letter code, floor, number.
fn parse_line_name(name: &str) -> Option<(f64, usize, u64)> {
    let digits = |s: &str| s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();

    let mut rest = name;
    let mut floor = 0;
    let floor_digits = digits(rest);
    if floor_digits > 0 && rest[floor_digits..].starts_with('_') {
        floor = rest[..floor_digits].parse().ok()?;
        rest = &rest[floor_digits + 1..];
    }

    let letters = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
    if letters == 0 {
        return None;
    }
    let (layer, rest) = rest.split_at(letters);
    let index_digits = digits(rest);
    if index_digits == 0 {
        return None;
    }
    let index = rest[..index_digits].parse().ok()?;
    let layer_sum: f64 = layer.to_ascii_lowercase().bytes().map(f64::from).sum();
    Some((layer_sum / letters as f64, floor, index))
}

/// Letters naming the group of an attachment point, e.g. `A` for `A12`.
fn leaf_prefix(name: &str) -> String {
    if name.is_empty() {
        return "--".to_owned();
    }
    name.trim_start_matches(|c: char| !c.is_ascii_alphabetic())
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::{force, point};
    use crate::line_type::LineType;

    fn line_type() -> Arc<LineType> {
        Arc::new(
            LineType::new("test", 1.0, vec![(100.0, 1.0)], Some(500.0), Some(1.0))
                .expect("valid line type"),
        )
    }

    /// Two lines of a cascade meeting in a knot above one main line.
    fn cascade() -> (LineSet, [NodeIndex; 4], [EdgeIndex; 3]) {
        let mut lines = LineSet::new(Vector::zeros());
        let main = lines.add_node(Node::lower("main", Vector::zeros()));
        let knot = lines.add_node(Node::knot("k1"));
        let a1 = lines.add_node(Node::upper("A1", point(-0.5, 0.0, 2.0), force(0.0, 0.0, 50.0)));
        let a2 = lines.add_node(Node::upper("A2", point(0.5, 0.0, 2.0), force(0.0, 0.0, 50.0)));
        let trunk = lines
            .add_line(main, knot, Line::new(line_type()).with_init_length(1.0))
            .expect("valid line");
        let left = lines
            .add_line(knot, a1, Line::new(line_type()))
            .expect("valid line");
        let right = lines
            .add_line(knot, a2, Line::new(line_type()))
            .expect("valid line");
        (lines, [main, knot, a1, a2], [trunk, left, right])
    }

    #[test]
    fn second_feeder_is_rejected() {
        let (mut lines, [main, _, a1, _], _) = cascade();
        let error = lines
            .add_line(main, a1, Line::new(line_type()))
            .expect_err("a1 is already fed");
        assert!(matches!(
            error,
            LineSetError::MultipleLowerLines { count: 2, .. }
        ));
    }

    #[test]
    fn wrong_endpoints_are_rejected() {
        let (mut lines, [main, knot, a1, _], _) = cascade();
        assert!(matches!(
            lines.add_line(a1, knot, Line::new(line_type())),
            Err(LineSetError::InvalidEndpoint { end: "lower", .. })
        ));
        assert!(matches!(
            lines.add_line(knot, main, Line::new(line_type())),
            Err(LineSetError::InvalidEndpoint { end: "upper", .. })
        ));
    }

    #[test]
    fn knot_loop_is_rejected() {
        let mut lines = LineSet::new(Vector::zeros());
        let k1 = lines.add_node(Node::knot("k1"));
        let k2 = lines.add_node(Node::knot("k2"));
        lines
            .add_line(k1, k2, Line::new(line_type()))
            .expect("first line");
        assert!(matches!(
            lines.add_line(k2, k1, Line::new(line_type())),
            Err(LineSetError::Cycle { .. })
        ));
    }

    #[test]
    fn dangling_knot_and_unreachable_nodes_fail_validation() {
        let (mut lines, [main, ..], _) = cascade();
        let orphan = lines.add_node(Node::knot("k2"));
        lines
            .add_line(main, orphan, Line::new(line_type()))
            .expect("valid line");
        assert!(matches!(
            lines.validate(),
            Err(LineSetError::DanglingKnot(name)) if name == "k2"
        ));

        let (mut lines, _, _) = cascade();
        lines.add_node(Node::upper("B1", point(0.0, 1.0, 2.0), force(0.0, 0.0, 1.0)));
        assert!(matches!(
            lines.validate(),
            Err(LineSetError::Unreachable(name)) if name == "B1"
        ));
    }

    #[test]
    fn topology_queries() {
        let (lines, [main, knot, a1, a2], [trunk, left, right]) = cascade();
        assert!(lines.validate().is_ok());
        assert_eq!(lines.lowest_lines(), vec![trunk]);
        assert_eq!(lines.uppermost_lines(), vec![left, right]);
        assert_eq!(lines.get_upper_connected_lines(knot), vec![left, right]);
        assert_eq!(lines.get_lower_connected_lines(knot), vec![trunk]);
        assert_eq!(lines.get_connected_lines(knot), vec![left, right, trunk]);
        assert_eq!(lines.get_upper_lines(main), vec![trunk, left, right]);
        assert_eq!(lines.get_upper_influence_nodes(main), vec![a1, a2]);
        assert_eq!(lines.floors().get(&main), Some(&2));
        assert_eq!(lines.get_main_attachment_point().expect("anchor"), main);
        assert_eq!(lines.find_node("A2"), Some(a2));
    }

    #[test]
    fn lines_by_floor_and_strength() {
        let (lines, [main, ..], [trunk, left, right]) = cascade();
        assert_eq!(
            lines.get_lines_by_floor(0, Some(main), true).expect("anchor"),
            vec![trunk]
        );
        assert_eq!(
            lines.get_lines_by_floor(1, None, true).expect("anchor"),
            vec![left, right]
        );
        assert_eq!(
            lines.get_lines_by_floor(4, None, true).expect("anchor"),
            vec![left, right]
        );
        assert!(lines
            .get_lines_by_floor(4, None, false)
            .expect("anchor")
            .is_empty());
        assert_eq!(
            lines.get_floor_strength(None).expect("anchor"),
            vec![500.0, 1000.0]
        );
    }

    #[test]
    fn first_pass_points_knot_at_attachment_points() {
        let (mut lines, [_, knot, ..], [trunk, ..]) = cascade();
        lines.calc_geo().expect("finite geometry");
        let position = lines.node(knot).expect("knot").position();
        assert_relative_eq!(position.x, 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(position.z, 1.0, epsilon = 1.0e-12);
        assert_eq!(
            lines.line(trunk).expect("trunk").line().force(),
            None
        );
    }

    #[test]
    fn forces_propagate_down_the_tree() {
        let (mut lines, [_, knot, ..], [trunk, left, right]) = cascade();
        lines.calc_geo().expect("finite geometry");
        let lowest = lines.lowest_lines();
        lines.calc_forces(&lowest).expect("finite forces");

        let left_force = lines.line(left).expect("left").line().force().expect("computed");
        let right_force = lines.line(right).expect("right").line().force().expect("computed");
        let trunk_force = lines.line(trunk).expect("trunk").line().force().expect("computed");
        let expected = 50.0 * 1.25_f64.sqrt();
        assert_relative_eq!(left_force, expected, epsilon = 1.0e-9);
        assert_relative_eq!(right_force, expected, epsilon = 1.0e-9);
        assert_relative_eq!(trunk_force, 100.0, epsilon = 1.0e-9);

        let residual = lines.get_residual_force(knot).expect("non-degenerate");
        assert_relative_eq!(residual.norm(), 0.0, epsilon = 1.0e-9);
        assert_relative_eq!(
            lines.get_upper_connected_force(knot).expect("non-degenerate").z,
            100.0,
            epsilon = 1.0e-9
        );
    }

    #[test]
    fn perpendicular_attachment_force_uses_fallback() {
        let mut lines = LineSet::new(Vector::zeros());
        let main = lines.add_node(Node::lower("main", Vector::zeros()));
        let a1 = lines.add_node(Node::upper("A1", point(0.0, 0.0, 1.0), force(10.0, 0.0, 0.0)));
        let line = lines
            .add_line(main, a1, Line::new(line_type()))
            .expect("valid line");
        lines.calc_forces(&[line]).expect("fallback applies");
        assert_eq!(lines.line(line).expect("line").line().force(), Some(10.0));
    }

    #[test]
    fn non_finite_attachment_force_is_rejected() {
        for calculate_sag in [false, true] {
            let mut lines = LineSet::new(point(10.0, 0.0, 0.0));
            lines.config_mut().calculate_sag = calculate_sag;
            let main = lines.add_node(Node::lower("main", Vector::zeros()));
            let a1 = lines.add_node(Node::upper(
                "A1",
                point(0.0, 0.0, 5.0),
                force(0.0, 0.0, f64::NAN),
            ));
            lines
                .add_line(main, a1, Line::new(line_type()).with_name("1_A1"))
                .expect("valid line");
            assert!(
                matches!(
                    lines.recalc(None),
                    Err(LineSetError::NotANumber { context }) if context.contains("1_A1")
                ),
                "sag {calculate_sag}"
            );
        }
    }

    #[test]
    fn non_finite_initial_length_is_rejected() {
        let (mut lines, _, [trunk, ..]) = cascade();
        lines
            .line_mut(trunk)
            .expect("trunk")
            .set_init_length(Some(f64::NAN));
        assert!(matches!(
            lines.calc_geo(),
            Err(LineSetError::NotANumber { context }) if context.starts_with("geometry")
        ));
    }

    #[test]
    fn degenerate_direction_is_rejected() {
        let mut lines = LineSet::new(Vector::zeros());
        let main = lines.add_node(Node::lower("main", Vector::zeros()));
        let knot = lines.add_node(Node::knot("k1"));
        let a1 = lines.add_node(Node::upper("A1", Vector::zeros(), force(0.0, 0.0, 50.0)));
        let trunk = lines
            .add_line(main, knot, Line::new(line_type()).with_init_length(1.0))
            .expect("valid line");
        lines
            .add_line(knot, a1, Line::new(line_type()))
            .expect("valid line");
        assert!(matches!(
            lines.get_tangential_comp(trunk, &Vector::zeros()),
            Err(LineSetError::NotANumber { context }) if context.starts_with("initial direction")
        ));
        assert!(matches!(
            lines.calc_geo(),
            Err(LineSetError::NotANumber { .. })
        ));
    }

    #[test]
    fn equal_nodes_keep_distinct_identities() {
        let mut lines = LineSet::new(Vector::zeros());
        let main = lines.add_node(Node::lower("main", Vector::zeros()));
        let twin = || Node::upper("A1", point(0.0, 0.0, 2.0), force(0.0, 0.0, 50.0));
        let first = lines.add_node(twin());
        let second = lines.add_node(twin());
        assert_ne!(first, second);
        assert_eq!(lines.node(first), lines.node(second));

        let to_first = lines
            .add_line(main, first, Line::new(line_type()))
            .expect("valid line");
        let to_second = lines
            .add_line(main, second, Line::new(line_type()))
            .expect("equal data does not count as a second feeder");
        assert_eq!(lines.get_lower_connected_lines(first), vec![to_first]);
        assert_eq!(lines.get_lower_connected_lines(second), vec![to_second]);

        lines
            .node_mut(second)
            .expect("second node")
            .set_position(point(0.0, 0.0, 3.0));
        assert_eq!(
            lines.node(first).map(Node::position),
            Some(point(0.0, 0.0, 2.0))
        );
    }

    #[test]
    fn rename_groups_by_attachment_letters() {
        let (mut lines, _, [trunk, left, right]) = cascade();
        lines.rename_lines();
        assert_eq!(lines.line(left).expect("left").name(), "1_A1");
        assert_eq!(lines.line(right).expect("right").name(), "1_A2");
        assert_eq!(lines.line(trunk).expect("trunk").name(), "2_A1");
    }

    #[test]
    fn line_names_sort_by_letters_floor_and_number() {
        assert_eq!(parse_line_name("2_AB3"), Some(((97.0 + 98.0) / 2.0, 2, 3)));
        assert_eq!(parse_line_name("B12"), Some((98.0, 0, 12)));
        assert_eq!(parse_line_name("12"), None);
        assert_eq!(parse_line_name("1_A"), None);
        assert_eq!(leaf_prefix("BR3"), "BR");
        assert_eq!(leaf_prefix("12"), "");
        assert_eq!(leaf_prefix(""), "--");
    }

    #[test]
    fn position_order_uses_rib_position() {
        let mut lines = LineSet::new(Vector::zeros());
        let main = lines.add_node(Node::lower("main", Vector::zeros()));
        let b = lines.add_node(
            Node::upper("x", point(0.0, 0.0, 2.0), force(0.0, 0.0, 1.0)).with_rib_pos(0.8),
        );
        let a = lines.add_node(
            Node::upper("y", point(0.0, 0.0, 2.0), force(0.0, 0.0, 1.0)).with_rib_pos(0.1),
        );
        let to_b = lines.add_line(main, b, Line::new(line_type())).expect("valid");
        let to_a = lines.add_line(main, a, Line::new(line_type())).expect("valid");
        assert_eq!(lines.sort_lines(None, X_FACTOR, true), vec![to_a, to_b]);
        assert_eq!(lines.get_attachment_points_sorted(), vec![a, b]);
    }

    #[test]
    fn main_attachment_point_prefers_name() {
        let mut lines = LineSet::new(Vector::zeros());
        assert!(matches!(
            lines.get_main_attachment_point(),
            Err(LineSetError::NoAttachmentPoints)
        ));
        let brake = lines.add_node(Node::lower("brake", Vector::zeros()));
        assert_eq!(lines.get_main_attachment_point().expect("fallback"), brake);
        let main = lines.add_node(Node::lower("Main", Vector::zeros()));
        assert_eq!(lines.get_main_attachment_point().expect("named"), main);
    }

    #[test]
    fn checklength_walks_to_the_anchor() {
        let (mut lines, [_, _, a1, _], _) = cascade();
        lines.config_mut().calculate_sag = false;
        lines.recalc(None).expect("solvable");
        let checklength = lines.get_checklength(a1).expect("single path");
        let checklengths = lines.get_checklengths().expect("lengths");
        assert_eq!(checklengths.len(), 2);
        assert_eq!(checklengths[0].0, "A1");
        assert_relative_eq!(checklengths[0].1, checklength, epsilon = 1.0e-12);
    }

    #[test]
    fn wing_geometry_moves_attachment_points() {
        let (mut lines, [_, _, a1, _], _) = cascade();
        let positions: HashMap<String, Vector> =
            HashMap::from([("A1".to_owned(), point(-0.6, 0.0, 2.0))]);
        let wing: &dyn WingGeometry = &positions;
        lines.recalc(Some(wing)).expect("solvable");
        assert_eq!(lines.node(a1).expect("a1").position(), point(-0.6, 0.0, 2.0));
    }
}
