//! Lines between two nodes and their derived geometric and physical quantities.

use std::sync::Arc;

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::error;

use crate::errors::LineError;
use crate::geometry::{normalized_or_zero, Vector};
use crate::line_type::LineType;
use crate::node::Node;

/// Quadratic sag coefficients below this are integrated as a straight line.
const SAG_EPSILON: f64 = 1.0e-10;

/// Default density of air in kg/m³.
pub const RHO_AIR: f64 = 1.2;

/// Stored state of a line.
///
/// Derived quantities need both endpoints and are available through
/// [`LineRef`], obtained from [`LineSet::line`](crate::LineSet::line).
#[derive(Clone, Debug)]
pub struct Line {
    /// Manufacturing label.
    pub name: String,
    /// Colour variant of the line type.
    pub color: String,
    line_type: Arc<LineType>,
    target_length: Option<f64>,
    init_length: Option<f64>,
    trim_correction: Option<f64>,
    v_inf: Vector,
    rho_air: f64,
    force: Option<f64>,
    sag_par_1: Option<f64>,
    sag_par_2: Option<f64>,
}

impl Line {
    /// Create a line of the given type without lengths.
    #[must_use]
    pub fn new(line_type: Arc<LineType>) -> Self {
        Self {
            name: String::new(),
            color: "default".to_owned(),
            line_type,
            target_length: None,
            init_length: None,
            trim_correction: None,
            v_inf: Vector::zeros(),
            rho_air: RHO_AIR,
            force: None,
            sag_par_1: None,
            sag_par_2: None,
        }
    }

    /// Set the name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Set the colour.
    #[must_use]
    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_owned();
        self
    }

    /// Set the manufacturing target length. Also seeds the initial length when unset.
    #[must_use]
    pub fn with_target_length(mut self, target_length: f64) -> Self {
        self.target_length = Some(target_length);
        if self.init_length.is_none() {
            self.init_length = Some(target_length);
        }
        self
    }

    /// Set the geometric length used by the relaxation.
    #[must_use]
    pub fn with_init_length(mut self, init_length: f64) -> Self {
        self.init_length = Some(init_length);
        self
    }

    /// Set a manual length correction in metres.
    #[must_use]
    pub fn with_trim_correction(mut self, trim_correction: f64) -> Self {
        self.trim_correction = Some(trim_correction);
        self
    }

    /// Physical properties.
    #[must_use]
    pub fn line_type(&self) -> &Arc<LineType> {
        &self.line_type
    }

    /// Replace the physical properties.
    pub fn set_line_type(&mut self, line_type: Arc<LineType>) {
        self.line_type = line_type;
    }

    /// Desired as-built length under the standard pre-load.
    #[must_use]
    pub fn target_length(&self) -> Option<f64> {
        self.target_length
    }

    /// Replace the target length.
    pub fn set_target_length(&mut self, target_length: Option<f64>) {
        self.target_length = target_length;
    }

    /// Length used to place the upper node during the geometry pass.
    #[must_use]
    pub fn init_length(&self) -> Option<f64> {
        self.init_length
    }

    /// Replace the geometric length.
    pub fn set_init_length(&mut self, init_length: Option<f64>) {
        self.init_length = init_length;
    }

    /// Manual length correction in metres.
    #[must_use]
    pub fn trim_correction(&self) -> Option<f64> {
        self.trim_correction
    }

    /// Ambient flow broadcast by the owning line set.
    #[must_use]
    pub fn v_inf(&self) -> Vector {
        self.v_inf
    }

    /// Air density in kg/m³.
    #[must_use]
    pub fn rho_air(&self) -> f64 {
        self.rho_air
    }

    /// Computed tension in newtons.
    #[must_use]
    pub fn force(&self) -> Option<f64> {
        self.force
    }

    /// Solved sag parameters `(sag_par_1, sag_par_2)`.
    #[must_use]
    pub fn sag_parameters(&self) -> Option<(f64, f64)> {
        Some((self.sag_par_1?, self.sag_par_2?))
    }

    pub(crate) fn set_flow(&mut self, v_inf: Vector, rho_air: f64) {
        self.v_inf = v_inf;
        self.rho_air = rho_air;
    }

    pub(crate) fn set_force(&mut self, force: Option<f64>) {
        self.force = force;
    }

    pub(crate) fn set_sag_parameters(&mut self, parameters: Option<(f64, f64)>) {
        self.sag_par_1 = parameters.map(|p| p.0);
        self.sag_par_2 = parameters.map(|p| p.1);
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        self.target_length = self.target_length.map(|length| length * factor);
        self.init_length = self.init_length.map(|length| length * factor);
        self.force = None;
    }
}

/// A line together with both of its endpoint nodes.
#[derive(Clone, Copy, Debug)]
pub struct LineRef<'a> {
    index: EdgeIndex,
    line: &'a Line,
    lower_index: NodeIndex,
    upper_index: NodeIndex,
    lower: &'a Node,
    upper: &'a Node,
}

impl<'a> LineRef<'a> {
    pub(crate) fn new(
        index: EdgeIndex,
        line: &'a Line,
        (lower_index, lower): (NodeIndex, &'a Node),
        (upper_index, upper): (NodeIndex, &'a Node),
    ) -> Self {
        Self {
            index,
            line,
            lower_index,
            upper_index,
            lower,
            upper,
        }
    }

    /// Index of the line in its line set.
    #[must_use]
    pub fn index(&self) -> EdgeIndex {
        self.index
    }

    /// Stored line state.
    #[must_use]
    pub fn line(&self) -> &'a Line {
        self.line
    }

    /// Name of the line.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.line.name
    }

    /// Index of the lower node.
    #[must_use]
    pub fn lower_index(&self) -> NodeIndex {
        self.lower_index
    }

    /// Index of the upper node.
    #[must_use]
    pub fn upper_index(&self) -> NodeIndex {
        self.upper_index
    }

    /// The lower node.
    #[must_use]
    pub fn lower_node(&self) -> &'a Node {
        self.lower
    }

    /// The upper node.
    #[must_use]
    pub fn upper_node(&self) -> &'a Node {
        self.upper
    }

    /// Whether the endpoints have been placed.
    #[must_use]
    pub fn has_geo(&self) -> bool {
        self.lower.position().norm() + self.upper.position().norm() > 0.0
    }

    /// Unit flow direction, zero in still air.
    #[must_use]
    pub fn v_inf_0(&self) -> Vector {
        normalized_or_zero(&self.line.v_inf)
    }

    /// Unit vector from the lower to the upper node.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::ZeroLength`] when both nodes coincide.
    pub fn diff_vector(&self) -> Result<Vector, LineError> {
        self.unit(self.upper.position() - self.lower.position())
    }

    /// Unit vector between the projected node positions.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingProjection`] when the node projections are stale
    /// and [`LineError::ZeroLength`] when they coincide.
    pub fn diff_vector_projected(&self) -> Result<Vector, LineError> {
        let (lower, upper) = self.projections()?;
        self.unit(upper - lower)
    }

    /// Distance between the projected node positions.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingProjection`] when the node projections are stale.
    pub fn length_projected(&self) -> Result<f64, LineError> {
        let (lower, upper) = self.projections()?;
        Ok((upper - lower).norm())
    }

    /// Straight distance between the nodes.
    #[must_use]
    pub fn length_no_sag(&self) -> f64 {
        (self.upper.position() - self.lower.position()).norm()
    }

    /// Arc length of the parabolic sag curve over the projected length.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingSag`] before the sag pass and any error of
    /// [`force_projected`](Self::force_projected).
    pub fn length_with_sag(&self) -> Result<f64, LineError> {
        let sag_par_1 = self.line.sag_par_1.ok_or_else(|| LineError::MissingSag {
            line: self.line.name.clone(),
        })?;
        let alpha = self
            .diff_vector()?
            .dot(&self.v_inf_0())
            .clamp(-1.0, 1.0)
            .asin();
        let q1 = self.ortho_pressure() / self.force_projected()? / 2.0;
        let q2 = sag_par_1 + alpha.tan();
        let length = self.length_projected()?;

        if q1.abs() < SAG_EPSILON {
            // y = q2 * x
            return Ok((1.0 + q2 * q2).sqrt() * length);
        }

        // y = -q1 x² + q2 x + d
        let integral = |x: f64| {
            let slope = q2 - 2.0 * q1 * x;
            -((slope * slope + 1.0).sqrt() * slope + slope.asinh()) / (4.0 * q1)
        };
        Ok(integral(length) - integral(0.0))
    }

    /// Length for production: the geometric length relaxed from the computed
    /// force down to `pre_load`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`length_with_sag`](Self::length_with_sag) when `sag` is set.
    pub fn get_stretched_length(&self, pre_load: f64, sag: bool) -> Result<f64, LineError> {
        let length = if sag {
            self.length_with_sag()?
        } else {
            self.length_no_sag()
        };
        let line_type = &self.line.line_type;
        let factor = line_type.get_stretch_factor(pre_load)
            / line_type.get_stretch_factor(self.line.force.unwrap_or(0.0));
        Ok(length * factor)
    }

    /// Drag per metre of line: `1/2 * cw * d * rho * v²`.
    #[must_use]
    pub fn ortho_pressure(&self) -> f64 {
        let line_type = &self.line.line_type;
        0.5 * line_type.cw * line_type.diameter * self.line.rho_air * self.line.v_inf.norm_squared()
    }

    /// Total drag of the line.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingProjection`] when the node projections are stale.
    pub fn drag_total(&self) -> Result<f64, LineError> {
        Ok(self.ortho_pressure() * self.length_projected()?)
    }

    /// Weight of the line in grams.
    #[must_use]
    pub fn get_weight(&self) -> f64 {
        let weight = self.line.line_type.weight_per_length();
        match self.length_with_sag() {
            Ok(length) => weight * length,
            Err(_) => weight * self.length_no_sag(),
        }
    }

    /// Tension component consistent with the projected-length sag model.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingForce`] before the force pass and
    /// [`LineError::ZeroLength`] for coinciding nodes.
    pub fn force_projected(&self) -> Result<f64, LineError> {
        let length = self.length_no_sag();
        let Some(force) = self.line.force else {
            error!(line = %self.line.name, length, "invalid force: not computed");
            return Err(LineError::MissingForce {
                line: self.line.name.clone(),
            });
        };
        if length == 0.0 {
            error!(line = %self.line.name, force, "invalid force: zero length");
            return Err(LineError::ZeroLength {
                line: self.line.name.clone(),
            });
        }
        Ok(force * self.length_projected()? / length)
    }

    /// Sag deflection along the flow at fraction `x` of the projected length.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingSag`] before the sag pass.
    pub fn get_sag(&self, x: f64) -> Result<f64, LineError> {
        let (sag_par_1, sag_par_2) = self.sag()?;
        let xi = x * self.length_projected()?;
        Ok(-xi * xi / 2.0 * self.ortho_pressure() / self.force_projected()?
            + xi * sag_par_1
            + sag_par_2)
    }

    /// Point at fraction `x` between the nodes, displaced by the sag when `sag` is set.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_sag`](Self::get_sag) when `sag` is set.
    pub fn get_line_point(&self, x: f64, sag: bool) -> Result<Vector, LineError> {
        let point = self.lower.position() * (1.0 - x) + self.upper.position() * x;
        if sag {
            return Ok(point + self.v_inf_0() * self.get_sag(x)?);
        }
        Ok(point)
    }

    /// `numpoints` evenly spaced points along the line. Sag is skipped when unsolved.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_sag`](Self::get_sag).
    pub fn get_line_points(&self, sag: bool, numpoints: usize) -> Result<Vec<Vector>, LineError> {
        let sag = sag && self.line.sag_parameters().is_some();
        let last = numpoints.saturating_sub(1).max(1) as f64;
        (0..numpoints)
            .map(|i| self.get_line_point(i as f64 / last, sag))
            .collect()
    }

    /// Sag parameters expressed relative to the projection plane through the origin.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingSag`] before the sag pass and
    /// [`LineError::MissingProjection`] when the node projections are stale.
    pub fn projected_sag_parameters(&self) -> Result<(f64, f64), LineError> {
        let (sag_par_1, sag_par_2) = self.sag()?;
        let v_inf_0 = self.v_inf_0();
        let missing = || LineError::MissingProjection {
            line: self.line.name.clone(),
        };
        let lower = self.lower.get_diff().ok_or_else(missing)?.dot(&v_inf_0);
        let upper = self.upper.get_diff().ok_or_else(missing)?.dot(&v_inf_0);
        Ok((
            lower + sag_par_1,
            upper / self.length_projected()? + sag_par_2,
        ))
    }

    /// Force per metre of node movement needed to compensate `residual_force`
    /// by moving the line's upper node along the residual.
    ///
    /// Parallel lines contribute nothing, perpendicular lines their full tension.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingForce`] before the force pass,
    /// [`LineError::ZeroLength`] for coinciding nodes and
    /// [`LineError::ZeroResidual`] when there is nothing to correct.
    pub fn get_correction_influence(&self, residual_force: &Vector) -> Result<f64, LineError> {
        let force = self.line.force.ok_or_else(|| LineError::MissingForce {
            line: self.line.name.clone(),
        })?;
        let diff = self.diff_vector()?;
        let length = diff.norm();
        let residual = residual_force.norm();
        if residual == 0.0 {
            return Err(LineError::ZeroResidual {
                line: self.line.name.clone(),
            });
        }
        let alignment = (residual_force / residual).dot(&(diff / length));
        Ok((1.0 - alignment) * force / length)
    }

    fn sag(&self) -> Result<(f64, f64), LineError> {
        self.line
            .sag_parameters()
            .ok_or_else(|| LineError::MissingSag {
                line: self.line.name.clone(),
            })
    }

    fn projections(&self) -> Result<(Vector, Vector), LineError> {
        match (self.lower.vec_proj(), self.upper.vec_proj()) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(LineError::MissingProjection {
                line: self.line.name.clone(),
            }),
        }
    }

    fn unit(&self, delta: Vector) -> Result<Vector, LineError> {
        let length = delta.norm();
        if length == 0.0 {
            return Err(LineError::ZeroLength {
                line: self.line.name.clone(),
            });
        }
        Ok(delta / length)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::{force, point};

    fn test_type() -> Arc<LineType> {
        Arc::new(
            LineType::new("test", 1.0, vec![(100.0, 1.0)], Some(1000.0), Some(1.0))
                .expect("valid line type"),
        )
    }

    /// Line with projected endpoints and the given tension and flow.
    fn fixture(upper: Vector, tension: Option<f64>, v_inf: Vector) -> (Line, Node, Node) {
        let mut line = Line::new(test_type()).with_name("1_A1");
        line.set_flow(v_inf, RHO_AIR);
        line.set_force(tension);
        let mut lower = Node::lower("main", Vector::zeros());
        let mut upper = Node::upper("A1", upper, force(0.0, 0.0, 100.0));
        lower.calc_proj_vec(&v_inf);
        upper.calc_proj_vec(&v_inf);
        (line, lower, upper)
    }

    fn view<'a>(line: &'a Line, lower: &'a Node, upper: &'a Node) -> LineRef<'a> {
        LineRef::new(
            EdgeIndex::new(0),
            line,
            (NodeIndex::new(0), lower),
            (NodeIndex::new(1), upper),
        )
    }

    #[test]
    fn straight_line_in_still_air() {
        let (mut line, lower, upper) = fixture(point(0.0, 0.0, -1.0), Some(100.0), Vector::zeros());
        line.set_sag_parameters(Some((0.0, 0.0)));
        let line_ref = view(&line, &lower, &upper);

        assert_relative_eq!(line_ref.length_no_sag(), 1.0);
        assert_relative_eq!(line_ref.ortho_pressure(), 0.0);
        assert_relative_eq!(
            line_ref.length_with_sag().expect("sag solved"),
            1.0,
            epsilon = 1.0e-12
        );
        assert_eq!(
            line_ref.diff_vector().expect("non-degenerate"),
            point(0.0, 0.0, -1.0)
        );
    }

    #[test]
    fn projected_length_drops_flow_component() {
        let (line, lower, upper) =
            fixture(point(3.0, 0.0, 4.0), Some(100.0), point(10.0, 0.0, 0.0));
        let line_ref = view(&line, &lower, &upper);

        assert_relative_eq!(line_ref.length_no_sag(), 5.0, epsilon = 1.0e-12);
        assert_relative_eq!(
            line_ref.length_projected().expect("projected"),
            4.0,
            epsilon = 1.0e-12
        );
        assert_relative_eq!(
            line_ref.force_projected().expect("force available"),
            80.0,
            epsilon = 1.0e-9
        );
    }

    #[test]
    fn ortho_pressure_scales_with_dynamic_pressure() {
        let (line, lower, upper) =
            fixture(point(0.0, 0.0, 5.0), Some(100.0), point(10.0, 0.0, 0.0));
        let line_ref = view(&line, &lower, &upper);
        let expected = 0.5 * 1.1 * 0.001 * 1.2 * 100.0;
        assert_relative_eq!(line_ref.ortho_pressure(), expected, epsilon = 1.0e-12);
        assert_relative_eq!(
            line_ref.drag_total().expect("projected"),
            expected * 5.0,
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn stretched_length_without_force_uses_unloaded_reference() {
        let (line, lower, upper) = fixture(point(0.0, 0.0, 2.0), None, Vector::zeros());
        let line_ref = view(&line, &lower, &upper);
        let line_type = line.line_type();
        let expected =
            2.0 * line_type.get_stretch_factor(50.0) / line_type.get_stretch_factor(0.0);
        assert_relative_eq!(
            line_ref.get_stretched_length(50.0, false).expect("no sag needed"),
            expected,
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn sag_queries_fail_before_sag_pass() {
        let (line, lower, upper) =
            fixture(point(0.0, 0.0, 5.0), Some(100.0), point(10.0, 0.0, 0.0));
        let line_ref = view(&line, &lower, &upper);
        assert_eq!(
            line_ref.length_with_sag().expect_err("sag missing"),
            LineError::MissingSag {
                line: "1_A1".to_owned()
            }
        );
        assert!(line_ref.get_sag(0.5).is_err());
        assert_eq!(line_ref.get_line_points(true, 3).expect("falls back").len(), 3);
    }

    #[test]
    fn force_projected_requires_force() {
        let (line, lower, upper) = fixture(point(0.0, 0.0, 5.0), None, Vector::zeros());
        let line_ref = view(&line, &lower, &upper);
        assert!(matches!(
            line_ref.force_projected(),
            Err(LineError::MissingForce { .. })
        ));
    }

    #[test]
    fn single_span_sag_is_a_symmetric_parabola() {
        let (mut line, lower, upper) =
            fixture(point(0.0, 0.0, 5.0), Some(100.0), point(10.0, 0.0, 0.0));
        let q = 0.5 * 1.1 * 0.001 * 1.2 * 100.0;
        line.set_sag_parameters(Some((q * 5.0 / 200.0, 0.0)));
        let line_ref = view(&line, &lower, &upper);

        assert_relative_eq!(line_ref.get_sag(0.0).expect("solved"), 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(line_ref.get_sag(1.0).expect("solved"), 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(
            line_ref.get_sag(0.5).expect("solved"),
            q * 25.0 / 800.0,
            epsilon = 1.0e-12
        );

        let midpoint = line_ref.get_line_point(0.5, true).expect("solved");
        assert_relative_eq!(midpoint.x, q * 25.0 / 800.0, epsilon = 1.0e-12);
        assert!(line_ref.length_with_sag().expect("solved") > 5.0);
    }

    #[test]
    fn correction_influence_vanishes_for_parallel_residual() {
        let (line, lower, upper) = fixture(point(0.0, 0.0, 2.0), Some(50.0), Vector::zeros());
        let line_ref = view(&line, &lower, &upper);
        let parallel = line_ref
            .get_correction_influence(&point(0.0, 0.0, 3.0))
            .expect("force available");
        let normal = line_ref
            .get_correction_influence(&point(3.0, 0.0, 0.0))
            .expect("force available");
        assert_relative_eq!(parallel, 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(normal, 50.0, epsilon = 1.0e-12);
    }

    #[test]
    fn correction_influence_needs_a_residual() {
        let (line, lower, upper) = fixture(point(0.0, 0.0, 2.0), Some(50.0), Vector::zeros());
        let error = view(&line, &lower, &upper)
            .get_correction_influence(&Vector::zeros())
            .expect_err("nothing to correct");
        assert_eq!(
            error,
            LineError::ZeroResidual {
                line: "1_A1".to_owned()
            }
        );
    }
}
