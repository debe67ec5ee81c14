use crate::layout::CascadeLayout;
use linesetx::{force, point, LineSet, LineSetError, Vector};

/// Flight state used for the cascade demonstration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightConditions {
    /// Airspeed in metres per second.
    pub speed: f64,
    /// Angle between the flow and the horizontal in degrees.
    pub angle_of_attack: f64,
    /// Total load carried by the attachment points in newtons.
    pub wing_load: f64,
    /// Share of the load carried by the A attachment points.
    pub a_share: f64,
}

impl Default for FlightConditions {
    fn default() -> Self {
        Self {
            speed: 10.0,
            angle_of_attack: 6.0,
            wing_load: 900.0,
            a_share: 0.6,
        }
    }
}

impl FlightConditions {
    /// Ambient flow seen by the lines.
    #[must_use]
    pub fn v_inf(&self) -> Vector {
        let alpha = self.angle_of_attack.to_radians();
        point(alpha.cos(), 0.0, alpha.sin()) * self.speed
    }

    /// Unit vector of the lift, normal to the flow in the x-z plane.
    #[must_use]
    pub fn lift_direction(&self) -> Vector {
        let alpha = self.angle_of_attack.to_radians();
        force(-alpha.sin(), 0.0, alpha.cos())
    }
}

/// Set the flow and the attachment point loads of the demonstration cascade.
///
/// The A points share `a_share` of the wing load, the B points the rest, both
/// split evenly between left and right.
pub fn apply_flight_conditions(
    lines: &mut LineSet,
    layout: &CascadeLayout,
) -> Result<FlightConditions, LineSetError> {
    let conditions = FlightConditions::default();
    lines.set_v_inf(conditions.v_inf());

    let lift = conditions.lift_direction() * conditions.wing_load;
    let shares = [
        conditions.a_share,
        conditions.a_share,
        1.0 - conditions.a_share,
        1.0 - conditions.a_share,
    ];
    for (&node, share) in layout.attachment_points.iter().zip(shares) {
        let attachment = lines
            .node_mut(node)
            .ok_or(LineSetError::UnknownNode(node))?;
        attachment.set_force(Some(lift * share / 2.0));
    }

    Ok(conditions)
}
