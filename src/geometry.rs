//! Vector helpers shared by the line solver.

use nalgebra::Vector3;
use tracing::warn;

/// Cartesian vector in metres (positions) or newtons (forces).
pub type Vector = Vector3<f64>;

/// Squared projection below which a force is treated as perpendicular to a line.
const SINGULAR_PROJECTION: f64 = 1.0e-5;

/// Convenience helper for creating positions.
///
/// # Examples
/// ```
/// use linesetx::point;
///
/// let origin = point(0.0, 0.0, 0.0);
/// assert_eq!(origin.x, 0.0);
/// ```
#[must_use]
pub fn point(x: f64, y: f64, z: f64) -> Vector {
    Vector::new(x, y, z)
}

/// Convenience helper for creating force vectors.
///
/// # Examples
/// ```
/// use linesetx::force;
///
/// let load = force(1.0, 0.0, -5.0);
/// assert_eq!(load.z, -5.0);
/// ```
#[must_use]
pub fn force(x: f64, y: f64, z: f64) -> Vector {
    Vector::new(x, y, z)
}

/// Normalize `vector`, returning the zero vector for a zero input.
#[must_use]
pub fn normalized_or_zero(vector: &Vector) -> Vector {
    let length = vector.norm();
    if length == 0.0 {
        Vector::zeros()
    } else {
        vector / length
    }
}

/// Project `vector` onto the plane through the origin with normal `normal`.
///
/// A zero normal leaves the vector untouched.
#[must_use]
pub fn project_to_plane(vector: &Vector, normal: &Vector) -> Vector {
    let norm_squared = normal.norm_squared();
    if norm_squared == 0.0 {
        return *vector;
    }
    vector - normal * (normal.dot(vector) / norm_squared)
}

/// Tension in a line with unit direction `direction` that carries `force` at its end.
///
/// The line tension `t` is chosen so that `t * direction` and `force` share the
/// same component along `force`. Returns `None` when the force is (nearly)
/// perpendicular to the line.
#[must_use]
pub fn project_force(force: &Vector, direction: &Vector) -> Option<f64> {
    let projection = direction.dot(force);
    if projection * projection < SINGULAR_PROJECTION {
        warn!(
            ?direction,
            ?force,
            projection,
            "singular force projection"
        );
        return None;
    }
    Some(force.dot(force) / projection)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn plane_projection_removes_normal_component() {
        let projected = project_to_plane(&point(1.0, 2.0, 3.0), &point(0.0, 0.0, 2.0));
        assert_eq!(projected, point(1.0, 2.0, 0.0));
    }

    #[test]
    fn zero_normal_keeps_vector() {
        let vector = point(1.0, -2.0, 0.5);
        assert_eq!(project_to_plane(&vector, &Vector::zeros()), vector);
    }

    #[test]
    fn aligned_force_projects_to_its_magnitude() {
        let tension = project_force(&force(0.0, 0.0, 100.0), &point(0.0, 0.0, 1.0))
            .expect("aligned force projects");
        assert_relative_eq!(tension, 100.0, epsilon = 1.0e-12);
    }

    #[test]
    fn inclined_force_increases_tension() {
        let direction = point(1.0, 0.0, 1.0).normalize();
        let tension =
            project_force(&force(0.0, 0.0, 100.0), &direction).expect("inclined force projects");
        assert_relative_eq!(tension, 100.0 * 2.0_f64.sqrt(), epsilon = 1.0e-9);
    }

    #[test]
    fn perpendicular_force_is_singular() {
        assert!(project_force(&force(10.0, 0.0, 0.0), &point(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn zero_vector_normalizes_to_zero() {
        assert_eq!(normalized_or_zero(&Vector::zeros()), Vector::zeros());
        assert_eq!(normalized_or_zero(&point(0.0, 3.0, 0.0)), point(0.0, 1.0, 0.0));
    }
}
