//! Solver settings.

use serde::{Deserialize, Serialize};

use crate::errors::LineSetError;
use crate::line::RHO_AIR;

/// Tunable parameters of [`LineSet::recalc`](crate::LineSet::recalc) and
/// [`LineSet::iterate_target_length`](crate::LineSet::iterate_target_length).
///
/// `correction_damping` and `fallback_force` are empirical and have no
/// physical derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Relaxation passes per recalculation.
    pub iterations: usize,
    /// Whether to solve the sag system in each pass.
    pub calculate_sag: bool,
    /// Air density in kg/m³.
    pub rho_air: f64,
    /// Reference load in newtons at which production lengths are quoted.
    pub pre_load: f64,
    /// Recalculations of the target length iteration.
    pub target_length_steps: usize,
    /// Fraction of the residual correction applied per pass.
    pub correction_damping: f64,
    /// Tension in newtons assumed when an attachment force is perpendicular to its line.
    pub fallback_force: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            calculate_sag: true,
            rho_air: RHO_AIR,
            pre_load: 50.0,
            target_length_steps: 10,
            correction_damping: 0.5,
            fallback_force: 10.0,
        }
    }
}

impl SolverConfig {
    /// Parse a (possibly partial) JSON object over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Serialization`] for malformed JSON.
    ///
    /// # Examples
    /// ```
    /// use linesetx::SolverConfig;
    ///
    /// let config = SolverConfig::from_json(r#"{"iterations": 8}"#).expect("valid json");
    /// assert_eq!(config.iterations, 8);
    /// assert!(config.calculate_sag);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, LineSetError> {
        Ok(serde_json::from_str(json)?)
    }
}
