use crate::conditions::FlightConditions;
use crate::layout::CascadeLayout;
use linesetx::{LineSet, LineSetError, Vector};

/// Solved state of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSummary {
    /// Line name.
    pub name: String,
    /// Line type name.
    pub line_type: String,
    /// Tension in newtons.
    pub force: f64,
    /// Production length under the reference load in metres.
    pub length: f64,
    /// Manufacturing target, if any.
    pub target_length: Option<f64>,
    /// Ratio of the tension to the minimum break load, if the type has one.
    pub load_ratio: Option<f64>,
}

/// Summary of the cascade solve.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    /// Largest knot residual after every relaxation pass of the last recalculation.
    pub residuals: Vec<f64>,
    /// Riser lines first, then every other line in name order.
    pub lines: Vec<LineSummary>,
    /// Centre of pressure of the line drag.
    pub drag_center: Vector,
    /// Total line drag in newtons.
    pub drag: f64,
    /// Line weight in grams.
    pub weight: f64,
    /// Flight state that produced the result.
    pub conditions: FlightConditions,
}

/// Trim the riser lengths to their targets and collect the solved line state.
pub fn run_analysis(
    lines: &mut LineSet,
    layout: &CascadeLayout,
    conditions: FlightConditions,
) -> Result<AnalysisSummary, LineSetError> {
    let config = lines.config().clone();
    let report = lines.iterate_target_length(config.target_length_steps, config.pre_load)?;

    let mut order = layout.risers.to_vec();
    let mut rest: Vec<_> = lines
        .line_indices()
        .filter(|line| !layout.risers.contains(line))
        .collect();
    rest.sort_by_cached_key(|&line| {
        lines
            .line(line)
            .map(|line| line.name().to_owned())
            .unwrap_or_default()
    });
    order.extend(rest);

    let mut summaries = Vec::with_capacity(order.len());
    for edge in order {
        let line = lines.line(edge)?;
        let force = line.line().force().unwrap_or(0.0);
        let length = lines
            .get_line_length(edge, config.calculate_sag, config.pre_load)?
            .get_length();
        let line_type = line.line().line_type();
        summaries.push(LineSummary {
            name: line.name().to_owned(),
            line_type: line_type.name.clone(),
            force,
            length,
            target_length: line.line().target_length(),
            load_ratio: line_type.min_break_load.map(|mbl| force / mbl),
        });
    }

    let (drag_center, drag) = lines.get_drag()?;
    Ok(AnalysisSummary {
        residuals: report.residuals,
        lines: summaries,
        drag_center,
        drag,
        weight: lines.get_weight(),
        conditions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::apply_flight_conditions;
    use crate::layout::{build_cascade, RISER_LENGTH};

    #[test]
    fn risers_reach_their_target_length() {
        let (mut lines, layout) = build_cascade().expect("cascade builds");
        let conditions = apply_flight_conditions(&mut lines, &layout).expect("conditions apply");
        let summary = run_analysis(&mut lines, &layout, conditions).expect("analysis runs");

        assert_eq!(summary.lines.len(), 6);
        for riser in &summary.lines[..2] {
            assert_eq!(riser.target_length, Some(RISER_LENGTH));
            assert!((riser.length - RISER_LENGTH).abs() < 1.0e-3, "{riser:?}");
        }

        // The A risers carry the larger share.
        assert!(summary.lines[0].force > summary.lines[1].force);
        assert!(summary
            .lines
            .iter()
            .all(|line| line.load_ratio.is_some_and(|ratio| ratio < 1.0)));
        assert!(summary.drag > 0.0);
        assert!(summary.weight > 0.0);
        assert!(summary.residuals.iter().all(|residual| residual.is_finite()));
    }
}
