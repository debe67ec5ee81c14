use crate::analysis::AnalysisSummary;
use std::fmt::Write;

/// Render a textual summary of the cascade solve.
#[must_use]
pub fn render_summary(summary: &AnalysisSummary) -> String {
    let mut output = String::new();
    let conditions = &summary.conditions;

    writeln!(
        &mut output,
        "Line cascade (v = {:.1} m/s, alpha = {:.1} deg, load = {:.0} N)",
        conditions.speed, conditions.angle_of_attack, conditions.wing_load
    )
    .expect("writing to string cannot fail");

    match summary.residuals.last() {
        Some(residual) => writeln!(
            &mut output,
            "Knot residual after {} passes: {residual:.3e} N",
            summary.residuals.len()
        )
        .expect("writing to string cannot fail"),
        None => output.push_str("Knot residual: not available (no relaxation pass)\n"),
    }

    writeln!(
        &mut output,
        "{:<8} {:<14} {:>10} {:>12} {:>8}",
        "Line", "Type", "Force [N]", "Length [mm]", "Load"
    )
    .expect("writing to string cannot fail");
    for line in &summary.lines {
        let load = line
            .load_ratio
            .map_or_else(|| "-".to_owned(), |ratio| format!("{:.1}%", ratio * 100.0));
        writeln!(
            &mut output,
            "{:<8} {:<14} {:>10.1} {:>12.1} {:>8}",
            line.name,
            line.line_type,
            line.force,
            line.length * 1000.0,
            load
        )
        .expect("writing to string cannot fail");
    }

    writeln!(
        &mut output,
        "Line drag: {:.2} N at ({:.2}, {:.2}, {:.2}) m",
        summary.drag, summary.drag_center.x, summary.drag_center.y, summary.drag_center.z
    )
    .expect("writing to string cannot fail");
    writeln!(&mut output, "Line weight: {:.1} g", summary.weight)
        .expect("writing to string cannot fail");

    output
}
