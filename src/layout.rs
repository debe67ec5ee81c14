use linesetx::{
    force, point, EdgeIndex, Line, LineSet, LineSetError, LineTypeRegistry, Node, NodeIndex,
    DEFAULT_LINE_TYPE,
};

/// Handles into the demonstration cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeLayout {
    /// Harness attachment point.
    pub main: NodeIndex,
    /// Riser lines from the harness to the A and B knots.
    pub risers: [EdgeIndex; 2],
    /// Wing attachment points `A1`, `A2`, `B1`, `B2`.
    pub attachment_points: [NodeIndex; 4],
}

/// Length of both riser lines in metres.
pub const RISER_LENGTH: f64 = 5.0;

/// Build a two-riser cascade: the harness carries an A and a B riser, each
/// splitting into two lines towards the wing.
///
/// Positions follow the usual glider frame (x chordwise towards the trailing
/// edge, y spanwise, z up).
pub fn build_cascade() -> Result<(LineSet, CascadeLayout), LineSetError> {
    let registry = LineTypeRegistry::builtin();
    let riser_type = registry
        .get("liros.tsl190")
        .ok_or_else(|| LineSetError::UnknownLineType("liros.tsl190".to_owned()))?;
    let gallery_type = registry
        .get("liros.dsl70")
        .or_else(|| registry.get(DEFAULT_LINE_TYPE))
        .ok_or_else(|| LineSetError::UnknownLineType("liros.dsl70".to_owned()))?;

    let mut lines = LineSet::new(point(10.0, 0.0, 1.0));
    let main = lines.add_node(Node::lower("MAIN", point(0.0, 0.0, 0.0)));
    let a_knot = lines.add_node(Node::knot("a-riser"));
    let b_knot = lines.add_node(Node::knot("b-riser"));

    let attachment = |name: &str, x: f64, y: f64, rib_pos: f64| {
        Node::upper(name, point(x, y, 7.0), force(0.0, 0.0, 0.0))
            .with_rib_pos(rib_pos)
            .with_offset(0.02)
    };
    let a1 = lines.add_node(attachment("A1", 0.2, -0.3, 0.1));
    let a2 = lines.add_node(attachment("A2", 0.2, 0.3, 0.1));
    let b1 = lines.add_node(attachment("B1", -0.6, -0.3, 0.3));
    let b2 = lines.add_node(attachment("B2", -0.6, 0.3, 0.3));

    let riser = |name: &str| {
        Line::new(riser_type.clone())
            .with_name(name)
            .with_target_length(RISER_LENGTH)
    };
    let a_riser = lines.add_line(main, a_knot, riser("A"))?;
    let b_riser = lines.add_line(main, b_knot, riser("B"))?;
    for (knot, upper) in [(a_knot, a1), (a_knot, a2), (b_knot, b1), (b_knot, b2)] {
        lines.add_line(knot, upper, Line::new(gallery_type.clone()))?;
    }
    lines.rename_lines();

    Ok((
        lines,
        CascadeLayout {
            main,
            risers: [a_riser, b_riser],
            attachment_points: [a1, a2, b1, b2],
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_is_a_valid_tree() {
        let (lines, layout) = build_cascade().expect("cascade builds");
        assert_eq!(lines.line_count(), 6);
        assert_eq!(lines.node_count(), 7);
        lines.validate().expect("valid tree");
        assert_eq!(lines.lowest_lines(), layout.risers.to_vec());
        assert_eq!(
            lines.get_main_attachment_point().expect("named anchor"),
            layout.main
        );
        let a_riser = lines.line(layout.risers[0]).expect("riser");
        assert_eq!(a_riser.name(), "2_A1");
    }
}
