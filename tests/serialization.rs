#![warn(clippy::pedantic)]

use approx::assert_relative_eq;
use linesetx::{
    force, point, Line, LineSet, LineSetError, LineType, LineTypeRegistry, Node, SolverConfig,
    Vector,
};
use serde_json::json;

fn build_lineset() -> LineSet {
    let custom = LineType::new("test.dyneema", 1.1, vec![(100.0, 0.5), (300.0, 1.2)], Some(900.0), Some(0.8))
        .expect("valid line type")
        .with_seam_correction(0.05);
    let mut registry = LineTypeRegistry::builtin().clone();
    let custom = registry.insert(custom);
    let riser = registry.get("liros.ltc80").expect("builtin line type");

    let mut lines = LineSet::new(point(10.0, 0.0, 1.0));
    let main = lines.add_node(Node::lower("main", point(0.0, 0.0, 0.0)));
    let knot = lines.add_node(Node::knot("k1"));
    let a1 = lines.add_node(
        Node::upper("A1", point(-0.5, 0.0, 6.0), force(0.0, 0.0, 300.0)).with_offset(0.01),
    );
    let a2 = lines.add_node(
        Node::upper("A2", point(0.5, 0.0, 6.0), force(0.0, 0.0, 300.0)).with_rib_pos(0.25),
    );
    lines
        .add_line(
            main,
            knot,
            Line::new(riser)
                .with_target_length(4.0)
                .with_trim_correction(-0.005),
        )
        .expect("trunk connects");
    lines
        .add_line(knot, a1, Line::new(custom.clone()).with_color("red"))
        .expect("left line connects");
    lines
        .add_line(knot, a2, Line::new(custom))
        .expect("right line connects");
    lines.rename_lines();
    lines
}

#[test]
fn json_round_trip_preserves_the_line_set() {
    let mut lines = build_lineset();
    lines.recalc(None).expect("line set solves");

    let json = lines.to_json().expect("line set serializes");
    let restored = LineSet::from_json(&json).expect("line set deserializes");

    assert_eq!(restored.to_data(), lines.to_data());
    for node in lines.node_indices() {
        let original = lines.node(node).expect("original node");
        let copy = restored.node(node).expect("node restored at the same index");
        assert_eq!(copy.name, original.name);
        assert_eq!(copy.node_type(), original.node_type());
        assert_eq!(copy.position(), original.position());
        assert_eq!(copy.force(), original.force());
        assert_eq!(copy.offset(), original.offset());
        assert_eq!(copy.rib_pos(), original.rib_pos());
    }
    assert_eq!(restored.node_count(), 4);
    assert_eq!(restored.line_count(), 3);

    let data = lines.to_data();
    assert_eq!(data.line_types.len(), 1);
    assert_eq!(data.line_types[0].name, "test.dyneema");
    assert_eq!(data.lines[0].line_type, "liros.ltc80");
    assert_eq!(data.lines[1].color, "red");
}

#[test]
fn restored_line_set_solves_like_the_original() {
    let mut lines = build_lineset();
    let mut restored = LineSet::from_json(&lines.to_json().expect("line set serializes"))
        .expect("line set deserializes");

    lines.recalc(None).expect("original solves");
    restored.recalc(None).expect("restored line set solves");

    for (original, copy) in lines.lines().zip(restored.lines()) {
        assert_eq!(original.name(), copy.name());
        assert_relative_eq!(
            original.line().force().expect("force solved"),
            copy.line().force().expect("force solved"),
            epsilon = 1.0e-9
        );
        assert_relative_eq!(
            original.length_with_sag().expect("sag solved"),
            copy.length_with_sag().expect("sag solved"),
            epsilon = 1.0e-12
        );
    }
}

#[test]
fn deserialized_line_set_needs_a_recalculation() {
    let lines = build_lineset();
    let restored = LineSet::from_json(&lines.to_json().expect("line set serializes"))
        .expect("line set deserializes");

    let knot = restored.find_node("k1").expect("knot restored");
    assert_eq!(restored.node(knot).map(Node::position), Some(Vector::zeros()));
    assert!(restored.lines().all(|line| line.line().force().is_none()));
}

/// JSON of [`build_lineset`] with one field of the embedded custom line type replaced.
fn with_custom_type_field(field: &[&str], replacement: serde_json::Value) -> String {
    let json = build_lineset().to_json().expect("line set serializes");
    let mut value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
    let mut target = &mut value["line_types"][0];
    for key in field {
        target = &mut target[*key];
    }
    *target = replacement;
    value.to_string()
}

#[test]
fn single_point_stretch_curve_is_loaded_through_the_origin() {
    let json = with_custom_type_field(&["stretch_curve", "points"], json!([[100.0, 1.0]]));
    let mut restored = LineSet::from_json(&json).expect("single point curve is valid");
    let edge = restored.find_line("1_A1").expect("left line restored");
    assert_eq!(
        restored
            .line(edge)
            .expect("left line")
            .line()
            .line_type()
            .stretch_curve
            .points(),
        &[(0.0, 0.0), (100.0, 1.0)]
    );

    restored.recalc(None).expect("restored line set solves");
    let length = restored
        .get_line_length(edge, true, 50.0)
        .expect("sag solved")
        .get_length();
    assert!(length.is_finite() && length > 0.0, "length {length}");
}

#[test]
fn invalid_embedded_line_types_are_rejected() {
    let empty = with_custom_type_field(&["stretch_curve", "points"], json!([]));
    let Err(LineSetError::Serialization(error)) = LineSet::from_json(&empty) else {
        panic!("empty stretch curve accepted");
    };
    assert!(error.to_string().contains("is empty"), "{error}");

    for diameter in [json!(0.0), json!(-0.001)] {
        let flat = with_custom_type_field(&["diameter"], diameter);
        let Err(LineSetError::Serialization(error)) = LineSet::from_json(&flat) else {
            panic!("non-positive diameter accepted");
        };
        assert!(error.to_string().contains("positive diameter"), "{error}");
    }
}

#[test]
fn truncated_json_is_rejected() {
    let json = build_lineset().to_json().expect("line set serializes");
    let truncated = &json[..json.len() / 2];
    assert!(matches!(
        LineSet::from_json(truncated),
        Err(LineSetError::Serialization(_))
    ));
}

#[test]
fn solver_config_is_applied() {
    let config = SolverConfig::from_json(r#"{"iterations": 3, "calculate_sag": false}"#)
        .expect("valid config");
    let mut lines = build_lineset().with_config(config);

    let report = lines.recalc(None).expect("line set solves");
    assert_eq!(report.residuals.len(), 3);
    assert!(lines.lines().all(|line| line.line().sag_parameters().is_none()));
    // Without sag the production lengths fall back to the straight distance.
    let total = lines.total_length().expect("lengths available");
    assert!(total > 0.0);
}
