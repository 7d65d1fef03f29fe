use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        MorphError::invalid_image("a.png", "blank")
            .to_string()
            .contains("invalid image 'a.png'")
    );
    assert!(
        MorphError::malformed_archive("x")
            .to_string()
            .contains("malformed archive:")
    );
    assert!(
        MorphError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        MorphError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn in_transition_tags_solver_errors_once() {
    let err = MorphError::SolverDivergence {
        iterations: 10,
        cap: 10,
        transition: None,
    }
    .in_transition(2);
    let msg = err.to_string();
    assert!(msg.contains("in transition 2"), "{msg}");
    assert!(msg.contains("cap 10"), "{msg}");

    let retagged = err.in_transition(5).to_string();
    assert!(retagged.contains("in transition 2"), "{retagged}");
}

#[test]
fn dimension_mismatch_names_both_sizes() {
    let msg = MorphError::DimensionMismatch {
        left: 3,
        right: 4,
        transition: None,
    }
    .to_string();
    assert_eq!(msg, "dimension mismatch: 3 points vs 4 points");
}

#[test]
fn incomplete_frame_set_reports_detail() {
    let msg = MorphError::IncompleteFrameSet {
        found: 7,
        expected: 8,
        detail: Some("missing frames [3]".to_owned()),
    }
    .to_string();
    assert!(msg.contains("found 7 frames, expected 8"));
    assert!(msg.contains("missing frames [3]"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = MorphError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
