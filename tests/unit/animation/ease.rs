use super::*;

const ALL: [Ease; 8] = [
    Ease::Linear,
    Ease::InQuad,
    Ease::OutQuad,
    Ease::InOutQuad,
    Ease::InCubic,
    Ease::OutCubic,
    Ease::InOutCubic,
    Ease::InOutSine,
];

#[test]
fn endpoints_are_exact() {
    for e in ALL {
        assert_eq!(e.apply(0.0), 0.0, "{e:?}");
        assert_eq!(e.apply(1.0), 1.0, "{e:?}");
    }
}

#[test]
fn every_ease_is_strictly_increasing() {
    for e in ALL {
        let mut prev = e.apply(0.0);
        for k in 1..=200 {
            let v = e.apply(f64::from(k) / 200.0);
            assert!(v > prev, "{e:?} not increasing at step {k}");
            prev = v;
        }
    }
}

#[test]
fn in_out_cubic_matches_reference_points() {
    assert!((Ease::InOutCubic.apply(0.25) - 0.0625).abs() < 1e-12);
    assert!((Ease::InOutCubic.apply(0.5) - 0.5).abs() < 1e-12);
    assert!((Ease::InOutCubic.apply(0.75) - 0.9375).abs() < 1e-12);
}

#[test]
fn missing_easing_is_identity() {
    assert_eq!(ease_time(0.3, None), 0.3);
    assert_eq!(ease_time(1.7, None), 1.0);
    assert_eq!(ease_time(0.25, Some(Ease::InQuad)), 0.0625);
}

#[test]
fn serde_uses_variant_names() {
    let json = serde_json::to_string(&Ease::InOutCubic).unwrap();
    assert_eq!(json, "\"InOutCubic\"");
    let back: Ease = serde_json::from_str("\"OutQuad\"").unwrap();
    assert_eq!(back, Ease::OutQuad);
}
