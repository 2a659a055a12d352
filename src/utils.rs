//! Helper functions

/// Checks if all values are finite
pub fn is_valid(qs: &[f64]) -> bool {
    qs.iter().all(|&q| q.is_finite())
}

/// Maps an angle in degrees to (-180, 180]
pub fn normalize_degrees(angle: f64) -> f64 {
    let x = angle.rem_euclid(360.0);
    if x > 180.0 { x - 360.0 } else { x }
}

/// Signed shortest angular difference `angle - reference` in degrees, in (-180, 180]
pub fn angle_difference(angle: f64, reference: f64) -> f64 {
    normalize_degrees(angle - reference)
}

/// Returns the value equivalent to `angle` (modulo 360 degrees) that is closest to `reference`.
pub fn unwind_near(angle: f64, reference: f64) -> f64 {
    reference + angle_difference(angle, reference)
}

/// Print joint values in machine units (mm, degrees).
pub fn dump_joints(joints: &[f64]) {
    let mut row_str = String::new();
    for value in joints {
        row_str.push_str(&format!("{:8.3} ", value));
    }
    println!("[{}]", row_str.trim_end());
}

/// formatting for YAML output
pub(crate) fn deg(x: &f64) -> String {
    if *x == 0.0 {
        return "0".to_string();
    }
    format!("deg({:.4})", x.to_degrees())
}
