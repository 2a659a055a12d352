//! Rotation-compensated tool center point (RTCP).
//!
//! Translates programmed tool tip coordinates into the linear axis commands that keep the
//! tip in place while the rotary axes reorient the tool, and back. Three models are
//! supported, chosen by [RtcpModel] of the configuration:
//!
//! - head tilt: `linear = programmed - L * (v - (0, 0, 1))`, where `v` is the tool vector;
//! - table pivot: the workpiece turns about a pivot `P` mm from the rotary center, so the
//!   offset `(-P sin a, 0, P (1 - cos a))` rotated by `c` is added;
//! - kinematic: rigid body solution on the chain, `linear = M⁻¹ (programmed - L v - p0) + L ẑ`
//!   for the affine linear axis map `p = p0 + M * linear`, used for hybrid arrangements.
//!
//! Machine coordinates carry the tool length along Z at the neutral pose in all models.

use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;
use crate::kinematic_traits::tool_vector;
use crate::kinematics_error::KinematicsError;
use crate::kinematics_impl::{forward_kinematics, linear_axis_map};
use crate::parameters::cnc_kinematics::{MachineAxis, MachineConfiguration, RtcpModel};
use crate::toolpath::Toolpath;

/// Tool vector of the neutral pose
fn neutral() -> Vector3<f64> {
    Vector3::z()
}

/// Tilt (A or B) and rotation (C) angles in degrees; missing axes read as 0.
fn tilt_and_rotation(config: &MachineConfiguration, rotary: &[f64]) -> (f64, f64) {
    let value = |axis: MachineAxis| config.rotary_index(axis).map(|i| rotary[i]);
    let tilt = config.family.tilt_axis()
        .and_then(value)
        .or_else(|| value(MachineAxis::A))
        .or_else(|| value(MachineAxis::B))
        .unwrap_or(0.0);
    let rotation = value(MachineAxis::C).unwrap_or(0.0);
    (tilt, rotation)
}

/// Tool vector `(sin t sin r, sin t cos r, cos t)` for tilt `t` and rotation `r` in degrees.
pub fn head_tool_vector(tilt: f64, rotation: f64) -> Vector3<f64> {
    let (t, r) = (tilt.to_radians(), rotation.to_radians());
    Vector3::new(t.sin() * r.sin(), t.sin() * r.cos(), t.cos())
}

/// Offset of the workpiece point caused by tilting the table about a pivot
/// `pivot_distance` away from the rotary center, turned by the rotation angle.
fn pivot_offset(pivot_distance: f64, tilt: f64, rotation: f64) -> Vector3<f64> {
    let a = tilt.to_radians();
    let offset = Vector3::new(-pivot_distance * a.sin(), 0.0, pivot_distance * (1.0 - a.cos()));
    Rotation3::from_axis_angle(&Vector3::z_axis(), rotation.to_radians()) * offset
}

fn check_rotary(config: &MachineConfiguration, rotary: &[f64]) -> Result<(), KinematicsError> {
    let expected = config.dof() - 3;
    if rotary.len() != expected {
        return Err(KinematicsError::DimensionMismatch { expected, found: rotary.len() });
    }
    Ok(())
}

/// Linear axis command for the programmed tool tip position at the given rotary angles
/// (degrees, in rotary axis order).
pub fn compute_tcp_compensation(
    programmed: &Vector3<f64>,
    rotary: &[f64],
    config: &MachineConfiguration,
    tool_length: f64,
) -> Result<Vector3<f64>, KinematicsError> {
    check_rotary(config, rotary)?;
    match config.rtcp {
        RtcpModel::HeadTilt => {
            let (tilt, rotation) = tilt_and_rotation(config, rotary);
            let v = head_tool_vector(tilt, rotation);
            Ok(programmed - (v - neutral()) * tool_length)
        }
        RtcpModel::TablePivot { pivot_distance } => {
            let (tilt, rotation) = tilt_and_rotation(config, rotary);
            Ok(programmed + pivot_offset(pivot_distance, tilt, rotation))
        }
        RtcpModel::Kinematic => {
            let joints = config.joint_vector(&Vector3::zeros(), rotary)?;
            let (p0, m) = linear_axis_map(config, &joints)?;
            let v = tool_vector(&forward_kinematics(config, &joints)?);
            let inverse = m.try_inverse().ok_or_else(|| KinematicsError::InvalidConfiguration(
                format!("{}: linear axes are not independent", config.name)))?;
            Ok(inverse * (programmed - v * tool_length - p0) + neutral() * tool_length)
        }
    }
}

/// Recovers the programmed tool tip position from the linear axis command. Exact
/// inverse of [compute_tcp_compensation].
pub fn inverse_tcp_compensation(
    compensated: &Vector3<f64>,
    rotary: &[f64],
    config: &MachineConfiguration,
    tool_length: f64,
) -> Result<Vector3<f64>, KinematicsError> {
    check_rotary(config, rotary)?;
    match config.rtcp {
        RtcpModel::HeadTilt => {
            let (tilt, rotation) = tilt_and_rotation(config, rotary);
            let v = head_tool_vector(tilt, rotation);
            Ok(compensated + (v - neutral()) * tool_length)
        }
        RtcpModel::TablePivot { pivot_distance } => {
            let (tilt, rotation) = tilt_and_rotation(config, rotary);
            Ok(compensated - pivot_offset(pivot_distance, tilt, rotation))
        }
        RtcpModel::Kinematic => {
            let joints = config.joint_vector(&Vector3::zeros(), rotary)?;
            let (p0, m) = linear_axis_map(config, &joints)?;
            let v = tool_vector(&forward_kinematics(config, &joints)?);
            Ok(p0 + m * (compensated - neutral() * tool_length) + v * tool_length)
        }
    }
}

/// Compensates every point of the toolpath (in parallel). Rotary values, feeds and flags
/// are kept; the linear coordinates become machine commands.
pub fn compensate_toolpath(
    config: &MachineConfiguration,
    toolpath: &Toolpath,
    tool_length: f64,
) -> Result<Toolpath, KinematicsError> {
    let points = toolpath.points
        .par_iter()
        .map(|point| {
            let linear = compute_tcp_compensation(&point.linear, &point.rotary, config, tool_length)?;
            Ok(crate::toolpath::ToolpathPoint { linear, ..point.clone() })
        })
        .collect::<Result<Vec<_>, KinematicsError>>()?;
    Ok(Toolpath::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use crate::toolpath::ToolpathPoint;

    #[test]
    fn test_head_tilt_scenario() {
        // Tool length 100 mm, programmed (100, 50, 0), B = 30, C = 45
        let config = MachineConfiguration::head_head_bc();
        let compensated = compute_tcp_compensation(
            &Vector3::new(100.0, 50.0, 0.0), &[30.0, 45.0], &config, 100.0).unwrap();
        let expected_z = -100.0 * (30.0_f64.to_radians().cos() - 1.0);
        assert!((compensated.z - expected_z).abs() < 1e-6);

        let v = head_tool_vector(30.0, 45.0);
        assert_relative_eq!(compensated.x, 100.0 - 100.0 * v.x, epsilon = 1e-9);
        assert_relative_eq!(compensated.y, 50.0 - 100.0 * v.y, epsilon = 1e-9);
    }

    #[test]
    fn test_neutral_pose_needs_no_compensation() {
        for config in MachineConfiguration::builtin() {
            let p = Vector3::new(12.0, -34.0, 56.0);
            let compensated = compute_tcp_compensation(&p, &[0.0, 0.0], &config, 75.0).unwrap();
            assert_relative_eq!(compensated, p, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_table_pivot_offset() {
        let config = MachineConfiguration::table_table_ac_with_pivot(50.0);
        // A = 90 on C = 0: the pivot swings 50 mm down X and 50 mm up Z
        let compensated = compute_tcp_compensation(&Vector3::zeros(), &[90.0, 0.0], &config, 0.0).unwrap();
        assert_relative_eq!(compensated, Vector3::new(-50.0, 0.0, 50.0), epsilon = 1e-9);
        // Turned by C = 90
        let compensated = compute_tcp_compensation(&Vector3::zeros(), &[90.0, 90.0], &config, 0.0).unwrap();
        assert_relative_eq!(compensated, Vector3::new(0.0, -50.0, 50.0), epsilon = 1e-9);
    }

    #[test]
    fn test_kinematic_model_agrees_with_head_formula() {
        // On a head-head chain without offsets, the rigid body model must reproduce the formula
        let mut config = MachineConfiguration::head_head_bc();
        let formula = compute_tcp_compensation(&Vector3::new(5.0, 6.0, 7.0), &[-40.0, 130.0], &config, 60.0);
        config.rtcp = RtcpModel::Kinematic;
        let kinematic = compute_tcp_compensation(&Vector3::new(5.0, 6.0, 7.0), &[-40.0, 130.0], &config, 60.0);
        assert_relative_eq!(formula.unwrap(), kinematic.unwrap(), epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for config in MachineConfiguration::builtin() {
            for _ in 0..200 {
                let programmed = Vector3::new(
                    rng.gen_range(-500.0..500.0),
                    rng.gen_range(-400.0..400.0),
                    rng.gen_range(-300.0..300.0));
                let rotary = [rng.gen_range(-110.0..110.0), rng.gen_range(-360.0..360.0)];
                let tool_length = rng.gen_range(0.0..250.0);
                let compensated = compute_tcp_compensation(&programmed, &rotary, &config, tool_length).unwrap();
                let recovered = inverse_tcp_compensation(&compensated, &rotary, &config, tool_length).unwrap();
                assert!((recovered - programmed).norm() < 1e-6,
                        "{}: {:?} -> {:?}", config.name, programmed, recovered);
            }
        }
    }

    #[test]
    fn test_rotary_count_checked() {
        let config = MachineConfiguration::head_head_bc();
        let result = compute_tcp_compensation(&Vector3::zeros(), &[30.0], &config, 100.0);
        assert_eq!(result, Err(KinematicsError::DimensionMismatch { expected: 2, found: 1 }));
    }

    #[test]
    fn test_compensate_toolpath() {
        let config = MachineConfiguration::head_head_bc();
        let path = Toolpath::new(vec![
            ToolpathPoint::rapid(Vector3::new(0.0, 0.0, 50.0), vec![0.0, 0.0]),
            ToolpathPoint::new(Vector3::new(100.0, 50.0, 0.0), vec![30.0, 45.0], 800.0),
        ]);
        let compensated = compensate_toolpath(&config, &path, 100.0).unwrap();
        assert_eq!(compensated.len(), 2);
        assert_relative_eq!(compensated.points[0].linear, Vector3::new(0.0, 0.0, 50.0), epsilon = 1e-9);
        assert!(compensated.points[0].is_rapid());
        assert_eq!(compensated.points[1].rotary, vec![30.0, 45.0]);
        assert_eq!(compensated.points[1].feed, 800.0);
        // Input untouched
        assert_eq!(path.points[1].linear, Vector3::new(100.0, 50.0, 0.0));
    }
}
