//! Forward kinematics of the machine chain, composed from Denavit-Hartenberg transforms.

use std::sync::Arc;
use nalgebra::{Isometry3, Matrix3, Vector3};
use crate::kinematic_traits::{JointFrame, Kinematics, Pose};
use crate::kinematics_error::KinematicsError;
use crate::parameters::cnc_kinematics::{JointDefinition, JointType, MachineConfiguration};
use crate::singularity::{check_config_singularities, ConfigSingularityCheck, SingularityThresholds};

/// Kinematics of the bare machine chain: the pose returned is the end of the chain
/// (spindle gauge point), without a tool. Wrap into [crate::tool::Tool] to get the tool tip.
#[derive(Debug, Clone)]
pub struct MachineKinematics {
    configuration: Arc<MachineConfiguration>,
    thresholds: SingularityThresholds,
}

impl MachineKinematics {
    /// Creates a new `MachineKinematics` instance for the given configuration.
    pub fn new(configuration: Arc<MachineConfiguration>) -> Self {
        MachineKinematics {
            configuration,
            thresholds: SingularityThresholds::default(),
        }
    }

    /// Uses the given thresholds when checking joint values against critical angles.
    pub fn new_with_thresholds(configuration: Arc<MachineConfiguration>, thresholds: SingularityThresholds) -> Self {
        MachineKinematics { configuration, thresholds }
    }

    pub fn configuration(&self) -> &MachineConfiguration {
        &self.configuration
    }
}

impl Kinematics for MachineKinematics {
    fn forward(&self, qs: &[f64]) -> Result<Pose, KinematicsError> {
        chain_forward(&self.configuration, qs)
    }

    fn forward_with_joint_frames(&self, qs: &[f64]) -> Result<(Vec<JointFrame>, Pose), KinematicsError> {
        chain_frames(&self.configuration, qs)
    }

    fn kinematic_singularity(&self, qs: &[f64]) -> Result<ConfigSingularityCheck, KinematicsError> {
        let joints = self.configuration.to_machine(qs)?;
        check_config_singularities(&self.configuration, &joints, &self.thresholds)
    }

    fn dof(&self) -> usize {
        self.configuration.dof()
    }
}

/// Forward kinematics at the public boundary: joint values in machine units
/// (mm, degrees), returns the pose of the end of the chain.
pub fn forward_kinematics(config: &MachineConfiguration, joints: &[f64]) -> Result<Pose, KinematicsError> {
    let qs = config.to_internal(joints)?;
    chain_forward(config, &qs)
}

/// Standard DH link transform: rotate about Z by theta, translate along Z by d,
/// translate along X by a, rotate about X by alpha.
pub fn dh_transform(a: f64, alpha: f64, d: f64, theta: f64) -> Isometry3<f64> {
    Isometry3::rotation(Vector3::z() * theta)
        * Isometry3::translation(a, 0.0, d)
        * Isometry3::rotation(Vector3::x() * alpha)
}

/// Transform contributed by the joint at value `q` (mm or radians, before sign correction).
pub fn joint_transform(joint: &JointDefinition, q: f64) -> Isometry3<f64> {
    let dh = &joint.dh;
    let q = q * joint.sign_correction as f64;
    match joint.joint_type {
        JointType::Prismatic { direction } => Isometry3::translation(
            dh.a + direction.x * q,
            direction.y * q,
            dh.d + direction.z * q,
        ),
        JointType::Revolute => dh_transform(dh.a, dh.alpha, dh.d, dh.theta_offset + q),
    }
}

/// Multiplies the chain base to tool. Joint values (mm, radians) in joint vector order.
pub fn chain_forward(config: &MachineConfiguration, qs: &[f64]) -> Result<Pose, KinematicsError> {
    config.check_dimension(qs.len())?;
    let mut transform = Isometry3::identity();
    for (chain_index, joint) in config.joints.iter().enumerate() {
        transform *= joint_transform(joint, qs[config.vector_index(chain_index)]);
    }
    Ok(transform)
}

/// Same as [chain_forward], also collecting the frame of each joint while walking
/// the chain so that the Jacobian reuses the intermediate transforms.
pub fn chain_frames(config: &MachineConfiguration, qs: &[f64]) -> Result<(Vec<JointFrame>, Pose), KinematicsError> {
    config.check_dimension(qs.len())?;
    let mut transform = Isometry3::identity();
    let mut frames = Vec::with_capacity(config.dof());

    for (chain_index, joint) in config.joints.iter().enumerate() {
        let index = config.vector_index(chain_index);
        let sign = joint.sign_correction as f64;
        let (axis, prismatic) = match joint.joint_type {
            JointType::Prismatic { direction } => (transform.rotation * direction * sign, true),
            JointType::Revolute => (transform.rotation * Vector3::z() * sign, false),
        };
        frames.push(JointFrame {
            origin: transform.translation.vector,
            axis,
            prismatic,
            index,
        });
        transform *= joint_transform(joint, qs[index]);
    }
    Ok((frames, transform))
}

/// For fixed rotary values, the position of the chain end is affine in the linear axes:
/// `p = p0 + M * (x, y, z)`. Returns `p0` and `M` (columns are the motion directions of
/// X, Y and Z in the base frame). Joint values in machine units; linear values are ignored.
pub fn linear_axis_map(config: &MachineConfiguration, joints: &[f64]) -> Result<(Vector3<f64>, Matrix3<f64>), KinematicsError> {
    let mut at_zero = config.to_internal(joints)?;
    at_zero[..3].fill(0.0);
    let (frames, pose) = chain_frames(config, &at_zero)?;
    let mut m = Matrix3::zeros();
    for frame in frames.iter().filter(|f| f.prismatic) {
        m.set_column(frame.index, &frame.axis);
    }
    Ok((pose.translation.vector, m))
}

/// Linear axis values that bring the chain end to `end_position` at the given rotary values.
pub fn solve_linear_axes(config: &MachineConfiguration, joints: &[f64], end_position: &Vector3<f64>)
                         -> Result<Vector3<f64>, KinematicsError> {
    let (p0, m) = linear_axis_map(config, joints)?;
    let inverse = m.try_inverse().ok_or_else(|| KinematicsError::InvalidConfiguration(
        format!("{}: linear axes are not independent", config.name)))?;
    Ok(inverse * (end_position - p0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use crate::kinematic_traits::tool_vector;
    use crate::parameters::cnc_kinematics::{ConfigurationFamily, CriticalAngle, DhParameters,
                                            MachineAxis, RtcpModel, TravelLimits};

    fn head_head_bc() -> MachineConfiguration {
        MachineConfiguration::head_head_bc()
    }

    #[test]
    fn test_dh_transform_pure_rotation() {
        let t = dh_transform(0.0, 0.0, 0.0, FRAC_PI_2);
        let x = t * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(x.coords, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_dh_transform_order() {
        // Translation along X happens after rotation about Z
        let t = dh_transform(10.0, FRAC_PI_2, 5.0, FRAC_PI_2);
        assert_relative_eq!(t.translation.vector, Vector3::new(0.0, 10.0, 5.0), epsilon = 1e-12);
        // Z axis turned by alpha about the rotated X axis (which is base Y)
        let z = t.rotation * Vector3::z();
        assert_relative_eq!(z, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_prismatic_is_pure_translation() {
        let joint = JointDefinition::prismatic(MachineAxis::Y, Vector3::new(0.0, 1.0, 0.0),
                                               TravelLimits::new(-100.0, 100.0));
        let t = joint_transform(&joint, 42.0);
        assert_relative_eq!(t.translation.vector, Vector3::new(0.0, 42.0, 0.0));
        assert_relative_eq!(t.rotation.angle(), 0.0);
    }

    #[test]
    fn test_neutral_pose() {
        let config = head_head_bc();
        let pose = forward_kinematics(&config, &[0.0; 5]).unwrap();
        assert_relative_eq!(tool_vector(&pose), Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(pose.translation.vector, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_neutral_pose_is_translation_composition() {
        // Same chain as HEAD_HEAD_BC, but with the C axis 150 mm above the Z slide and
        // a 20 mm offset of the linear axes.
        let base = head_head_bc();
        let mut joints = base.joints.clone();
        joints[2].dh = DhParameters::new(20.0, 0.0, 0.0, 0.0);
        joints[3].dh.d = 150.0;
        let config = MachineConfiguration::new(
            "OFFSET_BC", ConfigurationFamily::HeadHeadBC, joints,
            vec![CriticalAngle::new(MachineAxis::B, 0.0)], RtcpModel::HeadTilt).unwrap();

        let pose = forward_kinematics(&config, &[0.0; 5]).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(20.0, 0.0, 150.0), epsilon = 1e-12);
        assert_relative_eq!(tool_vector(&pose), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_head_head_tool_vector() {
        let config = head_head_bc();
        let (b, c) = (30.0_f64, 45.0_f64);
        let pose = forward_kinematics(&config, &[10.0, 20.0, 30.0, b, c]).unwrap();
        let (b, c) = (b.to_radians(), c.to_radians());
        let expected = Vector3::new(b.sin() * c.sin(), b.sin() * c.cos(), b.cos());
        assert_relative_eq!(tool_vector(&pose), expected, epsilon = 1e-12);
        // Rotary head without offsets does not move the gauge point
        assert_relative_eq!(pose.translation.vector, Vector3::new(10.0, 20.0, 30.0), epsilon = 1e-9);
    }

    #[test]
    fn test_table_table_tool_vector_in_workpiece() {
        let config = MachineConfiguration::table_table_ac();
        let (a, c) = (-40.0_f64, 120.0_f64);
        let pose = forward_kinematics(&config, &[0.0, 0.0, 0.0, a, c]).unwrap();
        let (a, c) = (a.to_radians(), c.to_radians());
        let expected = Vector3::new(a.sin() * c.sin(), a.sin() * c.cos(), a.cos());
        assert_relative_eq!(tool_vector(&pose), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_table_table_linear_axes_follow_table() {
        let config = MachineConfiguration::table_table_ac();
        // Table turned by C = 90: machine X moves along workpiece -Y
        let pose = forward_kinematics(&config, &[10.0, 0.0, 0.0, 0.0, 90.0]).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(0.0, -10.0, 0.0), epsilon = 1e-9);
        // At neutral, machine axes coincide with workpiece axes
        let pose = forward_kinematics(&config, &[10.0, 20.0, 30.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(10.0, 20.0, 30.0), epsilon = 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let config = head_head_bc();
        let result = forward_kinematics(&config, &[0.0; 4]);
        assert_eq!(result, Err(KinematicsError::DimensionMismatch { expected: 5, found: 4 }));
    }

    #[test]
    fn test_frames_match_forward() {
        let config = Arc::new(head_head_bc());
        let robot = MachineKinematics::new(config.clone());
        let qs = config.to_internal(&[5.0, -5.0, 12.0, 20.0, -70.0]).unwrap();
        let (frames, pose) = robot.forward_with_joint_frames(&qs).unwrap();
        let direct = robot.forward(&qs).unwrap();
        assert_eq!(frames.len(), 5);
        assert_relative_eq!(pose.translation.vector, direct.translation.vector, epsilon = 1e-12);
        // Linear axes first in the chain, along base X, Y, Z
        assert_relative_eq!(frames[0].axis, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(frames[1].axis, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(frames[2].axis, Vector3::z(), epsilon = 1e-12);
        // C axis rotates about -Z (sign correction), its vector index is 4
        assert_relative_eq!(frames[3].axis, -Vector3::z(), epsilon = 1e-12);
        assert_eq!(frames[3].index, 4);
        assert_eq!(frames[4].index, 3);
    }

    #[test]
    fn test_solve_linear_axes_reaches_target() {
        for config in MachineConfiguration::builtin() {
            let joints = [0.0, 0.0, 0.0, 25.0, -140.0];
            let target = Vector3::new(120.0, -35.0, 80.0);
            let linear = solve_linear_axes(&config, &joints, &target).unwrap();
            let solved = [linear.x, linear.y, linear.z, joints[3], joints[4]];
            let pose = forward_kinematics(&config, &solved).unwrap();
            assert_relative_eq!(pose.translation.vector, target, epsilon = 1e-9);
        }
    }
}
