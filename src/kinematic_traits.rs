extern crate nalgebra as na;

use na::{Isometry3, Vector3};
use crate::kinematics_error::KinematicsError;
use crate::singularity::ConfigSingularityCheck;

/// Pose is used a pose of the tool. It contains both Cartesian position (mm) and
/// rotation quaternion. The tool axis vector (I, J, K) is the Z axis of the rotation.
/// ```
/// extern crate nalgebra as na;
/// use na::{Isometry3, Translation3, UnitQuaternion, Vector3};
///
/// type Pose = Isometry3<f64>;
///
/// let translation = Translation3::new(100.0, 50.0, 0.0);
/// let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5);
/// let pose = Pose::from_parts(translation, rotation);
/// let tool_vector = pose.rotation * Vector3::z();
/// assert!((tool_vector.norm() - 1.0).abs() < 1e-12);
/// ```
pub type Pose = Isometry3<f64>;

/// Joint values in joint vector order: X, Y, Z, then the rotary axes in A, B, C order.
/// Machine units (mm and degrees) at the public boundary; the [Kinematics] trait uses
/// the same order with rotary values in radians.
pub type JointVector = Vec<f64>;

/// Tolerance for the tool vector to be considered unit length.
pub const UNIT_VECTOR_TOLERANCE: f64 = 1e-6;

/// Location and motion axis of one joint in the base frame, as needed for the
/// geometric Jacobian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrame {
    /// Origin of the frame the joint moves in.
    pub origin: Vector3<f64>,

    /// Unit motion axis, sign correction applied. Rotation axis for revolute joints,
    /// translation direction for prismatic joints.
    pub axis: Vector3<f64>,

    pub prismatic: bool,

    /// Position of the joint in the joint vector.
    pub index: usize,
}

pub trait Kinematics: Send + Sync {
    /// Pose of the end of the chain for the given joint values (mm, radians).
    fn forward(&self, qs: &[f64]) -> Result<Pose, KinematicsError>;

    /// As [Kinematics::forward], also returning the frames of all joints (in chain order),
    /// computed in the same pass over the chain.
    fn forward_with_joint_frames(&self, qs: &[f64]) -> Result<(Vec<JointFrame>, Pose), KinematicsError>;

    /// Checks the joint values (mm, radians) against the registered critical angles.
    fn kinematic_singularity(&self, qs: &[f64]) -> Result<ConfigSingularityCheck, KinematicsError>;

    /// Number of joints
    fn dof(&self) -> usize;
}

/// Tool axis vector (I, J, K) of the pose.
pub fn tool_vector(pose: &Pose) -> Vector3<f64> {
    pose.rotation * Vector3::z()
}

/// Checks that the vector can be used as tool axis.
pub fn check_tool_vector(v: &Vector3<f64>) -> Result<(), KinematicsError> {
    let norm = v.norm();
    if !norm.is_finite() || (norm - 1.0).abs() > UNIT_VECTOR_TOLERANCE {
        return Err(KinematicsError::InvalidToolVector(norm));
    }
    Ok(())
}
