//! Errors and warnings reported by the kinematic routines

use crate::parameters::cnc_kinematics::MachineAxis;

/// Failures of kinematic operations. Numerical problems are never swallowed:
/// every routine that can fail returns one of these to the caller, who decides
/// whether a single failing point aborts the whole toolpath.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Machine configuration with this name has not been registered.
    UnknownConfiguration(String),

    /// Configuration with this name is already present in the registry.
    DuplicateConfiguration(String),

    /// Joint vector (or rotary angle list) has the wrong number of values.
    DimensionMismatch { expected: usize, found: usize },

    /// No solution within travel limits and the iteration budget.
    IkUnreachable(String),

    /// The configuration violates the structural rules of the kinematic model.
    InvalidConfiguration(String),

    /// The tool vector is not a unit vector (norm given).
    InvalidToolVector(f64),
}

impl std::fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            KinematicsError::UnknownConfiguration(ref name) =>
                write!(f, "Unknown machine configuration: {}", name),
            KinematicsError::DuplicateConfiguration(ref name) =>
                write!(f, "Machine configuration already registered: {}", name),
            KinematicsError::DimensionMismatch { expected, found } =>
                write!(f, "Dimension mismatch: expected {} values, found {}", expected, found),
            KinematicsError::IkUnreachable(ref reason) =>
                write!(f, "Target unreachable: {}", reason),
            KinematicsError::InvalidConfiguration(ref reason) =>
                write!(f, "Invalid machine configuration: {}", reason),
            KinematicsError::InvalidToolVector(norm) =>
                write!(f, "Tool vector must have unit length, norm is {}", norm),
        }
    }
}

impl std::error::Error for KinematicsError {}

/// Conditions the inverse solver reports alongside a usable solution.
#[derive(Debug, Clone, PartialEq)]
pub enum IkWarning {
    /// Tool axis is aligned with the rotation axis (gimbal point), so the angle of
    /// `axis` is indeterminate. `fallback` (degrees) was used to keep the motion continuous.
    DegenerateOrientation { axis: MachineAxis, fallback: f64 },

    /// The closed form could not be used and the iterative solver produced the answer.
    ClosedFormRejected(String),
}

impl std::fmt::Display for IkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            IkWarning::DegenerateOrientation { axis, fallback } =>
                write!(f, "Degenerate orientation: {} indeterminate, kept at {:.4}", axis, fallback),
            IkWarning::ClosedFormRejected(ref reason) =>
                write!(f, "Closed form rejected: {}", reason),
        }
    }
}
