//! Geometric Jacobian of the machine chain
extern crate nalgebra as na;

use na::{DMatrix, DVector, Vector3, Vector6};
use na::linalg::SVD;
use crate::kinematic_traits::{tool_vector, JointFrame, Kinematics, Pose};
use crate::kinematics_error::KinematicsError;
use crate::kinematics_impl::chain_frames;
use crate::parameters::cnc_kinematics::MachineConfiguration;

/// Struct representing the Jacobian matrix
#[derive(Debug, Clone)]
pub struct Jacobian {
    /// A 6xN matrix, N being the number of joints.
    ///
    /// The Jacobian matrix maps the joint velocities (mm/s for linear axes, rad/s for rotary
    /// axes) to the velocities of the tool tip. Columns follow the joint vector order, rows
    /// are the linear velocity followed by the angular velocity.
    matrix: DMatrix<f64>,

    /// Columns that belong to linear axes
    prismatic: Vec<bool>,

    /// Tool axis at the configuration where the Jacobian was computed
    tool_axis: Vector3<f64>,
}

impl Jacobian {
    /// Computes the Jacobian for the given machine (possibly with a tool) and joint values
    /// in internal units (mm, radians).
    ///
    /// The chain is walked once; each column is built from the origin and motion axis
    /// of its joint, taken from the partial product up to that joint:
    /// revolute `[z × (p_tool - p); z]`, prismatic `[z; 0]`.
    pub fn new<K: Kinematics + ?Sized>(robot: &K, qs: &[f64]) -> Result<Self, KinematicsError> {
        let (frames, pose) = robot.forward_with_joint_frames(qs)?;
        Ok(Self::from_frames(&frames, &pose))
    }

    fn from_frames(frames: &[JointFrame], pose: &Pose) -> Self {
        let p_tool = pose.translation.vector;
        let n = frames.len();

        let mut matrix = DMatrix::zeros(6, n);
        let mut prismatic = vec![false; n];
        for frame in frames {
            let (linear, angular) = if frame.prismatic {
                (frame.axis, Vector3::zeros())
            } else {
                (frame.axis.cross(&(p_tool - frame.origin)), frame.axis)
            };
            matrix.fixed_view_mut::<3, 1>(0, frame.index).copy_from(&linear);
            matrix.fixed_view_mut::<3, 1>(3, frame.index).copy_from(&angular);
            prismatic[frame.index] = frame.prismatic;
        }

        Jacobian {
            matrix,
            prismatic,
            tool_axis: tool_vector(pose),
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn tool_axis(&self) -> Vector3<f64> {
        self.tool_axis
    }

    pub fn dof(&self) -> usize {
        self.matrix.ncols()
    }

    /// Task matrix of 5-axis machining: the linear velocity of the tool tip and the rate
    /// of change of the tool vector `ω × v`. Spinning about the tool axis does not count,
    /// so a five-axis machine has full rank 5 here away from singularities, while the
    /// plain 6xN Jacobian never has more than rank 5.
    pub fn tool_axis_matrix(&self) -> DMatrix<f64> {
        let mut task = DMatrix::zeros(6, self.dof());
        for j in 0..self.dof() {
            let linear: Vector3<f64> = self.matrix.fixed_view::<3, 1>(0, j).into_owned();
            let angular: Vector3<f64> = self.matrix.fixed_view::<3, 1>(3, j).into_owned();
            task.fixed_view_mut::<3, 1>(0, j).copy_from(&linear);
            task.fixed_view_mut::<3, 1>(3, j).copy_from(&angular.cross(&self.tool_axis));
        }
        task
    }

    /// Tool axis task matrix after the linear axes took over the displacement of the
    /// tool tip caused by the rotary axes (what RTCP does on the controller). Rotary
    /// columns keep only the tool vector rate, linear columns only the linear velocity.
    /// Conditioning of this matrix does not depend on where the tool is in the working
    /// area, nor on the unit mix of mm and radians.
    pub fn compensated_tool_axis_matrix(&self) -> DMatrix<f64> {
        let mut task = DMatrix::zeros(6, self.dof());
        for j in 0..self.dof() {
            if self.prismatic[j] {
                let linear: Vector3<f64> = self.matrix.fixed_view::<3, 1>(0, j).into_owned();
                task.fixed_view_mut::<3, 1>(0, j).copy_from(&linear);
            } else {
                let angular: Vector3<f64> = self.matrix.fixed_view::<3, 1>(3, j).into_owned();
                task.fixed_view_mut::<3, 1>(3, j).copy_from(&angular.cross(&self.tool_axis));
            }
        }
        task
    }

    /// Computes the joint velocities required to achieve a desired tool velocity
    ///
    /// # Arguments
    ///
    /// * `desired_velocity` - A 6D vector: linear velocity (mm/s) followed by angular velocity (rad/s)
    /// * `epsilon` - singular values below this are treated as zero
    ///
    /// # Returns
    ///
    /// Joint velocities in joint vector order, or an error message if the
    /// pseudoinverse cannot be computed.
    pub fn velocities_from_vector(&self, desired_velocity: &Vector6<f64>, epsilon: f64) -> Result<Vec<f64>, &'static str> {
        let svd = SVD::new(self.matrix.clone(), true, true);
        match svd.pseudo_inverse(epsilon) {
            Ok(pseudoinverse) => {
                let desired = DVector::from_column_slice(desired_velocity.as_slice());
                Ok((pseudoinverse * desired).iter().copied().collect())
            }
            Err(_) => Err("Unable to compute the pseudoinverse of the Jacobian matrix"),
        }
    }

    /// One damped least squares step on the tool axis task matrix:
    /// `Δθ = Jᵀ(JJᵀ + λI)⁻¹ Δx`, where `Δx` is the position error followed by the
    /// tool vector error.
    pub fn dls_step(&self, error: &Vector6<f64>, damping: f64) -> Option<DVector<f64>> {
        let task = self.tool_axis_matrix();
        let damped = &task * task.transpose() + DMatrix::<f64>::identity(6, 6) * damping;
        let inverse = damped.try_inverse()?;
        let error = DVector::from_column_slice(error.as_slice());
        Some(task.transpose() * inverse * error)
    }

    /// Rate of change of the tool vector `ω × v` per joint, 3xN. Linear axes do not
    /// turn the tool, their columns are zero.
    pub fn tool_vector_matrix(&self) -> DMatrix<f64> {
        let mut rates = DMatrix::zeros(3, self.dof());
        for j in 0..self.dof() {
            if !self.prismatic[j] {
                let angular: Vector3<f64> = self.matrix.fixed_view::<3, 1>(3, j).into_owned();
                rates.fixed_view_mut::<3, 1>(0, j).copy_from(&angular.cross(&self.tool_axis));
            }
        }
        rates
    }

    /// Damped least squares step on the tool vector error alone, `Δθ = (JᵀJ + λI)⁻¹ Jᵀ Δv`.
    /// Only rotary axes move. `JJᵀ` is always singular along the tool axis, so the
    /// joint space form is used.
    pub fn orientation_step(&self, error: &Vector3<f64>, damping: f64) -> Option<DVector<f64>> {
        let rates = self.tool_vector_matrix();
        let damped = rates.transpose() * &rates + DMatrix::<f64>::identity(self.dof(), self.dof()) * damping;
        let inverse = damped.try_inverse()?;
        let error = DVector::from_column_slice(error.as_slice());
        Some(inverse * rates.transpose() * error)
    }
}

/// Jacobian of the machine chain end (no tool) at joint values in machine units (mm, degrees).
pub fn compute_jacobian(config: &MachineConfiguration, joints: &[f64]) -> Result<Jacobian, KinematicsError> {
    let qs = config.to_internal(joints)?;
    let (frames, pose) = chain_frames(config, &qs)?;
    Ok(Jacobian::from_frames(&frames, &pose))
}
