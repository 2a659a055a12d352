//! Provides the tool for the machine.
//! The tool takes arbitrary implementation of Kinematics and is such an implementation
//! itself, so the forward kinematics of the machine with the tool returns the pose of
//! the tool tip rather than of the spindle gauge point:
//! ```
//! use std::sync::Arc;
//! use rs_cnc_kinematics::kinematic_traits::{tool_vector, Kinematics};
//! use rs_cnc_kinematics::kinematics_impl::MachineKinematics;
//! use rs_cnc_kinematics::parameters::cnc_kinematics::MachineConfiguration;
//! use rs_cnc_kinematics::tool::Tool;
//!
//! let config = Arc::new(MachineConfiguration::head_head_bc());
//! let machine = MachineKinematics::new(config.clone());
//!
//! // End mill sticking 100 mm out of the spindle
//! let milling = Tool::new(Arc::new(machine), 100.0);
//!
//! let qs = config.to_internal(&[0.0, 0.0, 0.0, 30.0, 45.0]).unwrap();
//! let tip = milling.forward(&qs).unwrap();
//! let gauge = milling.robot.forward(&qs).unwrap();
//! let offset = tip.translation.vector - gauge.translation.vector;
//! assert!((offset - 100.0 * tool_vector(&gauge)).norm() < 1e-9);
//! ```

extern crate nalgebra as na;

use std::sync::Arc;
use na::{Isometry3, Translation3};
use crate::kinematic_traits::{JointFrame, Kinematics, Pose};
use crate::kinematics_error::KinematicsError;
use crate::singularity::ConfigSingularityCheck;

/// Defines the fixed tool that is clamped into the spindle. The tool moves with the
/// machine chain, extending it by `tool_length` along the tool axis.
#[derive(Clone)]
pub struct Tool {
    pub robot: Arc<dyn Kinematics>,  // The machine

    /// Distance from the spindle gauge point to the tool tip, mm.
    pub tool_length: f64,
}

impl Tool {
    pub fn new(robot: Arc<dyn Kinematics>, tool_length: f64) -> Self {
        Tool { robot, tool_length }
    }

    /// Transformation from the end of the chain to the tool tip.
    pub fn transform(&self) -> Isometry3<f64> {
        Translation3::new(0.0, 0.0, self.tool_length).into()
    }
}

impl Kinematics for Tool {
    fn forward(&self, qs: &[f64]) -> Result<Pose, KinematicsError> {
        // Pose of the gauge point, extended by the tool
        let gauge = self.robot.forward(qs)?;
        Ok(gauge * self.transform())
    }

    fn forward_with_joint_frames(&self, qs: &[f64]) -> Result<(Vec<JointFrame>, Pose), KinematicsError> {
        let (frames, gauge) = self.robot.forward_with_joint_frames(qs)?;
        Ok((frames, gauge * self.transform()))
    }

    fn kinematic_singularity(&self, qs: &[f64]) -> Result<ConfigSingularityCheck, KinematicsError> {
        self.robot.kinematic_singularity(qs)
    }

    fn dof(&self) -> usize {
        self.robot.dof()
    }
}
