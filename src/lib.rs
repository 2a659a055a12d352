//! Rust implementation of the machine kinematics of 5-axis (and 4-axis) CNC machines:
//! three linear axes X, Y, Z plus one or two rotary axes A, B, C.
//!
//! The machine is described as a chain of Denavit-Hartenberg links, from the workpiece (table
//! machines) or the machine frame (head machines) to the spindle. On top of this chain the crate
//! provides the routines a CAM post-processor needs to turn a toolpath of tool tip positions and
//! tool vectors into machine axis commands.
//!
//! # Features
//!
//! - Forward kinematics in machine units (mm, degrees), with or without a tool of given length.
//! - Geometric Jacobian, singular value analysis and a cheap check of the rotary axes against
//!   their critical angles (B = 0 on a head-head machine, A = 0 on a trunnion table).
//! - Inverse kinematics: closed form for head-head BC and table-table AC machines, damped
//!   least squares for everything else and as a fallback. If the previous point of the toolpath
//!   is given, the solution closest to it is returned and rotary axes are unwound toward it.
//!   At the gimbal point the rotation axis keeps its previous value instead of jumping.
//! - RTCP compensation (tool center point management) for head, table and hybrid machines.
//! - Toolpath analysis for singular zones, and four strategies to steer the toolpath around them.
//! - Machine configurations and tuning parameters can be loaded from YAML (feature
//!   `allow_filesystem`, enabled by default).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nalgebra::Vector3;
//! use rs_cnc_kinematics::inverse::InverseKinematics;
//! use rs_cnc_kinematics::registry::ConfigurationRegistry;
//! use rs_cnc_kinematics::rtcp::compute_tcp_compensation;
//!
//! let registry = ConfigurationRegistry::with_builtin();
//! let machine = registry.get("HEAD_HEAD_BC").unwrap();
//!
//! // Compensated linear axes for B = 30, C = 45 and a 100 mm tool
//! let linear = compute_tcp_compensation(&Vector3::new(100.0, 50.0, 0.0), &[30.0, 45.0], &machine, 100.0)
//!     .unwrap();
//! assert!((linear.z - 100.0 * (1.0 - 30.0_f64.to_radians().cos())).abs() < 1e-6);
//!
//! // Joint values for a tilted tool
//! let ik = InverseKinematics::new(Arc::clone(&machine), 100.0);
//! let solution = ik.solve(&Vector3::new(10.0, 0.0, 0.0), &Vector3::new(0.0, 0.5, 0.75_f64.sqrt()), None)
//!     .unwrap();
//! assert!((solution.joints[3] - 30.0).abs() < 1e-6);
//! ```

pub mod parameters;
pub mod parameters_machines;
pub mod registry;

#[cfg(feature = "allow_filesystem")]
pub mod parameters_from_file;
#[cfg(feature = "allow_filesystem")]
pub mod parameter_error;

pub mod utils;
pub mod kinematic_traits;
pub mod kinematics_impl;
pub mod kinematics_error;

pub mod constraints;

pub mod tool;

pub mod jacobian;
pub mod singularity;

pub mod inverse;

pub mod toolpath;
pub mod rtcp;
pub mod avoidance;

pub mod settings;

#[cfg(test)]
mod tests;
