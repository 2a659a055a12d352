//! Inverse kinematics.
//!
//! Solving runs in two stages. Configuration families where the tool vector is
//! `(sin t sin r, sin t cos r, cos t)` for tilt `t` and rotation `r` are solved in closed
//! form: only the rotary axes determine the tool orientation, so they are recovered from
//! the tool vector first and the linear axes then position the tool tip. If there is no
//! closed form, or its result is outside the travel limits, damped least squares
//! iterations take over. The [IkSolution] tells which stage produced the answer.
//!
//! Targets that cannot be reached are reported as [KinematicsError::IkUnreachable],
//! never clamped to the nearest limit.

use std::sync::Arc;
use nalgebra::{Vector3, Vector6};
use tracing::{debug, warn};
use crate::constraints::Constraints;
use crate::jacobian::Jacobian;
use crate::kinematic_traits::{check_tool_vector, tool_vector, JointVector, Kinematics};
use crate::kinematics_error::{IkWarning, KinematicsError};
use crate::kinematics_impl::{chain_forward, solve_linear_axes, MachineKinematics};
use crate::parameters::cnc_kinematics::{MachineConfiguration, TravelLimits};
use crate::registry::ConfigurationHandle;
use crate::singularity::{detect_singularity, SingularityThresholds};
use crate::tool::Tool;
use crate::utils::{is_valid, unwind_near};

/// Below this length of the (I, J) projection the rotation angle is indeterminate.
const DEGENERATE_TILT: f64 = 1e-9;

/// Closed form results must reproduce the target on the actual chain within this tolerance.
const CROSS_CHECK_TOLERANCE: f64 = 1e-6;

/// The tool vector stage aims this much below the task tolerance.
const ORIENTATION_REFINEMENT: f64 = 1e-3;

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e6;

/// Parameters of the damped least squares iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DlsConfig {
    pub max_iterations: usize,

    /// Convergence threshold on the norm of the task error (mm and tool vector components).
    pub tolerance: f64,

    /// Initial damping factor λ.
    pub damping: f64,

    /// Damping is kept at least this high while the Jacobian is near-singular.
    pub singular_damping: f64,
}

impl Default for DlsConfig {
    fn default() -> Self {
        DlsConfig {
            max_iterations: 50,
            tolerance: 1e-4,
            damping: 1e-3,
            singular_damping: 1e-2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionProvenance {
    ClosedForm,
    Iterative { iterations: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Joint values, machine units (mm, degrees), joint vector order.
    pub joints: JointVector,
    pub provenance: SolutionProvenance,
    pub warnings: Vec<IkWarning>,
}

impl IkSolution {
    pub fn is_closed_form(&self) -> bool {
        self.provenance == SolutionProvenance::ClosedForm
    }
}

/// Brings a rotary value to the equivalent angle (modulo 360) closest to `reference`,
/// preferring one within the travel limits.
fn fit_rotary(value: f64, limits: &TravelLimits, reference: f64) -> f64 {
    let near = unwind_near(value, reference);
    if limits.is_unlimited() {
        return near;
    }
    [near, near - 360.0, near + 360.0]
        .into_iter()
        .filter(|v| *v >= limits.min - 1e-9 && *v <= limits.max + 1e-9)
        .min_by(|a, b| (a - reference).abs().total_cmp(&(b - reference).abs()))
        .unwrap_or(near)
}

/// Unwinds all rotary values of the joint vector toward the previous point (or the
/// center of travel if there is no previous point).
fn fit_rotary_axes(joints: &mut [f64], constraints: &Constraints, previous: Option<&[f64]>) {
    let centers = constraints.centers();
    for i in 3..joints.len() {
        let reference = previous.map(|p| p[i]).unwrap_or(centers[i]);
        let limits = TravelLimits::new(constraints.from[i], constraints.to[i]);
        joints[i] = fit_rotary(joints[i], &limits, reference);
    }
}

/// Closed form inverse kinematics for head-head BC and table-table AC families.
///
/// `target_position` is the tool tip, `target_tool_vector` the unit tool axis (I, J, K),
/// both in the base frame of the chain (the workpiece frame for table machines).
/// `previous` (joint vector of the previous toolpath point, machine units) is used
/// to pick between the two branches `(t, r)` and `(-t, r + 180)`, to unwind the rotation
/// and as the rotation value when the tool is aligned with the rotation axis. Without it
/// the branch `t = acos(k)`, `r = atan2(i, j)` is returned, the other one only if the
/// first is outside the travel limits.
pub fn solve_ik_closed_form(
    target_position: &Vector3<f64>,
    target_tool_vector: &Vector3<f64>,
    config: &MachineConfiguration,
    tool_length: f64,
    previous: Option<&[f64]>,
) -> Result<IkSolution, KinematicsError> {
    check_tool_vector(target_tool_vector)?;
    if let Some(previous) = previous {
        config.check_dimension(previous.len())?;
    }
    if !config.family.has_closed_form() {
        return Err(KinematicsError::IkUnreachable(
            format!("no closed form for {} configurations", config.family.name())));
    }
    let (Some(tilt_axis), Some(rotation_axis)) = (config.family.tilt_axis(), config.family.rotation_axis()) else {
        return Err(KinematicsError::IkUnreachable(
            format!("no closed form for {} configurations", config.family.name())));
    };
    let (Some(tilt_index), Some(rotation_index)) = (config.axis_index(tilt_axis), config.axis_index(rotation_axis)) else {
        return Err(KinematicsError::InvalidConfiguration(
            format!("{}: rotary axes {} and {} required", config.name, tilt_axis, rotation_axis)));
    };

    let v = target_tool_vector.normalize();
    let mut warnings = Vec::new();

    let tilt = v.z.clamp(-1.0, 1.0).acos().to_degrees();
    let rotation = if v.x.hypot(v.y) < DEGENERATE_TILT {
        let fallback = previous.map(|p| p[rotation_index]).unwrap_or(0.0);
        warn!(machine = %config.name, axis = %rotation_axis, fallback,
            "tool axis aligned with rotation axis, angle indeterminate");
        warnings.push(IkWarning::DegenerateOrientation { axis: rotation_axis, fallback });
        fallback
    } else {
        v.x.atan2(v.y).to_degrees()
    };

    let constraints = config.constraints();
    let end_position = target_position - v * tool_length;

    let mut candidates: Vec<JointVector> = Vec::with_capacity(2);
    let mut mismatch = false;
    for (tilt, rotation) in [(tilt, rotation), (-tilt, rotation + 180.0)] {
        let mut joints = vec![0.0; config.dof()];
        joints[tilt_index] = tilt;
        joints[rotation_index] = rotation;
        fit_rotary_axes(&mut joints, &constraints, previous);

        let linear = solve_linear_axes(config, &joints, &end_position)?;
        joints[..3].copy_from_slice(linear.as_slice());

        // The family formula must agree with the chain, otherwise the answer is meaningless.
        let pose = chain_forward(config, &config.to_internal(&joints)?)?;
        let reached = tool_vector(&pose);
        let tip = pose.translation.vector + reached * tool_length;
        if (reached - v).norm() > CROSS_CHECK_TOLERANCE
            || (tip - target_position).norm() > CROSS_CHECK_TOLERANCE * (1.0 + target_position.norm()) {
            mismatch = true;
            continue;
        }
        candidates.push(joints);
    }

    if candidates.is_empty() && mismatch {
        return Err(KinematicsError::IkUnreachable(
            format!("{}: chain does not follow the {} tool vector formula", config.name, config.family.name())));
    }

    let mut compliant = constraints.filter(&candidates);
    if compliant.is_empty() {
        let axes = config.axes();
        let violated: Vec<&str> = candidates.iter()
            .flat_map(|c| constraints.violations(c))
            .map(|i| axes[i].name())
            .collect();
        return Err(KinematicsError::IkUnreachable(
            format!("closed form solutions violate travel limits of {:?}", violated)));
    }
    // Without a previous point the primary branch (acos k, atan2(i, j)) wins if it is
    // within limits; candidates are in branch order.
    if previous.is_some() {
        constraints.sort(&mut compliant, previous);
    }

    Ok(IkSolution {
        joints: compliant.swap_remove(0),
        provenance: SolutionProvenance::ClosedForm,
        warnings,
    })
}

/// Inverse kinematics of one machine with one tool. Holds the configuration handle,
/// so it is cheap to create per operation and can be shared between threads.
/// ```
/// use std::sync::Arc;
/// use nalgebra::Vector3;
/// use rs_cnc_kinematics::inverse::InverseKinematics;
/// use rs_cnc_kinematics::parameters::cnc_kinematics::MachineConfiguration;
///
/// let config = Arc::new(MachineConfiguration::head_head_bc());
/// let ik = InverseKinematics::new(config, 100.0);
/// let b = 30.0_f64.to_radians();
/// let c = 45.0_f64.to_radians();
/// let tool_vector = Vector3::new(b.sin() * c.sin(), b.sin() * c.cos(), b.cos());
/// let solution = ik.solve(&Vector3::new(100.0, 50.0, 0.0), &tool_vector, None).unwrap();
/// assert!(solution.is_closed_form());
/// assert!((solution.joints[3] - 30.0).abs() < 1e-9);
/// assert!((solution.joints[4] - 45.0).abs() < 1e-9);
/// ```
#[derive(Clone)]
pub struct InverseKinematics {
    configuration: ConfigurationHandle,

    /// Machine chain extended by the tool
    machine: Tool,

    dls: DlsConfig,
    thresholds: SingularityThresholds,
}

impl InverseKinematics {
    pub fn new(configuration: ConfigurationHandle, tool_length: f64) -> Self {
        Self::with_settings(configuration, tool_length, DlsConfig::default(), SingularityThresholds::default())
    }

    pub fn with_settings(
        configuration: ConfigurationHandle,
        tool_length: f64,
        dls: DlsConfig,
        thresholds: SingularityThresholds,
    ) -> Self {
        let machine = MachineKinematics::new_with_thresholds(configuration.clone(), thresholds);
        InverseKinematics {
            configuration,
            machine: Tool::new(Arc::new(machine), tool_length),
            dls,
            thresholds,
        }
    }

    pub fn configuration(&self) -> &MachineConfiguration {
        &self.configuration
    }

    pub fn tool_length(&self) -> f64 {
        self.machine.tool_length
    }

    /// Closed form first if the family has one, damped least squares otherwise or if the
    /// closed form result is not usable. The reason for the fallback is kept as a warning.
    pub fn solve(
        &self,
        target_position: &Vector3<f64>,
        target_tool_vector: &Vector3<f64>,
        previous: Option<&[f64]>,
    ) -> Result<IkSolution, KinematicsError> {
        check_tool_vector(target_tool_vector)?;
        if let Some(previous) = previous {
            self.configuration.check_dimension(previous.len())?;
        }

        let mut warnings = Vec::new();
        match solve_ik_closed_form(target_position, target_tool_vector, &self.configuration,
                                   self.tool_length(), previous) {
            Ok(solution) => return Ok(solution),
            Err(e) => {
                debug!(machine = %self.configuration.name, reason = %e, "closed form rejected, iterating");
                warnings.push(IkWarning::ClosedFormRejected(e.to_string()));
            }
        }

        let mut solution = self.solve_iterative(target_position, target_tool_vector, previous)?;
        warnings.append(&mut solution.warnings);
        solution.warnings = warnings;
        Ok(solution)
    }

    /// Damped least squares only. Tries the seeds one after another and returns the first
    /// converged solution within travel limits.
    pub fn solve_iterative(
        &self,
        target_position: &Vector3<f64>,
        target_tool_vector: &Vector3<f64>,
        previous: Option<&[f64]>,
    ) -> Result<IkSolution, KinematicsError> {
        check_tool_vector(target_tool_vector)?;
        let config = &self.configuration;
        if let Some(previous) = previous {
            config.check_dimension(previous.len())?;
        }
        let constraints = config.constraints();
        let v = target_tool_vector.normalize();
        let axes = config.axes();

        let mut reason = String::from("did not converge");
        for seed in self.seeds(&constraints, previous) {
            let qs = config.to_internal(&seed)?;
            let Some((qs, iterations)) = self.iterate(qs, target_position, &v)? else {
                continue;
            };
            let mut joints = config.to_machine(&qs)?;
            fit_rotary_axes(&mut joints, &constraints, previous);
            if constraints.compliant(&joints) {
                debug!(machine = %config.name, iterations, "iterative solution found");
                return Ok(IkSolution {
                    joints,
                    provenance: SolutionProvenance::Iterative { iterations },
                    warnings: Vec::new(),
                });
            }
            let violated: Vec<&str> = constraints.violations(&joints).iter().map(|&i| axes[i].name()).collect();
            reason = format!("converged outside travel limits of {:?}", violated);
        }
        Err(KinematicsError::IkUnreachable(format!(
            "{}: {} within {} iterations", config.name, reason, self.dls.max_iterations)))
    }

    /// Previous point, center of travel, zero, then the center with the rotary axes
    /// turned 45 degrees either way.
    fn seeds(&self, constraints: &Constraints, previous: Option<&[f64]>) -> Vec<JointVector> {
        let dof = self.configuration.dof();
        let centers = constraints.centers();
        let mut seeds: Vec<JointVector> = Vec::new();
        if let Some(previous) = previous {
            seeds.push(previous.to_vec());
        }
        seeds.push(centers.clone());
        seeds.push(vec![0.0; dof]);

        let rotary = dof - 3;
        for mask in 0..(1usize << rotary) {
            let mut seed = centers.clone();
            for bit in 0..rotary {
                seed[3 + bit] += if mask & (1 << bit) == 0 { 45.0 } else { -45.0 };
            }
            seeds.push(seed);
        }
        seeds.dedup();
        seeds
    }

    /// Difference between the target and the tool tip: position (mm) followed by the tool vector.
    fn task_error(&self, qs: &[f64], target_position: &Vector3<f64>, v: &Vector3<f64>)
                  -> Result<Vector6<f64>, KinematicsError> {
        let pose = self.machine.forward(qs)?;
        let dp = target_position - pose.translation.vector;
        let dv = v - tool_vector(&pose);
        Ok(Vector6::new(dp.x, dp.y, dp.z, dv.x, dv.y, dv.z))
    }

    /// Linear axes do not turn the tool, so the rotary axes are found from the tool vector
    /// alone, then the linear axes are solved directly for the tool tip. Iterations on the
    /// full task only polish what is left. Each stage has the full iteration budget.
    fn iterate(&self, qs: Vec<f64>, target_position: &Vector3<f64>, v: &Vector3<f64>)
               -> Result<Option<(Vec<f64>, usize)>, KinematicsError> {
        let Some((qs, oriented)) = self.orient(qs, v)? else {
            return Ok(None);
        };
        let qs = self.place(qs, target_position)?;
        Ok(self.refine(qs, target_position, v)?.map(|(qs, polished)| (qs, oriented + polished)))
    }

    /// Levenberg-Marquardt on the tool vector error, moving the rotary axes only.
    /// Runs past the tolerance toward `tolerance * ORIENTATION_REFINEMENT` so that the
    /// lever arm of a rotary table does not magnify the residual into the linear axes.
    fn orient(&self, mut qs: Vec<f64>, v: &Vector3<f64>) -> Result<Option<(Vec<f64>, usize)>, KinematicsError> {
        let goal = self.dls.tolerance * ORIENTATION_REFINEMENT;
        let mut damping = self.dls.damping;
        let mut error = v - tool_vector(&self.machine.forward(&qs)?);

        let mut iterations = 0;
        while iterations < self.dls.max_iterations && error.norm() >= goal {
            iterations += 1;
            let jacobian = Jacobian::new(&self.machine, &qs)?;
            let Some(step) = jacobian.orientation_step(&error, damping) else {
                damping = (damping * 10.0).min(MAX_DAMPING);
                continue;
            };
            let candidate: Vec<f64> = qs.iter().zip(step.iter()).map(|(q, dq)| q + dq).collect();
            if !is_valid(&candidate) {
                damping = (damping * 10.0).min(MAX_DAMPING);
                continue;
            }
            let candidate_error = v - tool_vector(&self.machine.forward(&candidate)?);
            if candidate_error.norm() < error.norm() {
                qs = candidate;
                error = candidate_error;
                damping = (damping / 10.0).max(MIN_DAMPING);
            } else {
                damping = (damping * 10.0).min(MAX_DAMPING);
            }
        }

        if error.norm() < self.dls.tolerance {
            Ok(Some((qs, iterations)))
        } else {
            Ok(None)
        }
    }

    /// Linear axes that put the tool tip on the target for the rotary values in `qs`.
    fn place(&self, qs: Vec<f64>, target_position: &Vector3<f64>) -> Result<Vec<f64>, KinematicsError> {
        let config = &self.configuration;
        let reached = tool_vector(&chain_forward(config, &qs)?);
        let end_position = target_position - reached * self.tool_length();
        let mut joints = config.to_machine(&qs)?;
        let linear = solve_linear_axes(config, &joints, &end_position)?;
        joints[..3].copy_from_slice(linear.as_slice());
        config.to_internal(&joints)
    }

    /// Levenberg-Marquardt iterations on the full task from `qs` (internal units). Returns
    /// the joint values and the number of iterations if converged.
    fn refine(&self, mut qs: Vec<f64>, target_position: &Vector3<f64>, v: &Vector3<f64>)
              -> Result<Option<(Vec<f64>, usize)>, KinematicsError> {
        let mut damping = self.dls.damping;
        let mut error = self.task_error(&qs, target_position, v)?;

        for iteration in 0..self.dls.max_iterations {
            if error.norm() < self.dls.tolerance {
                return Ok(Some((qs, iteration)));
            }
            let jacobian = Jacobian::new(&self.machine, &qs)?;
            if detect_singularity(&jacobian, self.thresholds.condition_number).near_singular {
                damping = damping.max(self.dls.singular_damping);
            }
            let Some(step) = jacobian.dls_step(&error, damping) else {
                damping = (damping * 10.0).min(MAX_DAMPING);
                continue;
            };

            let candidate: Vec<f64> = qs.iter().zip(step.iter()).map(|(q, dq)| q + dq).collect();
            if !is_valid(&candidate) {
                damping = (damping * 10.0).min(MAX_DAMPING);
                continue;
            }
            let candidate_error = self.task_error(&candidate, target_position, v)?;
            if candidate_error.norm() < error.norm() {
                qs = candidate;
                error = candidate_error;
                damping = (damping / 10.0).max(MIN_DAMPING);
            } else {
                damping = (damping * 10.0).min(MAX_DAMPING);
            }
        }

        if error.norm() < self.dls.tolerance {
            Ok(Some((qs, self.dls.max_iterations)))
        } else {
            Ok(None)
        }
    }
}
