//! Singularity analysis: conditioning of the Jacobian and proximity of the rotary
//! axes to their critical angles.

use rayon::prelude::*;
use crate::jacobian::Jacobian;
use crate::kinematics_error::KinematicsError;
use crate::parameters::cnc_kinematics::{MachineAxis, MachineConfiguration};
use crate::toolpath::Toolpath;
use crate::utils::angle_difference;

/// Smallest singular value still considered nonzero.
pub const SINGULAR_VALUE_EPSILON: f64 = 1e-9;

/// Limits of the singularity checks. The defaults are empirical; correct values
/// depend on the machine and can be tuned in the settings file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingularityThresholds {
    /// Condition number above which the configuration is near-singular.
    pub condition_number: f64,

    /// Distance (degrees) to a critical angle classified as critical.
    pub critical: f64,

    /// Distance (degrees) to a critical angle classified as warning.
    pub warning: f64,

    /// Distance (degrees) to a critical angle classified as caution.
    pub caution: f64,
}

impl Default for SingularityThresholds {
    fn default() -> Self {
        SingularityThresholds {
            condition_number: 50.0,
            critical: 1.0,
            warning: 3.0,
            caution: 5.0,
        }
    }
}

impl SingularityThresholds {
    /// Severity of being `distance` degrees away from a critical angle, None if far enough.
    pub fn classify(&self, distance: f64) -> Option<Severity> {
        if distance < self.critical {
            Some(Severity::Critical)
        } else if distance < self.warning {
            Some(Severity::Warning)
        } else if distance < self.caution {
            Some(Severity::Caution)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Warning,
    Caution,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Caution => "caution",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conditioning of the Jacobian at one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SingularityReport {
    /// Singular values, largest first
    pub singular_values: Vec<f64>,

    /// Largest over smallest singular value, infinite if the smallest vanishes
    pub condition_number: f64,

    /// Product of the singular values
    pub manipulability: f64,

    pub near_singular: bool,
}

/// Computes the singular values of the RTCP compensated tool axis task matrix and
/// derives the condition number and manipulability. `threshold` is the condition
/// number above which the configuration is reported as near-singular.
pub fn detect_singularity(jacobian: &Jacobian, threshold: f64) -> SingularityReport {
    let task = jacobian.compensated_tool_axis_matrix();
    let mut singular_values: Vec<f64> = task.svd(false, false).singular_values.iter().copied().collect();
    singular_values.sort_by(|a, b| b.total_cmp(a));

    let sigma_max = singular_values.first().copied().unwrap_or(0.0);
    let sigma_min = singular_values.last().copied().unwrap_or(0.0);
    let manipulability: f64 = singular_values.iter().product();

    if sigma_min < SINGULAR_VALUE_EPSILON {
        return SingularityReport {
            singular_values,
            condition_number: f64::INFINITY,
            manipulability,
            near_singular: true,
        };
    }

    let condition_number = sigma_max / sigma_min;
    SingularityReport {
        singular_values,
        condition_number,
        manipulability,
        near_singular: condition_number > threshold,
    }
}

/// One rotary axis found close to one of its critical angles.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSingularity {
    pub axis: MachineAxis,

    /// Axis value, degrees
    pub value: f64,

    /// Critical angle approached, degrees
    pub critical_angle: f64,

    /// Angular distance to the critical angle modulo 360, degrees
    pub distance: f64,

    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSingularityCheck {
    pub has_singularity: bool,
    pub singularities: Vec<AxisSingularity>,
}

impl ConfigSingularityCheck {
    /// The most severe finding, if any.
    pub fn worst(&self) -> Option<&AxisSingularity> {
        self.singularities.iter()
            .min_by(|a, b| a.severity.cmp(&b.severity).then(a.distance.total_cmp(&b.distance)))
    }
}

/// Checks joint values (mm, degrees) directly against the registered critical angles.
/// No matrix is involved, so this is cheap enough to run for every toolpath point.
pub fn check_config_singularities(
    config: &MachineConfiguration,
    joints: &[f64],
    thresholds: &SingularityThresholds,
) -> Result<ConfigSingularityCheck, KinematicsError> {
    config.check_dimension(joints.len())?;
    let mut singularities = Vec::new();
    for critical in &config.critical_angles {
        let Some(index) = config.axis_index(critical.axis) else {
            continue;
        };
        let value = joints[index];
        let distance = angle_difference(value, critical.angle).abs();
        if let Some(severity) = thresholds.classify(distance) {
            singularities.push(AxisSingularity {
                axis: critical.axis,
                value,
                critical_angle: critical.angle,
                distance,
                severity,
            });
        }
    }
    Ok(ConfigSingularityCheck {
        has_singularity: !singularities.is_empty(),
        singularities,
    })
}

/// Contiguous run of toolpath points close to the same critical angle.
#[derive(Debug, Clone, PartialEq)]
pub struct SingularityZone {
    /// Index of the first point in the zone
    pub start: usize,

    /// Index of the last point in the zone (inclusive)
    pub end: usize,

    pub axis: MachineAxis,
    pub critical_angle: f64,

    /// Smallest distance to the critical angle over the zone, degrees
    pub min_distance: f64,

    pub severity: Severity,
}

impl SingularityZone {
    /// Number of toolpath points in the zone
    pub fn point_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

/// Classifies every point of the toolpath (in parallel) and groups consecutive
/// points with the same axis and severity into zones.
pub fn analyze_toolpath(
    config: &MachineConfiguration,
    toolpath: &Toolpath,
    thresholds: &SingularityThresholds,
) -> Result<Vec<SingularityZone>, KinematicsError> {
    let checks: Vec<ConfigSingularityCheck> = toolpath.points
        .par_iter()
        .map(|point| {
            let joints = config.joint_vector(&point.linear, &point.rotary)?;
            check_config_singularities(config, &joints, thresholds)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut zones: Vec<SingularityZone> = Vec::new();
    // Zones still growing, one per (axis, critical angle)
    let mut open: Vec<SingularityZone> = Vec::new();

    for (index, check) in checks.iter().enumerate() {
        let mut still_open = Vec::with_capacity(open.len());
        for mut zone in open.drain(..) {
            let continued = check.singularities.iter().find(|s| {
                s.axis == zone.axis && s.critical_angle == zone.critical_angle && s.severity == zone.severity
            });
            match continued {
                Some(found) => {
                    zone.end = index;
                    zone.min_distance = zone.min_distance.min(found.distance);
                    still_open.push(zone);
                }
                None => zones.push(zone),
            }
        }
        for found in &check.singularities {
            let already = still_open.iter().any(|z| {
                z.axis == found.axis && z.critical_angle == found.critical_angle && z.end == index
            });
            if !already {
                still_open.push(SingularityZone {
                    start: index,
                    end: index,
                    axis: found.axis,
                    critical_angle: found.critical_angle,
                    min_distance: found.distance,
                    severity: found.severity,
                });
            }
        }
        open = still_open;
    }
    zones.extend(open);
    zones.sort_by_key(|z| (z.start, z.axis));

    tracing::debug!(machine = %config.name, points = toolpath.points.len(), zones = zones.len(),
        "toolpath analyzed");
    Ok(zones)
}
