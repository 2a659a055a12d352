//! Defines the machine configuration data structures

pub mod cnc_kinematics {
    use std::fmt;
    use std::str::FromStr;
    use nalgebra::Vector3;
    use crate::constraints::Constraints;
    use crate::kinematic_traits::JointVector;
    use crate::kinematics_error::KinematicsError;
    use crate::utils::deg;

    /// Machine axis letters. Linear axes X, Y, Z; rotary axes A, B, C rotate
    /// about X, Y and Z respectively. The derived ordering (X < Y < Z < A < B < C)
    /// defines the order of values in a joint vector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum MachineAxis {
        X,
        Y,
        Z,
        A,
        B,
        C,
    }

    impl MachineAxis {
        pub fn is_rotary(&self) -> bool {
            matches!(self, MachineAxis::A | MachineAxis::B | MachineAxis::C)
        }

        pub fn name(&self) -> &'static str {
            match self {
                MachineAxis::X => "X",
                MachineAxis::Y => "Y",
                MachineAxis::Z => "Z",
                MachineAxis::A => "A",
                MachineAxis::B => "B",
                MachineAxis::C => "C",
            }
        }
    }

    impl fmt::Display for MachineAxis {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl FromStr for MachineAxis {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_uppercase().as_str() {
                "X" => Ok(MachineAxis::X),
                "Y" => Ok(MachineAxis::Y),
                "Z" => Ok(MachineAxis::Z),
                "A" => Ok(MachineAxis::A),
                "B" => Ok(MachineAxis::B),
                "C" => Ok(MachineAxis::C),
                other => Err(format!("unknown machine axis '{}'", other)),
            }
        }
    }

    /// How the joint moves. Prismatic joints are pure translations along `direction`,
    /// given in the frame that precedes the joint. Revolute joints rotate about the Z axis
    /// of the preceding frame, following the Denavit-Hartenberg convention.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum JointType {
        Prismatic { direction: Vector3<f64> },
        Revolute,
    }

    /// Denavit-Hartenberg parameters of one link. Lengths in millimeters, angles in radians.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct DhParameters {
        /// Link length, translation along X of the rotated frame.
        pub a: f64,

        /// Link twist, rotation about X.
        pub alpha: f64,

        /// Link offset, translation along Z.
        pub d: f64,

        /// Added to the joint angle of revolute joints.
        pub theta_offset: f64,
    }

    impl DhParameters {
        pub fn new(a: f64, alpha: f64, d: f64, theta_offset: f64) -> Self {
            DhParameters { a, alpha, d, theta_offset }
        }

        pub fn zero() -> Self {
            Self::default()
        }
    }

    /// Travel range of the axis, in millimeters or degrees. Equal bounds mean
    /// that the axis is not limited (continuous rotary table).
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct TravelLimits {
        pub min: f64,
        pub max: f64,
    }

    impl TravelLimits {
        pub fn new(min: f64, max: f64) -> Self {
            TravelLimits { min, max }
        }

        pub fn unlimited() -> Self {
            TravelLimits { min: 0.0, max: 0.0 }
        }

        pub fn is_unlimited(&self) -> bool {
            self.min == self.max
        }
    }

    /// One joint (machine axis) of the kinematic chain.
    #[derive(Debug, Clone, PartialEq)]
    pub struct JointDefinition {
        pub axis: MachineAxis,
        pub joint_type: JointType,
        pub dh: DhParameters,

        /// Specifies the direction of positive motion. A value of `-1` reverses
        /// the geometric direction of the joint.
        pub sign_correction: i8,

        pub limits: TravelLimits,
    }

    impl JointDefinition {
        /// Linear axis moving along `direction` (unit vector in the preceding frame).
        pub fn prismatic(axis: MachineAxis, direction: Vector3<f64>, limits: TravelLimits) -> Self {
            JointDefinition {
                axis,
                joint_type: JointType::Prismatic { direction },
                dh: DhParameters::zero(),
                sign_correction: 1,
                limits,
            }
        }

        pub fn revolute(axis: MachineAxis, dh: DhParameters, sign_correction: i8, limits: TravelLimits) -> Self {
            JointDefinition {
                axis,
                joint_type: JointType::Revolute,
                dh,
                sign_correction,
                limits,
            }
        }

        pub fn is_prismatic(&self) -> bool {
            matches!(self.joint_type, JointType::Prismatic { .. })
        }
    }

    /// Rotary axis value where the machine loses a degree of freedom (e.g. B = 0 on a
    /// head-head BC machine, where the tool axis coincides with C).
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CriticalAngle {
        pub axis: MachineAxis,

        /// Degrees
        pub angle: f64,
    }

    impl CriticalAngle {
        pub fn new(axis: MachineAxis, angle: f64) -> Self {
            CriticalAngle { axis, angle }
        }
    }

    /// Arrangement of the rotary axes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ConfigurationFamily {
        /// Both rotary axes move the workpiece: A trunnion carrying a C rotary table.
        TableTableAC,

        /// Both rotary axes move the spindle head: C swivel carrying a B tilt.
        HeadHeadBC,

        /// C rotary table under a B tilting head.
        TableHeadBC,

        /// Any other chain, solved iteratively only.
        Custom,
    }

    impl ConfigurationFamily {
        /// The rotary axis that tilts the tool away from the Z direction.
        pub fn tilt_axis(&self) -> Option<MachineAxis> {
            match self {
                ConfigurationFamily::TableTableAC => Some(MachineAxis::A),
                ConfigurationFamily::HeadHeadBC | ConfigurationFamily::TableHeadBC => Some(MachineAxis::B),
                ConfigurationFamily::Custom => None,
            }
        }

        /// The rotary axis that turns the tilted tool around Z.
        pub fn rotation_axis(&self) -> Option<MachineAxis> {
            match self {
                ConfigurationFamily::Custom => None,
                _ => Some(MachineAxis::C),
            }
        }

        /// True if the tool vector is `(sin t sin r, sin t cos r, cos t)` for tilt `t`
        /// and rotation `r`, so the rotary angles can be recovered algebraically.
        pub fn has_closed_form(&self) -> bool {
            matches!(self, ConfigurationFamily::TableTableAC | ConfigurationFamily::HeadHeadBC)
        }

        pub fn name(&self) -> &'static str {
            match self {
                ConfigurationFamily::TableTableAC => "table_table_ac",
                ConfigurationFamily::HeadHeadBC => "head_head_bc",
                ConfigurationFamily::TableHeadBC => "table_head_bc",
                ConfigurationFamily::Custom => "custom",
            }
        }
    }

    impl FromStr for ConfigurationFamily {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "table_table_ac" => Ok(ConfigurationFamily::TableTableAC),
                "head_head_bc" => Ok(ConfigurationFamily::HeadHeadBC),
                "table_head_bc" => Ok(ConfigurationFamily::TableHeadBC),
                "custom" => Ok(ConfigurationFamily::Custom),
                other => Err(format!("unknown configuration family '{}'", other)),
            }
        }
    }

    /// Formula used to translate programmed tool tip coordinates into linear axis commands.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum RtcpModel {
        /// Head reorients the tool; linear axes follow the tool tip.
        HeadTilt,

        /// Table tilts the workpiece about a pivot `pivot_distance` mm from the rotary center.
        TablePivot { pivot_distance: f64 },

        /// Rigid-body solution on the DH chain, for hybrid arrangements.
        Kinematic,
    }

    /// Complete kinematic description of a machine. Created once (from code or from the
    /// configuration file) and never changed afterward.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MachineConfiguration {
        pub name: String,
        pub family: ConfigurationFamily,

        /// Joints in chain order, from the base (workpiece for table machines) to the tool.
        pub joints: Vec<JointDefinition>,

        pub critical_angles: Vec<CriticalAngle>,
        pub rtcp: RtcpModel,
    }

    impl MachineConfiguration {
        /// Creates the configuration, checking that it describes three linear axes X, Y, Z
        /// and one or two rotary axes.
        pub fn new(
            name: &str,
            family: ConfigurationFamily,
            joints: Vec<JointDefinition>,
            critical_angles: Vec<CriticalAngle>,
            rtcp: RtcpModel,
        ) -> Result<Self, KinematicsError> {
            let config = MachineConfiguration {
                name: name.to_string(),
                family,
                joints,
                critical_angles,
                rtcp,
            };
            config.validate()?;
            Ok(config)
        }

        fn validate(&self) -> Result<(), KinematicsError> {
            let invalid = |msg: String| -> Result<(), KinematicsError> {
                Err(KinematicsError::InvalidConfiguration(format!("{}: {}", self.name, msg)))
            };

            if self.name.trim().is_empty() {
                return invalid("name must not be empty".to_string());
            }

            for (i, joint) in self.joints.iter().enumerate() {
                if self.joints[..i].iter().any(|j| j.axis == joint.axis) {
                    return invalid(format!("axis {} appears twice", joint.axis));
                }
                if joint.sign_correction != 1 && joint.sign_correction != -1 {
                    return invalid(format!("sign correction of {} must be 1 or -1", joint.axis));
                }
                let dh = &joint.dh;
                if ![dh.a, dh.alpha, dh.d, dh.theta_offset].iter().all(|v| v.is_finite()) {
                    return invalid(format!("DH parameters of {} must be finite", joint.axis));
                }
                if !(joint.limits.min.is_finite() && joint.limits.max.is_finite())
                    || joint.limits.min > joint.limits.max {
                    return invalid(format!("travel limits of {} are not a valid range", joint.axis));
                }
                match joint.joint_type {
                    JointType::Prismatic { direction } => {
                        if joint.axis.is_rotary() {
                            return invalid(format!("rotary axis {} cannot be prismatic", joint.axis));
                        }
                        if (direction.norm() - 1.0).abs() > 1e-6 {
                            return invalid(format!("direction of {} must be a unit vector", joint.axis));
                        }
                        if dh.alpha != 0.0 || dh.theta_offset != 0.0 {
                            return invalid(format!("prismatic axis {} cannot carry DH rotation", joint.axis));
                        }
                    }
                    JointType::Revolute => {
                        if !joint.axis.is_rotary() {
                            return invalid(format!("linear axis {} cannot be revolute", joint.axis));
                        }
                    }
                }
            }

            for linear in [MachineAxis::X, MachineAxis::Y, MachineAxis::Z] {
                if !self.joints.iter().any(|j| j.axis == linear) {
                    return invalid(format!("linear axis {} is missing", linear));
                }
            }

            let rotary = self.rotary_axes();
            if rotary.is_empty() || rotary.len() > 2 {
                return invalid(format!("expected one or two rotary axes, found {}", rotary.len()));
            }

            for critical in &self.critical_angles {
                if !rotary.contains(&critical.axis) {
                    return invalid(format!("critical angle given for unconfigured axis {}", critical.axis));
                }
                if !critical.angle.is_finite() {
                    return invalid(format!("critical angle of {} must be finite", critical.axis));
                }
            }

            for axis in [self.family.tilt_axis(), self.family.rotation_axis()].into_iter().flatten() {
                if !rotary.contains(&axis) {
                    return invalid(format!("family {} requires rotary axis {}", self.family.name(), axis));
                }
            }
            Ok(())
        }

        /// Number of joints (length of the joint vector).
        pub fn dof(&self) -> usize {
            self.joints.len()
        }

        /// Rotary axes in joint vector order.
        pub fn rotary_axes(&self) -> Vec<MachineAxis> {
            let mut axes: Vec<MachineAxis> = self.joints.iter()
                .map(|j| j.axis)
                .filter(|a| a.is_rotary())
                .collect();
            axes.sort();
            axes
        }

        /// All axes in joint vector order.
        pub fn axes(&self) -> Vec<MachineAxis> {
            let mut axes: Vec<MachineAxis> = self.joints.iter().map(|j| j.axis).collect();
            axes.sort();
            axes
        }

        /// Position in the joint vector of the joint at `chain_index` in the chain.
        pub fn vector_index(&self, chain_index: usize) -> usize {
            let axis = self.joints[chain_index].axis;
            self.joints.iter().filter(|j| j.axis < axis).count()
        }

        /// Position of the axis in the joint vector.
        pub fn axis_index(&self, axis: MachineAxis) -> Option<usize> {
            self.axes().iter().position(|a| *a == axis)
        }

        /// Position of the rotary axis in a rotary angle list.
        pub fn rotary_index(&self, axis: MachineAxis) -> Option<usize> {
            self.rotary_axes().iter().position(|a| *a == axis)
        }

        pub fn joint(&self, axis: MachineAxis) -> Option<&JointDefinition> {
            self.joints.iter().find(|j| j.axis == axis)
        }

        pub fn critical_angles_for(&self, axis: MachineAxis) -> impl Iterator<Item = f64> + '_ {
            self.critical_angles.iter().filter(move |c| c.axis == axis).map(|c| c.angle)
        }

        pub fn check_dimension(&self, found: usize) -> Result<(), KinematicsError> {
            if found != self.dof() {
                return Err(KinematicsError::DimensionMismatch { expected: self.dof(), found });
            }
            Ok(())
        }

        /// Builds the joint vector (mm, degrees) from linear coordinates and rotary
        /// angles given in rotary axis order.
        pub fn joint_vector(&self, linear: &Vector3<f64>, rotary: &[f64]) -> Result<JointVector, KinematicsError> {
            let expected = self.dof() - 3;
            if rotary.len() != expected {
                return Err(KinematicsError::DimensionMismatch { expected, found: rotary.len() });
            }
            let mut joints = Vec::with_capacity(self.dof());
            joints.extend_from_slice(linear.as_slice());
            joints.extend_from_slice(rotary);
            Ok(joints)
        }

        /// Splits the joint vector into linear coordinates and rotary angles.
        pub fn split_joint_vector(&self, joints: &[f64]) -> Result<(Vector3<f64>, Vec<f64>), KinematicsError> {
            self.check_dimension(joints.len())?;
            Ok((Vector3::new(joints[0], joints[1], joints[2]), joints[3..].to_vec()))
        }

        /// Converts machine units (degrees for rotary axes) into internal units (radians).
        pub fn to_internal(&self, joints: &[f64]) -> Result<Vec<f64>, KinematicsError> {
            self.check_dimension(joints.len())?;
            let axes = self.axes();
            Ok(joints.iter().zip(axes.iter())
                .map(|(v, axis)| if axis.is_rotary() { v.to_radians() } else { *v })
                .collect())
        }

        /// Converts internal units (radians) into machine units (degrees for rotary axes).
        pub fn to_machine(&self, qs: &[f64]) -> Result<JointVector, KinematicsError> {
            self.check_dimension(qs.len())?;
            let axes = self.axes();
            Ok(qs.iter().zip(axes.iter())
                .map(|(v, axis)| if axis.is_rotary() { v.to_degrees() } else { *v })
                .collect())
        }

        /// Travel limits in joint vector order.
        pub fn constraints(&self) -> Constraints {
            let mut limits: Vec<(MachineAxis, TravelLimits)> = self.joints.iter()
                .map(|j| (j.axis, j.limits))
                .collect();
            limits.sort_by_key(|(axis, _)| *axis);
            Constraints::new(
                limits.iter().map(|(_, l)| l.min).collect(),
                limits.iter().map(|(_, l)| l.max).collect(),
                crate::constraints::BY_PREV,
            )
        }

        /// Convert to string yaml representation, as accepted by the configuration loader.
        pub fn to_yaml(&self) -> String {
            let mut out = format!("- name: {}\n  family: {}\n", self.name, self.family.name());
            match self.rtcp {
                RtcpModel::HeadTilt => out.push_str("  rtcp: head_tilt\n"),
                RtcpModel::Kinematic => out.push_str("  rtcp: kinematic\n"),
                RtcpModel::TablePivot { pivot_distance } =>
                    out.push_str(&format!("  rtcp: table_pivot\n  pivot_distance: {}\n", pivot_distance)),
            }
            out.push_str("  joints:\n");
            for joint in &self.joints {
                out.push_str(&format!("    - axis: {}\n", joint.axis));
                match joint.joint_type {
                    JointType::Prismatic { direction } => out.push_str(&format!(
                        "      type: prismatic\n      direction: [{}, {}, {}]\n",
                        direction.x, direction.y, direction.z)),
                    JointType::Revolute => out.push_str("      type: revolute\n"),
                }
                out.push_str(&format!(
                    "      dh: {{ a: {}, alpha: {}, d: {}, theta_offset: {} }}\n",
                    joint.dh.a, deg(&joint.dh.alpha), joint.dh.d, deg(&joint.dh.theta_offset)));
                out.push_str(&format!(
                    "      sign: {}\n      limits: [{}, {}]\n",
                    joint.sign_correction, joint.limits.min, joint.limits.max));
            }
            if self.critical_angles.is_empty() {
                out.push_str("  critical_angles: []\n");
            } else {
                out.push_str("  critical_angles:\n");
                for critical in &self.critical_angles {
                    out.push_str(&format!("    - {{ axis: {}, angle: {} }}\n", critical.axis, critical.angle));
                }
            }
            out
        }
    }
}
