//! Hardcoded kinematic descriptions of a few common machine arrangements

pub mod cnc_kinematics {
    use std::f64::consts::FRAC_PI_2;
    use nalgebra::Vector3;
    use crate::parameters::cnc_kinematics::{ConfigurationFamily, CriticalAngle, DhParameters,
                                            JointDefinition, MachineAxis, MachineConfiguration,
                                            RtcpModel, TravelLimits};

    pub const HEAD_HEAD_BC: &str = "HEAD_HEAD_BC";
    pub const TABLE_TABLE_AC: &str = "TABLE_TABLE_AC";
    pub const TABLE_HEAD_BC: &str = "TABLE_HEAD_BC";

    /// Distance between the A trunnion axis and the C table surface, mm.
    pub const DEFAULT_PIVOT_DISTANCE: f64 = 50.0;

    fn x_travel() -> TravelLimits {
        TravelLimits::new(-1000.0, 1000.0)
    }

    fn y_travel() -> TravelLimits {
        TravelLimits::new(-800.0, 800.0)
    }

    fn z_travel() -> TravelLimits {
        TravelLimits::new(-600.0, 600.0)
    }

    fn tilt_travel() -> TravelLimits {
        TravelLimits::new(-110.0, 110.0)
    }

    impl MachineConfiguration {
        /// Gantry with a swivel head: the linear axes carry a C axis (about Z) that
        /// carries a B tilt. The tool vector is `(sin b sin c, sin b cos c, cos b)`.
        /// B = 0 aligns the tool with C and is singular.
        pub fn head_head_bc() -> Self {
            MachineConfiguration {
                name: HEAD_HEAD_BC.to_string(),
                family: ConfigurationFamily::HeadHeadBC,
                joints: vec![
                    JointDefinition::prismatic(MachineAxis::X, Vector3::x(), x_travel()),
                    JointDefinition::prismatic(MachineAxis::Y, Vector3::y(), y_travel()),
                    JointDefinition::prismatic(MachineAxis::Z, Vector3::z(), z_travel()),
                    JointDefinition::revolute(MachineAxis::C,
                                              DhParameters::new(0.0, -FRAC_PI_2, 0.0, -FRAC_PI_2),
                                              -1, TravelLimits::unlimited()),
                    JointDefinition::revolute(MachineAxis::B,
                                              DhParameters::new(0.0, FRAC_PI_2, 0.0, 0.0),
                                              -1, tilt_travel()),
                ],
                critical_angles: vec![CriticalAngle::new(MachineAxis::B, 0.0)],
                rtcp: RtcpModel::HeadTilt,
            }
        }

        /// Trunnion table: the chain starts at the workpiece, goes through the C table
        /// and the A trunnion to the machine frame and the linear axes. Poses are therefore
        /// expressed in the workpiece frame. The tool vector is `(sin a sin c, sin a cos c, cos a)`.
        pub fn table_table_ac() -> Self {
            Self::table_table_ac_with_pivot(DEFAULT_PIVOT_DISTANCE)
        }

        pub fn table_table_ac_with_pivot(pivot_distance: f64) -> Self {
            MachineConfiguration {
                name: TABLE_TABLE_AC.to_string(),
                family: ConfigurationFamily::TableTableAC,
                joints: vec![
                    JointDefinition::revolute(MachineAxis::C,
                                              DhParameters::new(0.0, -FRAC_PI_2, 0.0, -FRAC_PI_2),
                                              -1, TravelLimits::unlimited()),
                    JointDefinition::revolute(MachineAxis::A,
                                              DhParameters::new(0.0, FRAC_PI_2, 0.0, 0.0),
                                              -1, tilt_travel()),
                    // The frame after A is turned by -90 degrees about Z relative to the
                    // machine frame, so X and Y directions are swapped here.
                    JointDefinition::prismatic(MachineAxis::X, Vector3::y(), x_travel()),
                    JointDefinition::prismatic(MachineAxis::Y, -Vector3::x(), y_travel()),
                    JointDefinition::prismatic(MachineAxis::Z, Vector3::z(), z_travel()),
                ],
                critical_angles: vec![CriticalAngle::new(MachineAxis::A, 0.0)],
                rtcp: RtcpModel::TablePivot { pivot_distance },
            }
        }

        /// Hybrid: C rotary table under the linear axes, B tilting head at the end.
        /// No closed form; solved iteratively. The tool vector is
        /// `(sin b cos c, -sin b sin c, cos b)`.
        pub fn table_head_bc() -> Self {
            MachineConfiguration {
                name: TABLE_HEAD_BC.to_string(),
                family: ConfigurationFamily::TableHeadBC,
                joints: vec![
                    JointDefinition::revolute(MachineAxis::C,
                                              DhParameters::new(0.0, -FRAC_PI_2, 0.0, 0.0),
                                              -1, TravelLimits::unlimited()),
                    // Frame after C has its Z along the machine -Y
                    JointDefinition::prismatic(MachineAxis::X, Vector3::x(), x_travel()),
                    JointDefinition::prismatic(MachineAxis::Y, Vector3::z(), y_travel()),
                    JointDefinition::prismatic(MachineAxis::Z, -Vector3::y(), z_travel()),
                    JointDefinition::revolute(MachineAxis::B,
                                              DhParameters::new(0.0, FRAC_PI_2, 0.0, 0.0),
                                              1, tilt_travel()),
                ],
                critical_angles: vec![CriticalAngle::new(MachineAxis::B, 0.0)],
                rtcp: RtcpModel::Kinematic,
            }
        }

        /// All built-in configurations.
        pub fn builtin() -> Vec<Self> {
            vec![Self::head_head_bc(), Self::table_table_ac(), Self::table_head_bc()]
        }
    }

}
