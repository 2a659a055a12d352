#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::inverse::{solve_ik_closed_form, InverseKinematics, SolutionProvenance};
    use crate::parameters::cnc_kinematics::MachineConfiguration;
    use crate::parameters_machines::cnc_kinematics::{HEAD_HEAD_BC, TABLE_HEAD_BC, TABLE_TABLE_AC};
    use crate::registry::ConfigurationRegistry;
    use crate::tests::test_utils::{assert_joints_close, random_joints, rng, tool_tip};

    const CASES: usize = 200;

    #[test]
    fn test_closed_form_recovers_joints() {
        let registry = ConfigurationRegistry::with_builtin();
        let mut rng = rng();
        for name in [HEAD_HEAD_BC, TABLE_TABLE_AC] {
            let config = registry.get(name).unwrap();
            for tool_length in [0.0, 120.0] {
                let ik = InverseKinematics::new(Arc::clone(&config), tool_length);
                for _ in 0..CASES {
                    let joints = random_joints(&mut rng, &config, 2.0);
                    let (tip, v) = tool_tip(&config, &joints, tool_length);
                    let solution = ik.solve(&tip, &v, Some(&joints)).unwrap_or_else(|e| {
                        panic!("{}: no solution for {:?}: {}", name, joints, e)
                    });
                    assert_eq!(solution.provenance, SolutionProvenance::ClosedForm);
                    assert_joints_close(&config, &joints, &solution.joints, 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_closed_form_recovers_joints_without_previous() {
        // Positive tilt away from the gimbal point: the primary branch is the answer
        let registry = ConfigurationRegistry::with_builtin();
        let mut rng = rng();
        for name in [HEAD_HEAD_BC, TABLE_TABLE_AC] {
            let config = registry.get(name).unwrap();
            let tilt_index = config.axis_index(config.family.tilt_axis().unwrap()).unwrap();
            for _ in 0..CASES {
                let mut joints = random_joints(&mut rng, &config, 2.0);
                joints[tilt_index] = joints[tilt_index].abs();
                let (tip, v) = tool_tip(&config, &joints, 0.0);
                let solution = solve_ik_closed_form(&tip, &v, &config, 0.0, None).unwrap_or_else(|e| {
                    panic!("{}: no solution for {:?}: {}", name, joints, e)
                });
                assert_joints_close(&config, &joints, &solution.joints, 1e-4);
            }
        }
    }

    #[test]
    fn test_hybrid_reaches_random_targets() {
        let registry = ConfigurationRegistry::with_builtin();
        let config = registry.get(TABLE_HEAD_BC).unwrap();
        let mut rng = rng();
        for tool_length in [0.0, 50.0] {
            let ik = InverseKinematics::new(Arc::clone(&config), tool_length);
            for _ in 0..CASES {
                let joints = random_joints(&mut rng, &config, 2.0);
                let (tip, v) = tool_tip(&config, &joints, tool_length);
                let solution = ik.solve(&tip, &v, None).unwrap_or_else(|e| {
                    panic!("tool {}: no solution for {:?}: {}", tool_length, joints, e)
                });
                assert!(!solution.is_closed_form());
                let (reached_tip, reached_v) = tool_tip(&config, &solution.joints, tool_length);
                assert!((reached_tip - tip).norm() < 1e-3, "tip {:?} vs {:?}", reached_tip, tip);
                assert!((reached_v - v).norm() < 1e-4, "vector {:?} vs {:?}", reached_v, v);
                assert!(config.constraints().compliant(&solution.joints));
            }
        }
    }

    #[test]
    fn test_solutions_reach_target() {
        // Without the previous point the other branch may be chosen; the pose must still match
        let registry = ConfigurationRegistry::with_builtin();
        let mut rng = rng();
        for name in registry.names() {
            let config = registry.get(name).unwrap();
            let ik = InverseKinematics::new(Arc::clone(&config), 80.0);
            for _ in 0..50 {
                let joints = random_joints(&mut rng, &config, 10.0);
                let (tip, v) = tool_tip(&config, &joints, 80.0);
                let solution = ik.solve(&tip, &v, None).unwrap_or_else(|e| {
                    panic!("{}: no solution for {:?}: {}", name, joints, e)
                });
                let (reached_tip, reached_v) = tool_tip(&config, &solution.joints, 80.0);
                assert!((reached_tip - tip).norm() < 1e-3, "{}: tip {:?} vs {:?}", name, reached_tip, tip);
                assert!((reached_v - v).norm() < 1e-4, "{}: vector {:?} vs {:?}", name, reached_v, v);
                assert!(config.constraints().compliant(&solution.joints));
            }
        }
    }

    #[test]
    fn test_hybrid_follows_toolpath() {
        // Continuing from the previous point converges near it, without branch jumps
        let registry = ConfigurationRegistry::with_builtin();
        let config = registry.get(TABLE_HEAD_BC).unwrap();
        let ik = InverseKinematics::new(Arc::clone(&config), 50.0);

        let mut previous = vec![100.0, -50.0, 20.0, 30.0, 10.0];
        for step in 1..=20 {
            let mut joints = previous.clone();
            joints[0] -= 2.0;
            joints[3] += 1.0;
            joints[4] += 3.0;
            let (tip, v) = tool_tip(&config, &joints, 50.0);
            let solution = ik.solve(&tip, &v, Some(&previous)).unwrap_or_else(|e| {
                panic!("step {}: {}", step, e)
            });
            assert!(!solution.is_closed_form());
            assert_joints_close(&config, &joints, &solution.joints, 0.05);
            previous = solution.joints;
        }
    }

    #[test]
    fn test_neutral_pose_everywhere() {
        for config in MachineConfiguration::builtin() {
            let config = Arc::new(config);
            let (tip, v) = tool_tip(&config, &[0.0; 5], 100.0);
            assert!((tip - nalgebra::Vector3::new(0.0, 0.0, 100.0)).norm() < 1e-9, "{}", config.name);
            assert!((v - nalgebra::Vector3::z()).norm() < 1e-12);
        }
    }
}
