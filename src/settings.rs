//! Tunable parameters of the kinematic routines, collected in one place so they can be
//! loaded together from the configuration file.

use crate::avoidance::AvoidanceOptions;
use crate::inverse::DlsConfig;
use crate::singularity::SingularityThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicsSettings {
    pub thresholds: SingularityThresholds,
    pub dls: DlsConfig,
    pub avoidance: AvoidanceOptions,
}

impl KinematicsSettings {
    /// Checks that the values are usable: positive tolerances, severity bands that
    /// widen from critical to caution, at least one iteration.
    pub fn validate(&self) -> Result<(), String> {
        let t = &self.thresholds;
        if !(t.critical > 0.0 && t.critical <= t.warning && t.warning <= t.caution) {
            return Err(format!(
                "singularity bands must satisfy 0 < critical <= warning <= caution, got {}, {}, {}",
                t.critical, t.warning, t.caution));
        }
        if !(t.condition_number > 1.0) {
            return Err(format!("condition number threshold must exceed 1, got {}", t.condition_number));
        }

        let d = &self.dls;
        if d.max_iterations == 0 {
            return Err("at least one iteration is required".to_string());
        }
        for (name, value) in [("tolerance", d.tolerance), ("damping", d.damping),
            ("singular_damping", d.singular_damping)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }

        let a = &self.avoidance;
        if !(a.margin_deg >= 0.0 && a.margin_deg.is_finite()) {
            return Err(format!("avoidance margin must not be negative, got {}", a.margin_deg));
        }
        if a.split_segments < 2 {
            return Err(format!("split_segments must be at least 2, got {}", a.split_segments));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = KinematicsSettings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.thresholds.critical, 1.0);
        assert_eq!(settings.dls.max_iterations, 50);
        assert_eq!(settings.avoidance.split_segments, 5);
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let mut settings = KinematicsSettings::default();
        settings.thresholds.warning = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_damping_rejected() {
        let mut settings = KinematicsSettings::default();
        settings.dls.damping = 0.0;
        assert!(settings.validate().unwrap_err().contains("damping"));
    }
}
