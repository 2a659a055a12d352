//! Supports reading machine configurations and settings from a YAML file (optional)
//!
//! The file lists the machines under `machines:` in the format produced by
//! [MachineConfiguration::to_yaml], and may carry a `settings:` section:
//! ```yaml
//! machines:
//! - name: MY_MILL
//!   family: head_head_bc
//!   rtcp: head_tilt
//!   joints:
//!     - axis: X
//!       type: prismatic
//!       direction: [1, 0, 0]
//!       limits: [-500, 500]
//!     # ... Y, Z
//!     - axis: C
//!       type: revolute
//!       dh: { a: 0, alpha: deg(-90), d: 0, theta_offset: deg(-90) }
//!       sign: -1
//!       limits: [0, 0]  # equal limits: unlimited
//!     - axis: B
//!       type: revolute
//!       dh: { a: 0, alpha: deg(90), d: 0, theta_offset: 0 }
//!       sign: -1
//!       limits: [-100, 100]
//!   critical_angles:
//!     - { axis: B, angle: 0 }
//! settings:
//!   singularity: { condition_number: 50, critical: 1.0, warning: 3.0, caution: 5.0 }
//!   ik: { max_iterations: 50, tolerance: 0.0001, damping: 0.001, singular_damping: 0.01 }
//!   avoidance: { strategy: smooth, margin: 1.0, smooth_steps: 4, split_segments: 5 }
//! ```
//! DH angles are radians unless written as `deg(angle)`. Travel limits and critical
//! angles are machine units (mm, degrees). Omitted settings keep their defaults.

use std::path::Path;
use nalgebra::Vector3;
use yaml_rust2::{Yaml, YamlLoader};
use crate::avoidance::AvoidanceStrategy;
use crate::parameter_error::ParameterError;
use crate::parameters::cnc_kinematics::{ConfigurationFamily, CriticalAngle, DhParameters, JointDefinition,
                                        JointType, MachineAxis, MachineConfiguration, RtcpModel,
                                        TravelLimits};
use crate::parameters_machines::cnc_kinematics::DEFAULT_PIVOT_DISTANCE;
use crate::registry::{ConfigurationRegistry, RegistryBuilder};
use crate::settings::KinematicsSettings;

/// Reads the file, registers its machines after the built-in ones and returns the registry
/// together with the settings.
pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<(ConfigurationRegistry, KinematicsSettings), ParameterError> {
    let contents = std::fs::read_to_string(path)?;
    from_yaml_str(&contents)
}

pub fn from_yaml_str(contents: &str) -> Result<(ConfigurationRegistry, KinematicsSettings), ParameterError> {
    let doc = load(contents)?;

    let mut builder = RegistryBuilder::new();
    for config in MachineConfiguration::builtin() {
        builder.register(config)?;
    }
    for config in machines(&doc)? {
        builder.register(config)?;
    }

    let settings = match &doc["settings"] {
        Yaml::BadValue | Yaml::Null => KinematicsSettings::default(),
        section => parse_settings(section)?,
    };
    Ok((builder.build(), settings))
}

impl MachineConfiguration {
    /// Reads all configurations of the YAML text: either a `machines:` list or a bare list.
    pub fn from_yaml_str(contents: &str) -> Result<Vec<Self>, ParameterError> {
        machines(&load(contents)?)
    }
}

fn load(contents: &str) -> Result<Yaml, ParameterError> {
    let docs = YamlLoader::load_from_str(contents)
        .map_err(|e| ParameterError::ParseError(format!("{}", e)))?;
    Ok(docs.into_iter().next().unwrap_or(Yaml::Null))
}

fn machines(doc: &Yaml) -> Result<Vec<MachineConfiguration>, ParameterError> {
    let list: &[Yaml] = match doc {
        Yaml::Array(list) => list.as_slice(),
        _ => match &doc["machines"] {
            Yaml::Array(list) => list.as_slice(),
            Yaml::BadValue | Yaml::Null => &[],
            _ => return Err(ParameterError::ParseError("'machines' must be a list".to_string())),
        },
    };
    list.iter().map(parse_machine).collect()
}

fn parse_machine(doc: &Yaml) -> Result<MachineConfiguration, ParameterError> {
    let name = required_str(doc, "name")?;
    let family = parse_from_str::<ConfigurationFamily>(&required_str(doc, "family")?)?;

    let rtcp = match required_str(doc, "rtcp")?.as_str() {
        "head_tilt" => RtcpModel::HeadTilt,
        "kinematic" => RtcpModel::Kinematic,
        "table_pivot" => RtcpModel::TablePivot {
            pivot_distance: optional_number(&doc["pivot_distance"], "pivot_distance")?
                .unwrap_or(DEFAULT_PIVOT_DISTANCE),
        },
        other => return Err(ParameterError::ParseError(format!("{}: unknown rtcp model '{}'", name, other))),
    };

    let joints = doc["joints"].as_vec()
        .ok_or_else(|| ParameterError::MissingField(format!("{}.joints", name)))?
        .iter()
        .map(parse_joint)
        .collect::<Result<Vec<_>, _>>()?;

    let critical_angles = match &doc["critical_angles"] {
        Yaml::Array(list) => list.iter()
            .map(|c| Ok(CriticalAngle::new(
                parse_from_str::<MachineAxis>(&required_str(c, "axis")?)?,
                required_number(&c["angle"], "critical_angles.angle")?,
            )))
            .collect::<Result<Vec<_>, ParameterError>>()?,
        Yaml::BadValue | Yaml::Null => Vec::new(),
        _ => return Err(ParameterError::ParseError(format!("{}: critical_angles must be a list", name))),
    };

    Ok(MachineConfiguration::new(&name, family, joints, critical_angles, rtcp)?)
}

fn parse_joint(doc: &Yaml) -> Result<JointDefinition, ParameterError> {
    let axis = parse_from_str::<MachineAxis>(&required_str(doc, "axis")?)?;
    let limits = match number_list(&doc["limits"], "limits")? {
        Some(values) if values.len() == 2 => TravelLimits::new(values[0], values[1]),
        Some(values) => return Err(ParameterError::InvalidLength { expected: 2, found: values.len() }),
        None => TravelLimits::unlimited(),
    };

    let dh_doc = &doc["dh"];
    let dh = DhParameters::new(
        optional_number(&dh_doc["a"], "dh.a")?.unwrap_or(0.0),
        optional_angle(&dh_doc["alpha"], "dh.alpha")?.unwrap_or(0.0),
        optional_number(&dh_doc["d"], "dh.d")?.unwrap_or(0.0),
        optional_angle(&dh_doc["theta_offset"], "dh.theta_offset")?.unwrap_or(0.0),
    );

    let sign_correction = match &doc["sign"] {
        Yaml::Integer(sign) => i8::try_from(*sign)
            .map_err(|_| ParameterError::ParseError(format!("sign of {} out of range: {}", axis, sign)))?,
        Yaml::BadValue | Yaml::Null => 1,
        other => return Err(ParameterError::ParseError(format!("sign of {} must be 1 or -1: {:?}", axis, other))),
    };

    let joint_type = match required_str(doc, "type")?.as_str() {
        "prismatic" => {
            let direction = match number_list(&doc["direction"], "direction")? {
                Some(values) if values.len() == 3 => Vector3::new(values[0], values[1], values[2]),
                Some(values) => return Err(ParameterError::InvalidLength { expected: 3, found: values.len() }),
                None => return Err(ParameterError::MissingField(format!("direction of {}", axis))),
            };
            JointType::Prismatic { direction }
        }
        "revolute" => JointType::Revolute,
        other => return Err(ParameterError::ParseError(format!("unknown joint type '{}'", other))),
    };

    Ok(JointDefinition { axis, joint_type, dh, sign_correction, limits })
}

fn parse_settings(doc: &Yaml) -> Result<KinematicsSettings, ParameterError> {
    let mut settings = KinematicsSettings::default();

    let singularity = &doc["singularity"];
    let thresholds = &mut settings.thresholds;
    set_number(&mut thresholds.condition_number, &singularity["condition_number"], "condition_number")?;
    set_number(&mut thresholds.critical, &singularity["critical"], "critical")?;
    set_number(&mut thresholds.warning, &singularity["warning"], "warning")?;
    set_number(&mut thresholds.caution, &singularity["caution"], "caution")?;

    let ik = &doc["ik"];
    let dls = &mut settings.dls;
    set_count(&mut dls.max_iterations, &ik["max_iterations"], "max_iterations")?;
    set_number(&mut dls.tolerance, &ik["tolerance"], "tolerance")?;
    set_number(&mut dls.damping, &ik["damping"], "damping")?;
    set_number(&mut dls.singular_damping, &ik["singular_damping"], "singular_damping")?;

    let avoidance = &doc["avoidance"];
    let options = &mut settings.avoidance;
    if let Some(strategy) = avoidance["strategy"].as_str() {
        options.strategy = parse_from_str::<AvoidanceStrategy>(strategy)?;
    }
    set_number(&mut options.margin_deg, &avoidance["margin"], "margin")?;
    set_count(&mut options.smooth_steps, &avoidance["smooth_steps"], "smooth_steps")?;
    set_count(&mut options.split_segments, &avoidance["split_segments"], "split_segments")?;

    settings.validate().map_err(ParameterError::ParseError)?;
    Ok(settings)
}

fn parse_from_str<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, ParameterError> {
    value.parse::<T>().map_err(ParameterError::ParseError)
}

fn required_str(doc: &Yaml, key: &str) -> Result<String, ParameterError> {
    doc[key].as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ParameterError::MissingField(key.to_string()))
}

/// Numbers may be written as integers or reals.
fn as_number(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Real(_) => value.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn optional_number(value: &Yaml, field: &str) -> Result<Option<f64>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        _ => as_number(value)
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ParameterError::ParseError(format!("{} must be a finite number", field))),
    }
}

fn required_number(value: &Yaml, field: &str) -> Result<f64, ParameterError> {
    optional_number(value, field)?.ok_or_else(|| ParameterError::MissingField(field.to_string()))
}

/// Angle in radians, or `deg(angle)` in degrees.
fn optional_angle(value: &Yaml, field: &str) -> Result<Option<f64>, ParameterError> {
    if let Yaml::String(text) = value {
        let degrees = text.trim()
            .strip_prefix("deg(")
            .and_then(|s| s.strip_suffix(')'))
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| ParameterError::ParseError(format!("{}: cannot read angle '{}'", field, text)))?;
        return Ok(Some(degrees.to_radians()));
    }
    optional_number(value, field)
}

fn number_list(value: &Yaml, field: &str) -> Result<Option<Vec<f64>>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Array(items) => items.iter()
            .map(|item| required_number(item, field))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        _ => Err(ParameterError::ParseError(format!("{} must be a list of numbers", field))),
    }
}

fn set_number(target: &mut f64, value: &Yaml, field: &str) -> Result<(), ParameterError> {
    if let Some(v) = optional_number(value, field)? {
        *target = v;
    }
    Ok(())
}

fn set_count(target: &mut usize, value: &Yaml, field: &str) -> Result<(), ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(()),
        Yaml::Integer(i) if *i >= 0 => {
            *target = *i as usize;
            Ok(())
        }
        _ => Err(ParameterError::ParseError(format!("{} must be a non-negative integer", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters_machines::cnc_kinematics::HEAD_HEAD_BC;

    #[test]
    fn test_to_yaml_round_trip() {
        for config in MachineConfiguration::builtin() {
            let text = config.to_yaml();
            let loaded = MachineConfiguration::from_yaml_str(&text).unwrap();
            assert_eq!(loaded.len(), 1);
            let loaded = &loaded[0];
            assert_eq!(loaded.name, config.name);
            assert_eq!(loaded.family, config.family);
            assert_eq!(loaded.rtcp, config.rtcp);
            assert_eq!(loaded.critical_angles, config.critical_angles);
            assert_eq!(loaded.joints.len(), config.joints.len());
            for (l, c) in loaded.joints.iter().zip(config.joints.iter()) {
                assert_eq!(l.axis, c.axis);
                assert_eq!(l.joint_type, c.joint_type);
                assert_eq!(l.sign_correction, c.sign_correction);
                assert_eq!(l.limits, c.limits);
                assert!((l.dh.alpha - c.dh.alpha).abs() < 1e-6);
                assert!((l.dh.theta_offset - c.dh.theta_offset).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_builtin_kept_and_settings_defaulted() {
        let (registry, settings) = from_yaml_str("machines: []\n").unwrap();
        assert!(registry.get(HEAD_HEAD_BC).is_ok());
        assert_eq!(settings, KinematicsSettings::default());
    }

    #[test]
    fn test_duplicate_of_builtin_rejected() {
        let text = format!("machines:\n{}", MachineConfiguration::head_head_bc().to_yaml());
        let result = from_yaml_str(&text);
        assert!(matches!(result, Err(ParameterError::KinematicsConfigurationError(_))));
    }

    #[test]
    fn test_settings_partially_given() {
        let text = "settings:\n  singularity:\n    critical: 0.5\n  avoidance:\n    strategy: split\n    split_segments: 8\n";
        let (_, settings) = from_yaml_str(text).unwrap();
        assert_eq!(settings.thresholds.critical, 0.5);
        assert_eq!(settings.thresholds.warning, 3.0);
        assert_eq!(settings.avoidance.strategy, AvoidanceStrategy::Split);
        assert_eq!(settings.avoidance.split_segments, 8);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let text = "settings:\n  singularity:\n    critical: 4.0\n";
        assert!(matches!(from_yaml_str(text), Err(ParameterError::ParseError(_))));
    }

    #[test]
    fn test_missing_field() {
        let text = "machines:\n- family: head_head_bc\n  rtcp: head_tilt\n  joints: []\n";
        assert!(matches!(from_yaml_str(text), Err(ParameterError::MissingField(field)) if field == "name"));
    }

    #[test]
    fn test_wrong_direction_length() {
        let text = "- name: M\n  family: custom\n  rtcp: kinematic\n  joints:\n    - axis: X\n      type: prismatic\n      direction: [1, 0]\n";
        assert!(matches!(MachineConfiguration::from_yaml_str(text),
            Err(ParameterError::InvalidLength { expected: 3, found: 2 })));
    }

    #[test]
    fn test_angles() {
        let half_turn = optional_angle(&Yaml::String("deg(180)".to_string()), "a").unwrap().unwrap();
        assert!((half_turn - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(optional_angle(&Yaml::Integer(1), "a").unwrap(), Some(1.0));
        assert!(optional_angle(&Yaml::String("180".to_string()), "a").is_err());
    }
}
