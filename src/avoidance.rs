//! Rewrites toolpaths so that no point stays inside a critical singularity zone.
//!
//! Only zones of [Severity::Critical] are corrected. The rotary axis of the zone is pushed
//! out to the critical band plus a margin, always on the same side of the critical angle
//! for the whole zone, and new points are inserted around the zone so the machine does not
//! jump. Programmed points are never removed, and the input toolpath is never changed.

use std::collections::BTreeMap;
use std::str::FromStr;
use crate::kinematics_error::KinematicsError;
use crate::parameters::cnc_kinematics::MachineConfiguration;
use crate::singularity::{analyze_toolpath, Severity, SingularityThresholds, SingularityZone};
use crate::toolpath::{cosine_ease, PointFlags, Toolpath, ToolpathPoint};
use crate::utils::{angle_difference, unwind_near};

/// How the critical zones are corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvoidanceStrategy {
    /// Push the zone out and add a single waypoint on the approach.
    Redirect,
    /// Replace the rotary motion through the zone by a straight interpolation between the
    /// neighbours of the zone, pushed out where it still passes too close.
    Linearize,
    /// Push the zone out and ease into and out of it with cosine blended points.
    #[default]
    Smooth,
    /// Push the zone out and subdivide every segment touching it.
    Split,
}

impl AvoidanceStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AvoidanceStrategy::Redirect => "REDIRECT",
            AvoidanceStrategy::Linearize => "LINEARIZE",
            AvoidanceStrategy::Smooth => "SMOOTH",
            AvoidanceStrategy::Split => "SPLIT",
        }
    }
}

impl FromStr for AvoidanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REDIRECT" => Ok(AvoidanceStrategy::Redirect),
            "LINEARIZE" => Ok(AvoidanceStrategy::Linearize),
            "SMOOTH" => Ok(AvoidanceStrategy::Smooth),
            "SPLIT" => Ok(AvoidanceStrategy::Split),
            other => Err(format!("Unknown avoidance strategy: {}", other)),
        }
    }
}

/// Parameters of singularity avoidance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidanceOptions {
    pub strategy: AvoidanceStrategy,

    /// Extra distance (degrees) beyond the critical band the adjusted points are moved to.
    pub margin_deg: f64,

    /// Points inserted on each segment entering and leaving a zone by [AvoidanceStrategy::Smooth].
    pub smooth_steps: usize,

    /// Number of pieces each segment touching a zone is split into by [AvoidanceStrategy::Split].
    pub split_segments: usize,
}

impl Default for AvoidanceOptions {
    fn default() -> Self {
        AvoidanceOptions {
            strategy: AvoidanceStrategy::default(),
            margin_deg: 1.0,
            smooth_steps: 4,
            split_segments: 5,
        }
    }
}

/// Moves one rotary axis away from one critical angle, to a fixed side.
#[derive(Debug, Clone, Copy)]
struct Push {
    rotary_index: usize,
    critical_angle: f64,
    side: f64,
    clearance: f64,
}

impl Push {
    /// New value for the axis if it is closer than the clearance, None if it may stay.
    fn apply(&self, value: f64) -> Option<f64> {
        let distance = angle_difference(value, self.critical_angle).abs();
        if distance < self.clearance {
            Some(unwind_near(self.critical_angle + self.side * self.clearance, value))
        } else {
            None
        }
    }
}

/// Points to insert on the segment starting at a toolpath index.
#[derive(Default)]
struct Insertion {
    /// Interpolation parameters in (0, 1)
    ts: Vec<f64>,
    pushes: Vec<Push>,
}

impl Insertion {
    fn add(&mut self, ts: impl IntoIterator<Item = f64>, push: Push) {
        for t in ts {
            if !self.ts.iter().any(|known| (known - t).abs() < 1e-9) {
                self.ts.push(t);
            }
        }
        self.ts.sort_by(f64::total_cmp);
        self.pushes.push(push);
    }
}

/// Side of the critical angle the zone is moved to: where the zone mostly is, else where
/// the path comes from or goes to, else the positive side.
fn choose_side(points: &[ToolpathPoint], zone: &SingularityZone, rotary_index: usize) -> f64 {
    let offset = |i: usize| angle_difference(points[i].rotary[rotary_index], zone.critical_angle);
    let mean = (zone.start..=zone.end).map(offset).sum::<f64>() / zone.point_count() as f64;
    let neighbours = [
        zone.start.checked_sub(1),
        Some(zone.end + 1).filter(|&i| i < points.len()),
    ];
    std::iter::once(mean)
        .chain(neighbours.into_iter().flatten().map(offset))
        .find(|o| o.abs() > 1e-9)
        .map_or(1.0, f64::signum)
}

fn check_points(config: &MachineConfiguration, toolpath: &Toolpath) -> Result<(), KinematicsError> {
    let expected = config.dof() - 3;
    match toolpath.points.iter().find(|p| p.rotary.len() != expected) {
        Some(point) => Err(KinematicsError::DimensionMismatch { expected, found: point.rotary.len() }),
        None => Ok(()),
    }
}

/// Corrects the critical zones of the toolpath with the chosen strategy and returns the
/// rewritten copy. Zones are expected to come from [analyze_toolpath] on the same path.
///
/// Adjusted points are flagged [PointFlags::ADJUSTED], new points [PointFlags::INSERTED].
/// All points of a zone end up at least `critical + margin` degrees from the critical
/// angle, so analyzing the result again finds no critical zone.
pub fn apply_avoidance_strategy(
    config: &MachineConfiguration,
    toolpath: &Toolpath,
    zones: &[SingularityZone],
    thresholds: &SingularityThresholds,
    options: &AvoidanceOptions,
) -> Result<Toolpath, KinematicsError> {
    check_points(config, toolpath)?;
    let original = &toolpath.points;
    let mut points = original.clone();
    let mut insertions: BTreeMap<usize, Insertion> = BTreeMap::new();
    let clearance = thresholds.critical + options.margin_deg.max(0.0);

    for zone in zones.iter().filter(|z| z.severity == Severity::Critical) {
        if zone.end >= original.len() || zone.start > zone.end {
            return Err(KinematicsError::DimensionMismatch {
                expected: original.len(),
                found: zone.end + 1,
            });
        }
        let rotary_index = config.rotary_index(zone.axis).ok_or_else(|| {
            KinematicsError::InvalidConfiguration(format!(
                "{}: zone on axis {} that the machine does not have", config.name, zone.axis.name()))
        })?;
        let push = Push {
            rotary_index,
            critical_angle: zone.critical_angle,
            side: choose_side(original, zone, rotary_index),
            clearance,
        };
        let before = zone.start.checked_sub(1);
        let after = Some(zone.end + 1).filter(|&i| i < original.len());

        for i in zone.start..=zone.end {
            let mut value = original[i].rotary[rotary_index];
            if let (AvoidanceStrategy::Linearize, Some(b), Some(a)) = (options.strategy, before, after) {
                let from = original[b].rotary[rotary_index];
                let to = unwind_near(original[a].rotary[rotary_index], from);
                let t = (i - b) as f64 / (a - b) as f64;
                value = from + (to - from) * t;
            }
            if let Some(pushed) = push.apply(value) {
                value = pushed;
            }
            let point = &mut points[i];
            if (point.rotary[rotary_index] - value).abs() > 1e-12 {
                point.rotary[rotary_index] = value;
                point.flags |= PointFlags::ADJUSTED;
            }
        }

        let mut segments: Vec<(usize, Vec<f64>)> = Vec::new();
        match options.strategy {
            AvoidanceStrategy::Linearize => {}
            AvoidanceStrategy::Redirect => {
                if let Some(b) = before {
                    segments.push((b, vec![0.5]));
                } else if after.is_some() {
                    segments.push((zone.end, vec![0.5]));
                }
            }
            AvoidanceStrategy::Smooth => {
                let steps = options.smooth_steps;
                let ts: Vec<f64> = (1..=steps)
                    .map(|k| cosine_ease(k as f64 / (steps + 1) as f64))
                    .collect();
                if let Some(b) = before {
                    segments.push((b, ts.clone()));
                }
                if after.is_some() {
                    segments.push((zone.end, ts));
                }
            }
            AvoidanceStrategy::Split => {
                let pieces = options.split_segments.max(1);
                let ts: Vec<f64> = (1..pieces).map(|k| k as f64 / pieces as f64).collect();
                let first = before.unwrap_or(zone.start);
                let last = if after.is_some() { zone.end } else { zone.end.saturating_sub(1) };
                for segment in (first..=last).filter(|s| s + 1 < original.len()) {
                    segments.push((segment, ts.clone()));
                }
            }
        }
        for (segment, ts) in segments {
            insertions.entry(segment).or_default().add(ts, push);
        }

        tracing::debug!(machine = %config.name, axis = zone.axis.name(), start = zone.start, end = zone.end,
            strategy = options.strategy.name(), side = push.side, "critical zone corrected");
    }

    if insertions.is_empty() {
        return Ok(Toolpath::new(points));
    }

    let inserted: usize = insertions.values().map(|i| i.ts.len()).sum();
    let mut rewritten = Vec::with_capacity(points.len() + inserted);
    for (index, point) in points.iter().enumerate() {
        rewritten.push(point.clone());
        let Some(insertion) = insertions.get(&index) else {
            continue;
        };
        let Some(next) = points.get(index + 1) else {
            continue;
        };
        for &t in &insertion.ts {
            let mut between = point.interpolate(next, t);
            for push in &insertion.pushes {
                let value = between.rotary[push.rotary_index];
                if let Some(pushed) = push.apply(value) {
                    between.rotary[push.rotary_index] = pushed;
                }
            }
            rewritten.push(between);
        }
    }
    tracing::debug!(machine = %config.name, inserted, points = rewritten.len(), "toolpath rewritten");
    Ok(Toolpath::new(rewritten))
}

/// Analyzes the toolpath and corrects its critical zones in one call. Returns the rewritten
/// toolpath together with the zones found on the original.
pub fn avoid_singularities(
    config: &MachineConfiguration,
    toolpath: &Toolpath,
    thresholds: &SingularityThresholds,
    options: &AvoidanceOptions,
) -> Result<(Toolpath, Vec<SingularityZone>), KinematicsError> {
    let zones = analyze_toolpath(config, toolpath, thresholds)?;
    let critical = zones.iter().filter(|z| z.severity == Severity::Critical).count();
    if critical > 0 {
        tracing::warn!(machine = %config.name, critical, "toolpath passes through singular orientations");
    }
    let corrected = apply_avoidance_strategy(config, toolpath, &zones, thresholds, options)?;
    Ok((corrected, zones))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// Head-head path with B passing through the singular orientation at points 3 and 4
    fn path_through_singularity() -> Toolpath {
        path(&[10.0, 4.0, 2.5, 0.5, -0.3, 2.0, 8.0])
    }

    fn path(bs: &[f64]) -> Toolpath {
        Toolpath::new(bs.iter().enumerate()
            .map(|(i, &b)| ToolpathPoint::new(Vector3::new(10.0 * i as f64, 0.0, -5.0), vec![b, 30.0], 1000.0))
            .collect())
    }

    fn options(strategy: AvoidanceStrategy) -> AvoidanceOptions {
        AvoidanceOptions { strategy, ..AvoidanceOptions::default() }
    }

    fn critical_zones(config: &MachineConfiguration, toolpath: &Toolpath) -> usize {
        analyze_toolpath(config, toolpath, &SingularityThresholds::default()).unwrap()
            .iter().filter(|z| z.severity == Severity::Critical).count()
    }

    const ALL: [AvoidanceStrategy; 4] = [AvoidanceStrategy::Redirect, AvoidanceStrategy::Linearize,
        AvoidanceStrategy::Smooth, AvoidanceStrategy::Split];

    #[test]
    fn test_no_critical_zone_remains() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path_through_singularity();
        assert_eq!(critical_zones(&config, &toolpath), 1);
        for strategy in ALL {
            let (corrected, zones) = avoid_singularities(
                &config, &toolpath, &SingularityThresholds::default(), &options(strategy)).unwrap();
            assert_eq!(zones.len(), 4);
            assert_eq!(critical_zones(&config, &corrected), 0, "{}", strategy.name());
        }
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let config = MachineConfiguration::head_head_bc();
        let thresholds = SingularityThresholds::default();
        for strategy in ALL {
            let (once, _) = avoid_singularities(&config, &path_through_singularity(), &thresholds,
                                                &options(strategy)).unwrap();
            let (twice, _) = avoid_singularities(&config, &once, &thresholds, &options(strategy)).unwrap();
            assert_eq!(once, twice, "{}", strategy.name());
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path_through_singularity();
        let copy = toolpath.clone();
        let _ = avoid_singularities(&config, &toolpath, &SingularityThresholds::default(),
                                    &AvoidanceOptions::default()).unwrap();
        assert_eq!(toolpath, copy);
    }

    #[test]
    fn test_point_counts_per_strategy() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path_through_singularity();
        // Zone covers points 3 and 4: one waypoint, nothing, 4 eased points on entry and exit,
        // segments 2-3, 3-4 and 4-5 split in 5
        let expected = [(AvoidanceStrategy::Redirect, 8), (AvoidanceStrategy::Linearize, 7),
            (AvoidanceStrategy::Smooth, 15), (AvoidanceStrategy::Split, 19)];
        for (strategy, count) in expected {
            let (corrected, _) = avoid_singularities(&config, &toolpath, &SingularityThresholds::default(),
                                                     &options(strategy)).unwrap();
            assert_eq!(corrected.len(), count, "{}", strategy.name());
            assert_eq!(corrected.programmed().count(), toolpath.len());
            let linear: Vec<_> = corrected.programmed().map(|p| p.linear).collect();
            let original: Vec<_> = toolpath.points.iter().map(|p| p.linear).collect();
            assert_eq!(linear, original);
        }
    }

    #[test]
    fn test_zone_pushed_to_one_side() {
        let config = MachineConfiguration::head_head_bc();
        let (corrected, _) = avoid_singularities(&config, &path_through_singularity(),
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Redirect)).unwrap();
        // Redirect inserted one point before index 3
        let adjusted: Vec<_> = corrected.points.iter()
            .filter(|p| p.flags.contains(PointFlags::ADJUSTED)).collect();
        assert_eq!(adjusted.len(), 2);
        for point in adjusted {
            assert!((point.rotary[0] - 2.0).abs() < 1e-9, "B = {}", point.rotary[0]);
            assert_eq!(point.rotary[1], 30.0);
        }

        // Mostly negative zone goes to the negative side
        let toolpath = path(&[-10.0, -0.6, 0.1, -8.0]);
        let (corrected, _) = avoid_singularities(&config, &toolpath,
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Linearize)).unwrap();
        assert!(corrected.points[1].rotary[0] <= -2.0 + 1e-9);
        assert!(corrected.points[2].rotary[0] <= -2.0 + 1e-9);
    }

    #[test]
    fn test_smooth_points_eased() {
        let config = MachineConfiguration::head_head_bc();
        let (corrected, _) = avoid_singularities(&config, &path_through_singularity(),
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Smooth)).unwrap();
        let inserted: Vec<_> = corrected.points.iter()
            .filter(|p| p.flags.contains(PointFlags::INSERTED)).collect();
        assert_eq!(inserted.len(), 8);
        // Entry segment goes from X = 20 to X = 30, eased: first step is short
        let first = inserted[0].linear.x - 20.0;
        let second = inserted[1].linear.x - inserted[0].linear.x;
        assert!(first < second);
        for point in inserted {
            assert!(point.rotary[0] >= 2.0 - 1e-9);
        }
    }

    #[test]
    fn test_linearize_uses_neighbours() {
        let config = MachineConfiguration::head_head_bc();
        let (corrected, _) = avoid_singularities(&config, &path_through_singularity(),
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Linearize)).unwrap();
        // Between B = 2.5 (index 2) and B = 2 (index 5)
        assert!((corrected.points[3].rotary[0] - (2.5 - 0.5 / 3.0)).abs() < 1e-9);
        assert!((corrected.points[4].rotary[0] - (2.5 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zone_at_path_start() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path(&[0.2, 6.0, 10.0]);
        let (corrected, zones) = avoid_singularities(&config, &toolpath,
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Redirect)).unwrap();
        assert_eq!(zones[0].start, 0);
        assert_eq!(corrected.len(), 4);
        assert!(corrected.points[1].flags.contains(PointFlags::INSERTED));
        assert_eq!(critical_zones(&config, &corrected), 0);
    }

    #[test]
    fn test_only_critical_zones_corrected() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path(&[10.0, 4.0, 2.0, 4.0, 10.0]);
        let (corrected, zones) = avoid_singularities(&config, &toolpath,
            &SingularityThresholds::default(), &AvoidanceOptions::default()).unwrap();
        assert!(!zones.is_empty());
        assert_eq!(corrected, toolpath);
    }

    #[test]
    fn test_rapid_flag_kept() {
        let config = MachineConfiguration::head_head_bc();
        let mut toolpath = path_through_singularity();
        toolpath.points[3].flags |= PointFlags::RAPID;
        let (corrected, _) = avoid_singularities(&config, &toolpath,
            &SingularityThresholds::default(), &options(AvoidanceStrategy::Redirect)).unwrap();
        // Waypoint on the move into point 3 is rapid too
        assert!(corrected.points[3].is_rapid());
        assert!(corrected.points[4].is_rapid());
        assert!(corrected.points[4].flags.contains(PointFlags::ADJUSTED));
    }

    #[test]
    fn test_zone_outside_path_rejected() {
        let config = MachineConfiguration::head_head_bc();
        let toolpath = path(&[10.0, 0.0]);
        let zone = SingularityZone {
            start: 1,
            end: 3,
            axis: crate::parameters::cnc_kinematics::MachineAxis::B,
            critical_angle: 0.0,
            min_distance: 0.0,
            severity: Severity::Critical,
        };
        let result = apply_avoidance_strategy(&config, &toolpath, &[zone],
            &SingularityThresholds::default(), &AvoidanceOptions::default());
        assert_eq!(result, Err(KinematicsError::DimensionMismatch { expected: 2, found: 4 }));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("smooth".parse::<AvoidanceStrategy>(), Ok(AvoidanceStrategy::Smooth));
        assert_eq!("SPLIT".parse::<AvoidanceStrategy>(), Ok(AvoidanceStrategy::Split));
        assert!("around".parse::<AvoidanceStrategy>().is_err());
        assert_eq!(AvoidanceStrategy::default(), AvoidanceStrategy::Smooth);
    }
}
