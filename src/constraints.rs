//! Travel limits of the machine axes

/// When used as sorting weight, candidate solutions are sorted by proximity to the
/// previous toolpath point only.
pub const BY_PREV: f64 = 0.0;

/// When used as sorting weight, candidate solutions are sorted by proximity to the
/// center of the travel ranges only.
pub const BY_CONSTRAINTS: f64 = 1.0;

/// Tolerance when checking a value against its limit (mm or degrees). Solutions
/// computed exactly at the travel boundary must not be rejected due to rounding.
const LIMIT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    /// Lower limits in joint vector order (mm, degrees).
    pub from: Vec<f64>,

    /// Upper limits in joint vector order (mm, degrees). If equal to the lower limit,
    /// the axis is not limited.
    pub to: Vec<f64>,

    /// Weight between proximity to the previous point (0.0) and to the center of the
    /// travel range (1.0) when several solutions are possible.
    pub sorting_weight: f64,
}

impl Constraints {
    pub fn new(from: Vec<f64>, to: Vec<f64>, sorting_weight: f64) -> Self {
        Constraints {
            from,
            to,
            sorting_weight: sorting_weight.clamp(0.0, 1.0),
        }
    }

    /// Checks that each value is within the travel range of its axis.
    pub fn compliant(&self, joints: &[f64]) -> bool {
        if joints.len() != self.from.len() {
            return false;
        }
        joints.iter().enumerate().all(|(i, &value)| {
            if self.from[i] == self.to[i] {
                return value.is_finite(); // Axis without limits, from == to
            }
            value >= self.from[i] - LIMIT_TOLERANCE && value <= self.to[i] + LIMIT_TOLERANCE
        })
    }

    /// Indices of the axes that are out of their travel range.
    pub fn violations(&self, joints: &[f64]) -> Vec<usize> {
        (0..joints.len().min(self.from.len()))
            .filter(|&i| !self.compliant_axis(i, joints[i]))
            .collect()
    }

    pub fn compliant_axis(&self, index: usize, value: f64) -> bool {
        if self.from[index] == self.to[index] {
            return value.is_finite();
        }
        value >= self.from[index] - LIMIT_TOLERANCE && value <= self.to[index] + LIMIT_TOLERANCE
    }

    pub fn filter(&self, candidates: &[Vec<f64>]) -> Vec<Vec<f64>> {
        candidates.iter()
            .filter(|joints| self.compliant(joints))
            .cloned()
            .collect()
    }

    /// Centers of the travel ranges. Unlimited axes have their center at 0.
    pub fn centers(&self) -> Vec<f64> {
        self.from.iter().zip(self.to.iter())
            .map(|(from, to)| (from + to) / 2.0)
            .collect()
    }

    /// Cost of choosing `candidate`, mixing the distance to the previous point
    /// and the distance to the center of travel according to the sorting weight.
    pub fn cost(&self, candidate: &[f64], previous: Option<&[f64]>) -> f64 {
        fn distance(a: &[f64], b: &[f64]) -> f64 {
            a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
        }
        let centers = self.centers();
        let to_center = distance(candidate, &centers);
        match previous {
            Some(previous) => {
                let to_previous = distance(candidate, previous);
                (1.0 - self.sorting_weight) * to_previous + self.sorting_weight * to_center
            }
            None => to_center,
        }
    }

    /// Sorts candidates by cost, cheapest first.
    pub fn sort(&self, candidates: &mut [Vec<f64>], previous: Option<&[f64]>) {
        candidates.sort_by(|a, b| {
            self.cost(a, previous).total_cmp(&self.cost(b, previous))
        });
    }
}
