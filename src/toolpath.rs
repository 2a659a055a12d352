//! Toolpath points as produced by the CAM layer, annotated with flags

use bitflags::bitflags;
use nalgebra::Vector3;
use std::fmt;
use std::f64::consts::PI;

bitflags! {
    /// Flags that can be set on a toolpath point
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PointFlags: u32 {
        const NONE = 0b0000_0000;

        /// Positioning move at rapid traverse, no cutting.
        const RAPID =               0b0000_0001;

        /// Point did not exist in the programmed path; added by singularity avoidance.
        const INSERTED =            0b0000_0010;

        /// Programmed point whose rotary values were changed by singularity avoidance.
        const ADJUSTED =            0b0000_0100;

        /// Any point the avoidance stage has touched
        const MODIFIED = Self::INSERTED.bits() | Self::ADJUSTED.bits();
    }
}

/// One step of a generated toolpath.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolpathPoint {
    /// Linear axis coordinates X, Y, Z, mm
    pub linear: Vector3<f64>,

    /// Rotary axis angles in A, B, C order (only the configured ones), degrees
    pub rotary: Vec<f64>,

    /// Feed rate, mm/min
    pub feed: f64,

    pub flags: PointFlags,
}

impl ToolpathPoint {
    /// Cutting move
    pub fn new(linear: Vector3<f64>, rotary: Vec<f64>, feed: f64) -> Self {
        ToolpathPoint {
            linear,
            rotary,
            feed,
            flags: PointFlags::NONE,
        }
    }

    pub fn rapid(linear: Vector3<f64>, rotary: Vec<f64>) -> Self {
        ToolpathPoint {
            linear,
            rotary,
            feed: 0.0,
            flags: PointFlags::RAPID,
        }
    }

    pub fn is_rapid(&self) -> bool {
        self.flags.contains(PointFlags::RAPID)
    }

    /// Point between `self` (t = 0) and `end` (t = 1). Feed and the rapid flag come from
    /// the end point, as the move into `end` is the one being subdivided.
    pub fn interpolate(&self, end: &ToolpathPoint, t: f64) -> ToolpathPoint {
        let t = t.clamp(0.0, 1.0);
        ToolpathPoint {
            linear: self.linear + (end.linear - self.linear) * t,
            rotary: self.rotary.iter().zip(end.rotary.iter())
                .map(|(a, b)| a + (b - a) * t)
                .collect(),
            feed: end.feed,
            flags: (end.flags & PointFlags::RAPID) | PointFlags::INSERTED,
        }
    }
}

impl fmt::Display for ToolpathPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.4} Y{:.4} Z{:.4}", self.linear.x, self.linear.y, self.linear.z)?;
        for value in &self.rotary {
            write!(f, " {:.4}", value)?;
        }
        if self.is_rapid() {
            write!(f, " rapid")
        } else {
            write!(f, " F{:.1}", self.feed)
        }
    }
}

/// Ordered sequence of toolpath points.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Toolpath {
    pub points: Vec<ToolpathPoint>,
}

impl Toolpath {
    pub fn new(points: Vec<ToolpathPoint>) -> Self {
        Toolpath { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points that came from the CAM layer (not inserted later)
    pub fn programmed(&self) -> impl Iterator<Item = &ToolpathPoint> {
        self.points.iter().filter(|p| !p.flags.contains(PointFlags::INSERTED))
    }

    /// Values of the rotary axis at `rotary_index` along the path.
    pub fn rotary_profile(&self, rotary_index: usize) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.rotary.get(rotary_index).copied()).collect()
    }
}

/// Cosine ease-in/ease-out: maps 0..1 onto 0..1 with zero slope at both ends.
pub fn cosine_ease(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    (1.0 - (PI * t).cos()) / 2.0
}
