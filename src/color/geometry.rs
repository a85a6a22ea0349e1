//! Point-to-segment distance in a color space.
//!
//! A [`LineSegment`] joins two colors. Its distance to a third color is the
//! distance to the closer endpoint when the perpendicular foot falls outside
//! the segment (detected with the obtuse-angle test `a² ≥ b² + c²`), and the
//! perpendicular distance `2·area / |start − end|` otherwise, with the area
//! from Heron's formula.

use super::space::{ColorCoordinates, norm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub start: u32,
    pub end: u32,
}

impl LineSegment {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Shortest distance from `point` to any point of the segment.
    ///
    /// A degenerate segment (`start` and `end` project to the same point)
    /// behaves like a single point.
    pub fn distance_to(&self, point: u32, coordinates: &dyn ColorCoordinates) -> f64 {
        let p = coordinates.coordinates(point);
        let s = coordinates.coordinates(self.start);
        let e = coordinates.coordinates(self.end);
        let sp = norm(s, p);
        let ep = norm(e, p);
        let se = norm(s, e);
        if se == 0.0 {
            return sp;
        }
        if sp * sp >= ep * ep + se * se {
            return ep;
        }
        if ep * ep >= sp * sp + se * se {
            return sp;
        }
        let half = (sp + ep + se) / 2.0;
        // Rounding can push the product slightly below zero for collinear points.
        let area = (half * (half - sp) * (half - ep) * (half - se)).max(0.0).sqrt();
        2.0 * area / se
    }

    /// Fraction `t ∈ [0, 1]` of the way from `start` to `end` of the segment
    /// point closest to `point`.
    pub fn projection(&self, point: u32, coordinates: &dyn ColorCoordinates) -> f64 {
        let p = coordinates.coordinates(point);
        let s = coordinates.coordinates(self.start);
        let e = coordinates.coordinates(self.end);
        let dir = [e[0] - s[0], e[1] - s[1], e[2] - s[2]];
        let len2 = dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2];
        if len2 == 0.0 {
            return 0.0;
        }
        let t = ((p[0] - s[0]) * dir[0] + (p[1] - s[1]) * dir[1] + (p[2] - s[2]) * dir[2]) / len2;
        t.clamp(0.0, 1.0)
    }

    /// The color at fraction `t` along the segment, interpolated per channel
    /// in packed ARGB. The result is opaque.
    pub fn lerp(&self, t: f64) -> u32 {
        let mix = |a: u8, b: u8| {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        super::pack(
            0xFF,
            mix(super::red(self.start), super::red(self.end)),
            mix(super::green(self.start), super::green(self.end)),
            mix(super::blue(self.start), super::blue(self.end)),
        )
    }
}
