//! Color coordinate spaces.
//!
//! A [`ColorCoordinates`] implementation projects a packed color onto three
//! axes; distance is the Euclidean norm of the per-axis differences. Alpha is
//! never part of the projection.

use super::{blue, green, red};
use serde::{Deserialize, Serialize};

/// Projection of a packed color onto `x, y, z` axes.
pub trait ColorCoordinates: Sync {
    fn coordinates(&self, color: u32) -> [f64; 3];

    fn distance(&self, a: u32, b: u32) -> f64 {
        norm(self.coordinates(a), self.coordinates(b))
    }
}

pub(crate) fn norm(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Raw 8-bit red, green, blue.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rgb;

impl ColorCoordinates for Rgb {
    fn coordinates(&self, color: u32) -> [f64; 3] {
        [
            f64::from(red(color)),
            f64::from(green(color)),
            f64::from(blue(color)),
        ]
    }
}

/// CIE L\*a\*b\* relative to the D65 white point.
#[derive(Debug, Clone, Copy, Default)]
pub struct CieLab;

const XN: f64 = 0.95047;
const YN: f64 = 1.0;
const ZN: f64 = 1.08883;
const DELTA: f64 = 6.0 / 29.0;

fn linearize8(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

impl ColorCoordinates for CieLab {
    fn coordinates(&self, color: u32) -> [f64; 3] {
        let r = linearize8(red(color));
        let g = linearize8(green(color));
        let b = linearize8(blue(color));
        let x = 0.4124 * r + 0.3576 * g + 0.1805 * b;
        let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let z = 0.0193 * r + 0.1192 * g + 0.9505 * b;
        let fy = lab_f(y / YN);
        [
            116.0 * fy - 16.0,
            500.0 * (lab_f(x / XN) - fy),
            200.0 * (fy - lab_f(z / ZN)),
        ]
    }
}

/// Serializable selector for the coordinate space a node measures in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    #[default]
    Rgb,
    Lab,
}

impl Space {
    pub fn coordinates(self) -> &'static dyn ColorCoordinates {
        match self {
            Space::Rgb => &Rgb,
            Space::Lab => &CieLab,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_distance_ignores_alpha() {
        assert_eq!(Rgb.distance(0x0000_0000, 0xFF00_0000), 0.0);
        assert_eq!(Rgb.distance(0xFF00_0000, 0xFF03_0400), 5.0);
    }

    #[test]
    fn lab_white_and_black() {
        let white = CieLab.coordinates(0xFFFF_FFFF);
        let black = CieLab.coordinates(0xFF00_0000);
        assert!((white[0] - 100.0).abs() < 0.1, "L of white = {}", white[0]);
        assert!(white[1].abs() < 0.5 && white[2].abs() < 0.5);
        assert!(black[0].abs() < 1e-9);
    }

    #[test]
    fn lab_distance_is_symmetric() {
        let a = 0xFF80_2040;
        let b = 0xFF10_A0C0;
        assert_eq!(CieLab.distance(a, b), CieLab.distance(b, a));
        assert!(CieLab.distance(a, b) > 0.0);
    }
}
