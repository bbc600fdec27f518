// src/coord.rs
// Five axis coordinate shared by moves, sentinels and position queries.

use core::ops::{Index, IndexMut};

/// Number of axes tracked per coordinate (x, y, z plus two auxiliary axes).
pub const NUM_AXES: usize = 5;

/// A position or a per-axis direction ratio.
///
/// The named fields are the storage; `to_array`/`from_array` and indexing
/// give the positional view used by code that loops over axes.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub u: f64,
    pub v: f64,
}

impl Coord {
    pub const ORIGIN: Coord = Coord { x: 0.0, y: 0.0, z: 0.0, u: 0.0, v: 0.0 };

    pub fn new(x: f64, y: f64, z: f64, u: f64, v: f64) -> Self {
        Coord { x, y, z, u, v }
    }

    /// Cartesian-only coordinate with both auxiliary axes at zero.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Coord { x, y, z, u: 0.0, v: 0.0 }
    }

    pub fn from_array(axis: [f64; NUM_AXES]) -> Self {
        Coord { x: axis[0], y: axis[1], z: axis[2], u: axis[3], v: axis[4] }
    }

    pub fn to_array(&self) -> [f64; NUM_AXES] {
        [self.x, self.y, self.z, self.u, self.v]
    }

    /// Component `i`, or `None` past the last axis.
    pub fn axis(&self, i: usize) -> Option<f64> {
        match i {
            0 => Some(self.x),
            1 => Some(self.y),
            2 => Some(self.z),
            3 => Some(self.u),
            4 => Some(self.v),
            _ => None,
        }
    }

    /// Returns `self + scalar * ratio`, component-wise.
    pub fn scale_add(&self, ratio: &Coord, scalar: f64) -> Coord {
        Coord {
            x: self.x + ratio.x * scalar,
            y: self.y + ratio.y * scalar,
            z: self.z + ratio.z * scalar,
            u: self.u + ratio.u * scalar,
            v: self.v + ratio.v * scalar,
        }
    }
}

impl From<[f64; NUM_AXES]> for Coord {
    fn from(axis: [f64; NUM_AXES]) -> Self {
        Coord::from_array(axis)
    }
}

impl Index<usize> for Coord {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.u,
            4 => &self.v,
            _ => panic!("axis index {} out of range for {} axes", i, NUM_AXES),
        }
    }
}

impl IndexMut<usize> for Coord {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.u,
            4 => &mut self.v,
            _ => panic!("axis index {} out of range for {} axes", i, NUM_AXES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn coord_creation() {
        let c = Coord::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(c.x, 1.0);
        assert_eq!(c.y, 2.0);
        assert_eq!(c.z, 3.0);
        assert_eq!(c.u, 4.0);
        assert_eq!(c.v, 5.0);
        assert_eq!(Coord::xyz(1.0, 2.0, 3.0), Coord::new(1.0, 2.0, 3.0, 0.0, 0.0));
    }

    #[test]
    fn array_view_matches_named_fields() {
        let c = Coord::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(c.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(Coord::from_array(c.to_array()), c);
        for i in 0..NUM_AXES {
            assert_eq!(c[i], c.to_array()[i]);
            assert_eq!(c.axis(i), Some(c[i]));
        }
        assert_eq!(c.axis(NUM_AXES), None);
    }

    #[test]
    fn index_mut_writes_through() {
        let mut c = Coord::ORIGIN;
        c[3] = 7.5;
        assert_eq!(c.u, 7.5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_past_last_axis_panics() {
        let c = Coord::ORIGIN;
        let _ = c[5];
    }

    #[test]
    fn scale_add_is_component_wise() {
        let start = Coord::new(1.0, 1.0, 1.0, 0.0, -1.0);
        let ratio = Coord::new(1.0, 0.5, 0.0, 2.0, 1.0);
        let c = start.scale_add(&ratio, 2.0);
        assert_approx_eq!(f64, c.x, 3.0);
        assert_approx_eq!(f64, c.y, 2.0);
        assert_approx_eq!(f64, c.z, 1.0);
        assert_approx_eq!(f64, c.u, 4.0);
        assert_approx_eq!(f64, c.v, 1.0);
    }
}
