// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Distinct point types for each coordinate space.
//!
//! Every space gets its own type so a screen position can never be passed where
//! a canvas position is expected. Conversions only happen through the named
//! operations on [`CoordinateSystem`](super::CoordinateSystem).

use crate::math::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Normalizes `-0.0` to `0.0` so that equal values hash equally.
#[inline]
fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

macro_rules! float_point {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
        pub struct $name {
            /// Horizontal component.
            pub x: f64,
            /// Vertical component.
            pub y: f64,
        }

        impl $name {
            /// The origin of this space.
            pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

            /// Creates a new point.
            #[inline]
            pub const fn new(x: f64, y: f64) -> Self {
                Self { x, y }
            }

            /// Returns the raw components as a vector.
            #[inline]
            pub fn to_vec2(self) -> Vec2 {
                Vec2::new(self.x, self.y)
            }

            /// Builds a point from raw components.
            #[inline]
            pub fn from_vec2(v: Vec2) -> Self {
                Self::new(v.x, v.y)
            }

            /// Returns `true` if both components are within `epsilon` of `other`.
            #[inline]
            pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
                (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                canonical_bits(self.x) == canonical_bits(other.x)
                    && canonical_bits(self.y) == canonical_bits(other.y)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                canonical_bits(self.x).hash(state);
                canonical_bits(self.y).hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({},{})"), self.x, self.y)
            }
        }
    };
}

float_point!(
    /// A position in physical device pixels.
    ScreenPoint,
    "screen"
);
float_point!(
    /// A position in logical, device-independent canvas pixels.
    CanvasPoint,
    "canvas"
);
float_point!(
    /// A position in the free-drag workspace continuum.
    WorkspacePoint,
    "workspace"
);

/// An integer cell index in the puzzle grid.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPoint {
    /// Column index.
    pub x: i32,
    /// Row index.
    pub y: i32,
}

impl GridPoint {
    /// Creates a new grid cell index.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid({},{})", self.x, self.y)
    }
}

/// A half-open rectangular range of grid cells, `[min, max)` on both axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GridRange {
    /// The first included cell.
    pub min: GridPoint,
    /// One past the last included cell on each axis.
    pub max: GridPoint,
}

impl GridRange {
    /// Number of cells covered by the range.
    pub fn cell_count(&self) -> usize {
        let w = (self.max.x - self.min.x).max(0) as usize;
        let h = (self.max.y - self.min.y).max(0) as usize;
        w * h
    }

    /// Returns `true` if the cell lies inside the range.
    pub fn contains(&self, cell: GridPoint) -> bool {
        cell.x >= self.min.x && cell.x < self.max.x && cell.y >= self.min.y && cell.y < self.max.y
    }

    /// Iterates every cell in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = GridPoint> + '_ {
        (self.min.y..self.max.y)
            .flat_map(move |y| (self.min.x..self.max.x).map(move |x| GridPoint::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_points_hash_by_value() {
        let mut set = HashSet::new();
        set.insert(CanvasPoint::new(1.5, 2.0));
        set.insert(CanvasPoint::new(1.5, 2.0));
        set.insert(CanvasPoint::new(0.0, 0.0));
        set.insert(CanvasPoint::new(-0.0, 0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(ScreenPoint::new(100.0, 100.0).to_string(), "screen(100,100)");
        assert_eq!(CanvasPoint::new(0.5, -2.25).to_string(), "canvas(0.5,-2.25)");
        assert_eq!(GridPoint::new(3, 4).to_string(), "grid(3,4)");
    }

    #[test]
    fn test_grid_range_iteration() {
        let range = GridRange {
            min: GridPoint::new(1, 1),
            max: GridPoint::new(3, 2),
        };
        let cells: Vec<_> = range.iter().collect();
        assert_eq!(cells, vec![GridPoint::new(1, 1), GridPoint::new(2, 1)]);
        assert_eq!(range.cell_count(), 2);
        assert!(range.contains(GridPoint::new(2, 1)));
        assert!(!range.contains(GridPoint::new(3, 1)));
    }
}
