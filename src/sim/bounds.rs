//! Axis-aligned bounding boxes
//!
//! Used to measure segment prototypes (union of all renderable bounds) and
//! for the overlap tests behind the built-in contact detector.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// An axis-aligned box given by its min and max corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Union of every box, `None` when empty
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Bounds>, b| match acc {
                Some(a) => Some(a.union(b)),
                None => Some(*b),
            })
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Sphere overlap via closest point on the box
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Point on the box closest to `p`
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }
}
