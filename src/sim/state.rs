//! Shared simulation types
//!
//! Identifiers, transforms and the commands the simulation hands to its
//! collaborators live here so every subsystem agrees on them.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::yaw_facing;

/// Position + orientation of anything placed in the world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Transform positioned at `position`, facing along `dir` (XZ only)
    pub fn facing(position: Vec3, dir: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_rotation_y(yaw_facing(dir)),
        }
    }

    /// Forward (+Z) direction of this transform
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

/// Snapshot of the player, supplied by the locomotion controller every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Sprinting / boosted locomotion (survives impacts)
    pub boosted: bool,
    pub alive: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            boosted: false,
            alive: true,
        }
    }
}

impl PlayerState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Along-track progress
    #[inline]
    pub fn progress(&self) -> f32 {
        self.position.z
    }
}

/// Handle into an [`EntityPool`](super::pool::EntityPool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HazardId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PickupId(pub u32);

/// Anything the spawn scheduler tracks on its active roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorRef {
    /// Pooled regular traffic
    Traffic(EntityHandle),
    /// One-shot AI hazard (never pooled)
    Hazard(HazardId),
}

/// What kind of thing hit something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardKind {
    /// Ordinary pooled traffic car
    Traffic,
    /// AI-driven "drunk driver"
    Vehicle,
    /// Falling meteorite
    Meteor,
}

/// Explosion effect variants (VFX + audio are keyed by these)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExplosionKind {
    Car,
    Meteor,
    Plasma,
}

impl ExplosionKind {
    /// Standard explosion for a hazard kind
    pub fn standard_for(kind: HazardKind) -> Self {
        match kind {
            HazardKind::Traffic | HazardKind::Vehicle => ExplosionKind::Car,
            HazardKind::Meteor => ExplosionKind::Meteor,
        }
    }
}

/// Fire-and-forget commands for the presentation / player collaborators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectCommand {
    /// Spawn explosion VFX and play its sound at `position`
    Explosion { kind: ExplosionKind, position: Vec3 },
    /// Start the player's death sequence
    PlayerDeath,
    /// Impulse applied to the player body
    PlayerKnockback { impulse: Vec3 },
    /// Explosion force applied to a hazard at its final position
    HazardKnockback { position: Vec3, force: f32 },
    /// Player collected a sprint power-up
    SprintBoost { duration: f32 },
}

/// Tagged environment surfaces that hazards can strike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceTag {
    /// Marked danger zone on the road
    RedZone,
    /// Roadside buildings
    House,
    Ground,
    /// Another vehicle on the road
    Car,
}
