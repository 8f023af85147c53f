//! Hazard steering AI
//!
//! Hazard vehicles pick between two regimes every fixed tick: pursue the
//! player while inside the aggro radius, otherwise cruise straight down the
//! track. Variants only change how the pursuit velocity is computed.
//! Meteors share the actor type but fly a ballistic arc.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::state::{HazardId, HazardKind, PlayerState, Transform};
use crate::consts::TRACK_BACK;
use crate::yaw_facing;

/// Steering variant, selected per actor at spawn time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HazardBehavior {
    /// Head straight for the player
    Pursuit,
    /// Pursuit with a sinusoidal lateral weave added to the target
    Swerve { amplitude: f32, frequency: f32 },
    /// Keeps a movement direction that only gradually re-aims at the player
    LockedHeading { turn_rate: f32 },
    /// Ballistic fall (meteors)
    Falling { gravity: f32 },
}

/// Per-profile steering parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringParams {
    /// Top speed (units/s)
    pub speed: f32,
    /// Pursue while the player is closer than this (XZ distance)
    pub aggro_radius: f32,
    /// Velocity blend rate toward the desired velocity (1/s)
    pub steer_strength: f32,
    /// Fraction of top speed used while cruising
    pub cruise_fraction: f32,
    /// Heading slerp rate (1/s)
    pub heading_rate: f32,
    /// Height the body is pinned to each tick
    pub ground_offset: f32,
    /// Removed once this far behind the player along the track
    pub despawn_distance: f32,
}

impl Default for SteeringParams {
    fn default() -> Self {
        Self {
            speed: 60.0,
            aggro_radius: 80.0,
            steer_strength: 8.0,
            cruise_fraction: 0.8,
            heading_rate: 3.0,
            ground_offset: 0.5,
            despawn_distance: 80.0,
        }
    }
}

/// A named hazard configuration; each variant keeps its own defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardProfile {
    pub name: String,
    /// Relative spawn weight
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub behavior: HazardBehavior,
    #[serde(default)]
    pub steering: SteeringParams,
}

fn default_weight() -> f32 {
    1.0
}

impl HazardProfile {
    /// The classic drunk driver: aggressive pursuit
    pub fn drunk_driver() -> Self {
        Self {
            name: "drunk_driver".to_string(),
            weight: 3.0,
            behavior: HazardBehavior::Pursuit,
            steering: SteeringParams::default(),
        }
    }

    /// Weaving driver: slower, wider aggro, shorter despawn
    pub fn swerver() -> Self {
        Self {
            name: "swerver".to_string(),
            weight: 1.0,
            behavior: HazardBehavior::Swerve {
                amplitude: 6.0,
                frequency: 2.5,
            },
            steering: SteeringParams {
                speed: 45.0,
                aggro_radius: 100.0,
                steer_strength: 5.0,
                despawn_distance: 60.0,
                ..SteeringParams::default()
            },
        }
    }

    /// Committed driver that never snaps to face the player
    pub fn stalker() -> Self {
        Self {
            name: "stalker".to_string(),
            weight: 1.0,
            behavior: HazardBehavior::LockedHeading { turn_rate: 1.5 },
            steering: SteeringParams {
                speed: 55.0,
                aggro_radius: 120.0,
                steer_strength: 4.0,
                despawn_distance: 100.0,
                ..SteeringParams::default()
            },
        }
    }
}

/// Position and velocity handed to the steering interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// State that persists between ticks for one actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteerMemory {
    /// Seconds since spawn (simulated)
    pub age: f32,
    /// Persistent movement direction (locked-heading variant)
    pub move_dir: Vec3,
}

#[inline]
fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

impl HazardBehavior {
    /// Velocity this variant wants this tick
    pub fn desired_velocity(
        &self,
        memory: &mut SteerMemory,
        kin: Kinematics,
        params: &SteeringParams,
        player: &PlayerState,
        dt: f32,
    ) -> Vec3 {
        let to_player = flatten(player.position - kin.position).normalize_or_zero();
        match *self {
            HazardBehavior::Pursuit => to_player * params.speed,
            HazardBehavior::Swerve {
                amplitude,
                frequency,
            } => {
                let lateral = Vec3::X * amplitude * (frequency * memory.age).sin();
                let target = player.position + lateral;
                flatten(target - kin.position).normalize_or_zero() * params.speed
            }
            HazardBehavior::LockedHeading { turn_rate } => {
                let t = (turn_rate * dt).clamp(0.0, 1.0);
                let blended = memory.move_dir.lerp(to_player, t).normalize_or_zero();
                if blended != Vec3::ZERO {
                    memory.move_dir = blended;
                }
                memory.move_dir * params.speed
            }
            HazardBehavior::Falling { gravity } => kin.velocity + Vec3::NEG_Y * gravity * dt,
        }
    }

    pub fn is_ground_vehicle(&self) -> bool {
        !matches!(self, HazardBehavior::Falling { .. })
    }
}

/// A non-pooled, AI-controlled hazard
#[derive(Debug, Clone)]
pub struct HazardActor {
    pub id: HazardId,
    pub kind: HazardKind,
    pub profile: String,
    pub transform: Transform,
    pub velocity: Vec3,
    /// Angular velocity (scaled axis, rad/s)
    pub spin: Vec3,
    pub behavior: HazardBehavior,
    pub params: SteeringParams,
    pub memory: SteerMemory,
    /// Already resolved an impact; waiting for removal
    pub doomed: bool,
    /// Holds an ambient danger registration that must be released
    pub darkens_sky: bool,
}

impl HazardActor {
    pub fn new(id: HazardId, kind: HazardKind, profile: &HazardProfile, transform: Transform) -> Self {
        Self {
            id,
            kind,
            profile: profile.name.clone(),
            transform,
            velocity: Vec3::ZERO,
            spin: Vec3::ZERO,
            behavior: profile.behavior,
            params: profile.steering,
            memory: SteerMemory {
                age: 0.0,
                move_dir: transform.forward(),
            },
            doomed: false,
            darkens_sky: false,
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }
}

/// Result of one steering tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerOutcome {
    Active,
    /// Fell too far behind the player
    Despawn,
}

/// Advance one actor by one fixed tick
pub fn steer(actor: &mut HazardActor, player: &PlayerState, dt: f32) -> SteerOutcome {
    actor.memory.age += dt;
    let params = actor.params;
    let kin = Kinematics {
        position: actor.transform.position,
        velocity: actor.velocity,
    };

    if actor.behavior.is_ground_vehicle() {
        let to_player = flatten(player.position - kin.position);
        if to_player.length_squared() < params.aggro_radius * params.aggro_radius {
            let desired =
                actor
                    .behavior
                    .desired_velocity(&mut actor.memory, kin, &params, player, dt);
            let t = (params.steer_strength * dt).clamp(0.0, 1.0);
            actor.velocity = actor.velocity.lerp(desired, t);

            let face = match actor.behavior {
                HazardBehavior::LockedHeading { .. } => actor.memory.move_dir,
                _ => actor.velocity,
            };
            if flatten(face).length_squared() > 0.1 {
                let look = Quat::from_rotation_y(yaw_facing(face));
                let t = (params.heading_rate * dt).clamp(0.0, 1.0);
                actor.transform.rotation = actor.transform.rotation.slerp(look, t);
            }
        } else {
            actor.velocity = TRACK_BACK * params.speed * params.cruise_fraction;
        }

        actor.transform.position += actor.velocity * dt;
        // Ground lock
        actor.transform.position.y = params.ground_offset;
        actor.velocity.y = 0.0;
    } else {
        actor.velocity =
            actor
                .behavior
                .desired_velocity(&mut actor.memory, kin, &params, player, dt);
        actor.transform.position += actor.velocity * dt;
        let spin = actor.spin * dt;
        if spin.length_squared() > 0.0 {
            actor.transform.rotation =
                (Quat::from_scaled_axis(spin) * actor.transform.rotation).normalize();
        }
    }

    if actor.transform.position.z < player.progress() - params.despawn_distance {
        SteerOutcome::Despawn
    } else {
        SteerOutcome::Active
    }
}

/// Owner of every live hazard actor (sorted by id)
#[derive(Debug, Clone, Default)]
pub struct HazardRoster {
    actors: Vec<HazardActor>,
    next_id: u32,
}

impl HazardRoster {
    pub fn new() -> Self {
        Self {
            actors: Vec::new(),
            next_id: 1,
        }
    }

    /// Create a new actor from `profile` and return its id
    pub fn spawn(&mut self, kind: HazardKind, profile: &HazardProfile, transform: Transform) -> HazardId {
        let id = HazardId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.actors.push(HazardActor::new(id, kind, profile, transform));
        id
    }

    pub fn get(&self, id: HazardId) -> Option<&HazardActor> {
        self.actors
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.actors[i])
    }

    pub fn get_mut(&mut self, id: HazardId) -> Option<&mut HazardActor> {
        match self.actors.binary_search_by_key(&id, |a| a.id) {
            Ok(i) => Some(&mut self.actors[i]),
            Err(_) => None,
        }
    }

    pub fn contains(&self, id: HazardId) -> bool {
        self.get(id).is_some()
    }

    /// Destroy an actor. Unknown ids are a no-op.
    pub fn remove(&mut self, id: HazardId) -> Option<HazardActor> {
        match self.actors.binary_search_by_key(&id, |a| a.id) {
            Ok(i) => Some(self.actors.remove(i)),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HazardActor> {
        self.actors.iter()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Live hazard vehicles (meteors and doomed actors excluded)
    pub fn live_vehicles(&self) -> usize {
        self.actors
            .iter()
            .filter(|a| a.kind == HazardKind::Vehicle && !a.doomed)
            .count()
    }

    /// Steer every actor one tick; despawned actors are removed and returned
    pub fn steer_all(&mut self, player: &PlayerState, dt: f32) -> Vec<HazardActor> {
        let mut despawned = Vec::new();
        let mut i = 0;
        while i < self.actors.len() {
            if steer(&mut self.actors[i], player, dt) == SteerOutcome::Despawn {
                despawned.push(self.actors.remove(i));
            } else {
                i += 1;
            }
        }
        despawned
    }

    /// Remove every actor matching `pred`, returning them
    pub fn remove_where(&mut self, mut pred: impl FnMut(&HazardActor) -> bool) -> Vec<HazardActor> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.actors.len() {
            if pred(&self.actors[i]) {
                removed.push(self.actors.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<HazardActor> {
        std::mem::take(&mut self.actors)
    }
}
