//! Road Rush - world core for an endless runner
//!
//! Core modules:
//! - `sim`: Simulation (segment streaming, traffic, hazards, reactions)
//! - `tuning`: Data-driven game balance

pub mod sim;
pub mod tuning;

pub use sim::{PlayerState, TickInput, World, step};
pub use tuning::{Tuning, TuningError};

use glam::Vec3;
use rand::Rng;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep at normal time scale (50 Hz)
    pub const BASE_FIXED_DT: f32 = 0.02;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Longest frame we are willing to simulate in one go
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Travel axis. Hazards and traffic drive toward -Z, the player runs toward +Z.
    pub const TRACK_BACK: glam::Vec3 = glam::Vec3::NEG_Z;
}

/// Uniform float in `[min, max)`, collapsing to `min` for empty ranges
#[inline]
pub fn random_between<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    if max > min { rng.random_range(min..max) } else { min }
}

/// Uniform integer in `[min, max]`, collapsing to `min` for empty ranges
#[inline]
pub fn random_count<R: Rng + ?Sized>(rng: &mut R, min: u32, max: u32) -> u32 {
    if max > min { rng.random_range(min..=max) } else { min }
}

/// Random point inside the unit sphere (rejection sampled)
pub fn random_in_unit_sphere<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        if p.length_squared() <= 1.0 {
            return p;
        }
    }
}

/// Move `current` toward `target` by at most `max_delta`
#[inline]
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Yaw (radians around +Y) that faces `dir` in the XZ plane, +Z being zero
#[inline]
pub fn yaw_facing(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}
