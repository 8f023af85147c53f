//! Data-driven game balance
//!
//! Every tunable number in the world core lives here. Loaded from JSON; any
//! field left out of the document keeps its default.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sim::bounds::Bounds;
use crate::sim::clock::ClockDomain;
use crate::sim::steering::{HazardBehavior, HazardProfile, SteeringParams};

/// Configuration load/validation errors
#[derive(thiserror::Error, Debug)]
pub enum TuningError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse or serialize error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A min/max pair is inverted
    #[error("Invalid range for {field}: min {min} > max {max}")]
    InvalidRange {
        field: &'static str,
        min: f32,
        max: f32,
    },

    /// A value is outside its allowed bounds
    #[error("{field} out of bounds: {value}")]
    OutOfBounds { field: &'static str, value: f32 },

    /// A list that must have entries is empty
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Float range `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn check(&self, field: &'static str) -> Result<(), TuningError> {
        if self.min > self.max || !self.min.is_finite() || !self.max.is_finite() {
            return Err(TuningError::InvalidRange {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Inclusive count range `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn check(&self, field: &'static str) -> Result<(), TuningError> {
        if self.min > self.max {
            return Err(TuningError::InvalidRange {
                field,
                min: self.min as f32,
                max: self.max as f32,
            });
        }
        Ok(())
    }
}

fn check_probability(field: &'static str, value: f32) -> Result<(), TuningError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TuningError::OutOfBounds { field, value });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f32) -> Result<(), TuningError> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(TuningError::OutOfBounds { field, value });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f32) -> Result<(), TuningError> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(TuningError::OutOfBounds { field, value });
    }
    Ok(())
}

/// A pooled traffic car model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarPrototype {
    pub name: String,
    /// Collision box half extents
    pub half_extents: Vec3,
}

impl CarPrototype {
    pub fn new(name: &str, half_extents: Vec3) -> Self {
        Self {
            name: name.to_string(),
            half_extents,
        }
    }
}

/// Regular traffic (pooled cars)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficTuning {
    /// Car models; empty disables traffic
    pub prototypes: Vec<CarPrototype>,
    /// Lateral lane offsets shared by traffic and hazard vehicles
    pub lanes: Vec<f32>,
    pub lane_y: f32,
    /// Initial pool size (soft target)
    pub pool_size: usize,
    /// First spawn frontier, relative to the player
    pub spawn_distance_ahead: f32,
    /// Keep spawning while the frontier is within this distance ahead
    pub respawn_window: f32,
    /// Frontier advance per spawn
    pub step: FloatRange,
    /// Longitudinal jitter (±) around the frontier
    pub jitter: f32,
    /// Constant drive speed toward the player
    pub speed: f32,
    /// Recycled once this far behind the player
    pub recycle_distance: f32,
    /// Items placed per new segment
    pub segment_count: CountRange,
    /// Keep per-segment spawns this far from the segment ends
    pub segment_margin: f32,
    /// Chance a per-segment item is a hazard vehicle instead of a car
    pub segment_hazard_chance: f32,
}

impl Default for TrafficTuning {
    fn default() -> Self {
        Self {
            prototypes: vec![
                CarPrototype::new("sedan", Vec3::new(1.0, 0.75, 2.2)),
                CarPrototype::new("hatchback", Vec3::new(0.9, 0.75, 1.9)),
                CarPrototype::new("van", Vec3::new(1.1, 1.1, 2.6)),
                CarPrototype::new("pickup", Vec3::new(1.1, 0.9, 2.8)),
            ],
            lanes: vec![-27.0, -21.0, 0.96, 6.0],
            lane_y: 0.5,
            pool_size: 10,
            spawn_distance_ahead: 120.0,
            respawn_window: 250.0,
            step: FloatRange::new(35.0, 55.0),
            jitter: 5.0,
            speed: 25.0,
            recycle_distance: 25.0,
            segment_count: CountRange::new(1, 3),
            segment_margin: 20.0,
            segment_hazard_chance: 0.08,
        }
    }
}

/// Hazard vehicles ("drunk drivers")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardTuning {
    /// Behavior profiles; empty disables hazard vehicles
    pub profiles: Vec<HazardProfile>,
    /// Vehicles per timed wave
    pub wave_size: CountRange,
    /// Distance between timed waves
    pub wave_gap: FloatRange,
    /// Where wave vehicles appear, ahead of the player
    pub wave_ahead: FloatRange,
    /// Independent per-segment injection chance
    pub segment_chance: f32,
    /// Live hazard vehicle cap for per-segment injection
    pub max_live: usize,
    /// Extra height above the lane at spawn
    pub spawn_height_offset: f32,
    /// Delay before a released hazard is destroyed
    pub release_grace: f32,
}

impl Default for HazardTuning {
    fn default() -> Self {
        Self {
            profiles: vec![
                HazardProfile::drunk_driver(),
                HazardProfile::swerver(),
                HazardProfile::stalker(),
            ],
            wave_size: CountRange::new(1, 3),
            wave_gap: FloatRange::new(150.0, 200.0),
            wave_ahead: FloatRange::new(180.0, 220.0),
            segment_chance: 0.15,
            max_live: 3,
            spawn_height_offset: 0.5,
            release_grace: 2.0,
        }
    }
}

/// Falling meteor waves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteorTuning {
    /// Base seconds between waves
    pub interval: f32,
    /// Added to the interval each wave
    pub interval_jitter: FloatRange,
    pub wave_size: CountRange,
    /// Spawn height above the player
    pub spawn_height: f32,
    /// Lateral spread (±) around the player
    pub spread: f32,
    /// Longitudinal jitter around the newest segment's midpoint
    pub z_jitter: FloatRange,
    /// Lateral jitter (±) of the aim point
    pub aim_lateral_jitter: f32,
    /// Aim point depth below the player
    pub aim_drop: f32,
    /// Aim point distance ahead of the player
    pub aim_ahead: FloatRange,
    pub speed: f32,
    pub gravity: f32,
    /// Maximum random angular velocity
    pub spin: f32,
    pub despawn_distance: f32,
    /// Removed below this height
    pub kill_height: f32,
}

impl Default for MeteorTuning {
    fn default() -> Self {
        Self {
            interval: 4.0,
            interval_jitter: FloatRange::new(-1.0, 2.0),
            wave_size: CountRange::new(2, 6),
            spawn_height: 60.0,
            spread: 10.0,
            z_jitter: FloatRange::new(-15.0, 20.0),
            aim_lateral_jitter: 5.0,
            aim_drop: 15.0,
            aim_ahead: FloatRange::new(10.0, 25.0),
            speed: 200.0,
            gravity: 9.81,
            spin: 20.0,
            despawn_distance: 80.0,
            kill_height: -30.0,
        }
    }
}

impl MeteorTuning {
    /// Steering profile every meteor is spawned with
    pub fn profile(&self) -> HazardProfile {
        HazardProfile {
            name: "meteor".to_string(),
            weight: 1.0,
            behavior: HazardBehavior::Falling {
                gravity: self.gravity,
            },
            steering: SteeringParams {
                speed: self.speed,
                despawn_distance: self.despawn_distance,
                ..SteeringParams::default()
            },
        }
    }
}

/// A segment prefab: its renderables' bounds in local space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPrototype {
    pub name: String,
    pub renderables: Vec<Bounds>,
}

/// Track segment streaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentTuning {
    /// Segment prefab; `None` disables streaming
    pub prototype: Option<SegmentPrototype>,
    /// Fixed length (also the fallback when measurement finds nothing)
    pub length: f32,
    /// Measure length from the prototype's renderables on first spawn
    pub auto_measure: bool,
    /// Negative overlap between consecutive segments
    pub overlap: f32,
    /// Seconds between segment spawns
    pub spawn_interval: f32,
    /// Clock the spawn cadence runs on
    pub cadence_clock: ClockDomain,
    /// Segments spawned synchronously at startup
    pub startup_segments: u32,
    /// Default teardown delay after the end trigger fires
    pub destroy_delay: f32,
    /// Along-track coordinate of the first segment
    pub origin_z: f32,
}

impl Default for SegmentTuning {
    fn default() -> Self {
        Self {
            prototype: Some(SegmentPrototype {
                name: "city_block".to_string(),
                renderables: vec![
                    // Road surface
                    Bounds::new(Vec3::new(-32.0, -0.1, 0.0), Vec3::new(32.0, 0.0, 200.0)),
                    // Sidewalks / buildings
                    Bounds::new(Vec3::new(-48.0, 0.0, 5.0), Vec3::new(-34.0, 18.0, 195.0)),
                    Bounds::new(Vec3::new(34.0, 0.0, 5.0), Vec3::new(48.0, 22.0, 195.0)),
                ],
            }),
            length: 200.0,
            auto_measure: true,
            overlap: 0.5,
            spawn_interval: 2.0,
            cadence_clock: ClockDomain::Real,
            startup_segments: 8,
            destroy_delay: 2.0,
            origin_z: 0.0,
        }
    }
}

/// Sprint power-ups placed on segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupTuning {
    pub lanes: Vec<f32>,
    pub count: CountRange,
    pub height: f32,
    pub margin: f32,
    /// Simulated seconds before an uncollected pickup disappears
    pub lifetime: f32,
    /// Sprint granted on collection
    pub sprint_duration: f32,
}

impl Default for PickupTuning {
    fn default() -> Self {
        Self {
            lanes: vec![-6.0, -2.0, 2.0, 6.0],
            count: CountRange::new(0, 2),
            height: 1.5,
            margin: 10.0,
            lifetime: 20.0,
            sprint_duration: 3.0,
        }
    }
}

/// A camera shake request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakeRequest {
    pub intensity: f32,
    pub duration: f32,
}

/// How one hazard kind reacts to impacts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactProfile {
    /// Slow-motion hold when the player dies
    pub lethal_slow_motion: f32,
    /// Slow-motion hold when a boosted player smashes through
    pub high_energy_slow_motion: f32,
    /// Slow-motion hold on environment hits (`None` = no slow motion)
    pub environment_slow_motion: Option<f32>,
    pub lethal_destroy_delay: f32,
    pub high_energy_destroy_delay: f32,
    pub environment_destroy_delay: f32,
    /// Knockback along the hazard -> player direction
    pub push_force: f32,
    /// Upward knockback
    pub lift_force: f32,
    /// Camera shake on any qualifying impact
    pub shake: Option<ShakeRequest>,
}

impl Default for ImpactProfile {
    fn default() -> Self {
        Self {
            lethal_slow_motion: 1.5,
            high_energy_slow_motion: 2.5,
            environment_slow_motion: None,
            lethal_destroy_delay: 1.0,
            high_energy_destroy_delay: 0.0,
            environment_destroy_delay: 1.0,
            push_force: 50.0,
            lift_force: 20.0,
            shake: None,
        }
    }
}

/// Impact reactions per hazard kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactTuning {
    pub traffic: ImpactProfile,
    pub vehicle: ImpactProfile,
    pub meteor: ImpactProfile,
    /// Destroy delay for hits while the attract-mode camera is running
    pub cinematic_destroy_delay: f32,
}

impl Default for ImpactTuning {
    fn default() -> Self {
        Self {
            traffic: ImpactProfile::default(),
            vehicle: ImpactProfile {
                lethal_destroy_delay: 0.05,
                high_energy_destroy_delay: 0.05,
                environment_destroy_delay: 0.05,
                ..ImpactProfile::default()
            },
            meteor: ImpactProfile {
                high_energy_slow_motion: 0.5,
                high_energy_destroy_delay: 1.0,
                push_force: 0.0,
                lift_force: 0.0,
                shake: Some(ShakeRequest {
                    intensity: 1.2,
                    duration: 0.5,
                }),
                ..ImpactProfile::default()
            },
            cinematic_destroy_delay: 1.0,
        }
    }
}

/// Time dilation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowMotionTuning {
    /// Time scale while slowed
    pub scale: f32,
    /// Hold used when a trigger gives no duration
    pub default_duration: f32,
    /// Real seconds to ramp back to normal speed
    pub ramp: f32,
}

impl Default for SlowMotionTuning {
    fn default() -> Self {
        Self {
            scale: 0.2,
            default_duration: 0.8,
            ramp: 0.5,
        }
    }
}

/// Presentation-side controllers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationTuning {
    /// Rate the camera eases back to rest after a shake
    pub shake_return_rate: f32,
    /// Sky darkening transition speed (progress per second)
    pub darken_speed: f32,
}

impl Default for PresentationTuning {
    fn default() -> Self {
        Self {
            shake_return_rate: 5.0,
            darken_speed: 1.5,
        }
    }
}

/// Collision volumes for the built-in contact detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColliderTuning {
    pub player_radius: f32,
    pub vehicle_half_extents: Vec3,
    pub meteor_radius: f32,
    pub pickup_radius: f32,
    /// Meteors hitting this height strike the ground
    pub ground_height: f32,
}

impl Default for ColliderTuning {
    fn default() -> Self {
        Self {
            player_radius: 0.9,
            vehicle_half_extents: Vec3::new(1.0, 0.8, 2.3),
            meteor_radius: 1.5,
            pickup_radius: 1.0,
            ground_height: 0.0,
        }
    }
}

/// Complete world tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Tuning {
    pub traffic: TrafficTuning,
    pub hazards: HazardTuning,
    /// `None` disables meteor waves
    pub meteors: Option<MeteorTuning>,
    pub segments: SegmentTuning,
    /// `None` disables pickups
    pub pickups: Option<PickupTuning>,
    pub impacts: ImpactTuning,
    pub slow_motion: SlowMotionTuning,
    pub presentation: PresentationTuning,
    pub colliders: ColliderTuning,
}

impl Tuning {
    /// Defaults with every optional subsystem switched on
    pub fn full() -> Self {
        Self {
            meteors: Some(MeteorTuning::default()),
            pickups: Some(PickupTuning::default()),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, TuningError> {
        let tuning: Tuning = serde_json::from_str(json)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TuningError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let tuning = Self::from_json(&contents)?;
        log::info!("Loaded tuning from {}", path.as_ref().display());
        Ok(tuning)
    }

    pub fn to_json_pretty(&self) -> Result<String, TuningError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check numeric ranges. Missing prototypes are not errors: the owning
    /// subsystem logs and switches itself off instead.
    pub fn validate(&self) -> Result<(), TuningError> {
        let t = &self.traffic;
        if t.lanes.is_empty() {
            return Err(TuningError::Empty("traffic.lanes"));
        }
        t.step.check("traffic.step")?;
        check_positive("traffic.step.min", t.step.min)?;
        check_non_negative("traffic.jitter", t.jitter)?;
        check_non_negative("traffic.speed", t.speed)?;
        check_non_negative("traffic.recycle_distance", t.recycle_distance)?;
        t.segment_count.check("traffic.segment_count")?;
        check_non_negative("traffic.segment_margin", t.segment_margin)?;
        check_probability("traffic.segment_hazard_chance", t.segment_hazard_chance)?;

        let h = &self.hazards;
        h.wave_size.check("hazards.wave_size")?;
        h.wave_gap.check("hazards.wave_gap")?;
        h.wave_ahead.check("hazards.wave_ahead")?;
        check_probability("hazards.segment_chance", h.segment_chance)?;
        check_non_negative("hazards.release_grace", h.release_grace)?;
        for profile in &h.profiles {
            check_non_negative("hazards.profiles.weight", profile.weight)?;
            check_non_negative("hazards.profiles.steering.speed", profile.steering.speed)?;
            check_non_negative(
                "hazards.profiles.steering.aggro_radius",
                profile.steering.aggro_radius,
            )?;
        }

        if let Some(m) = &self.meteors {
            check_positive("meteors.interval", m.interval)?;
            m.interval_jitter.check("meteors.interval_jitter")?;
            m.wave_size.check("meteors.wave_size")?;
            m.z_jitter.check("meteors.z_jitter")?;
            m.aim_ahead.check("meteors.aim_ahead")?;
        }

        let s = &self.segments;
        check_positive("segments.length", s.length)?;
        check_non_negative("segments.overlap", s.overlap)?;
        if s.overlap >= s.length {
            return Err(TuningError::OutOfBounds {
                field: "segments.overlap",
                value: s.overlap,
            });
        }
        check_positive("segments.spawn_interval", s.spawn_interval)?;
        check_non_negative("segments.destroy_delay", s.destroy_delay)?;

        if let Some(p) = &self.pickups {
            if p.lanes.is_empty() {
                return Err(TuningError::Empty("pickups.lanes"));
            }
            p.count.check("pickups.count")?;
            check_non_negative("pickups.lifetime", p.lifetime)?;
        }

        let sm = &self.slow_motion;
        if !(sm.scale > 0.0 && sm.scale <= 1.0) {
            return Err(TuningError::OutOfBounds {
                field: "slow_motion.scale",
                value: sm.scale,
            });
        }
        check_positive("slow_motion.default_duration", sm.default_duration)?;
        check_positive("slow_motion.ramp", sm.ramp)?;

        Ok(())
    }
}
