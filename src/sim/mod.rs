//! Deterministic simulation module
//!
//! All world logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by id / slot)
//! - No rendering, audio or platform dependencies

pub mod bounds;
pub mod clock;
pub mod contact;
pub mod events;
pub mod pool;
pub mod segment;
pub mod state;
pub mod steering;
pub mod tick;
pub mod traffic;
pub mod world;

pub use bounds::Bounds;
pub use clock::{ClockDomain, Clocks, TaskQueue};
pub use contact::{Collider, Contact, detect_contacts};
pub use events::{
    AmbientDanger, CameraShake, DilationPhase, ImpactOutcome, ImpactTarget, Orchestrator,
    Resolution, TimeDilation,
};
pub use pool::{EntityPool, Parent, PoolStats, PooledEntity, PrototypeSelector};
pub use segment::{Pickup, SegmentListener, SegmentStreamer, WorldSegment};
pub use state::{
    ActorRef, EffectCommand, EntityHandle, ExplosionKind, HazardId, HazardKind, PickupId,
    PlayerState, SegmentId, SurfaceTag, Transform,
};
pub use steering::{
    HazardActor, HazardBehavior, HazardProfile, HazardRoster, SteerOutcome, SteeringParams, steer,
};
pub use tick::{TickInput, step};
pub use traffic::{SpawnScheduleState, SpawnScheduler, TrafficCar};
pub use world::World;
