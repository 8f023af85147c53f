//! The world context
//!
//! One owner for every subsystem. Hosts mutate it only through `&mut World`
//! (usually via [`step`](super::tick::step)).

use glam::Vec3;

use super::clock::Clocks;
use super::contact::{Collider, Contact, detect_contacts};
use super::events::{ImpactTarget, Orchestrator, Resolution};
use super::pool::PoolStats;
use super::segment::{SegmentListener, SegmentStreamer, WorldSegment};
use super::state::{
    ActorRef, EffectCommand, ExplosionKind, HazardKind, PlayerState, SegmentId, SurfaceTag,
};
use super::traffic::SpawnScheduler;
use crate::tuning::Tuning;

/// Everything the endless runner simulates
#[derive(Debug, Clone)]
pub struct World {
    tuning: Tuning,
    seed: u64,
    pub(crate) clocks: Clocks,
    pub(crate) orchestrator: Orchestrator,
    pub(crate) segments: SegmentStreamer,
    pub(crate) traffic: SpawnScheduler,
    pub(crate) player: PlayerState,
    pub(crate) accumulator: f32,
    pub(crate) tick_count: u64,
}

impl World {
    /// Build a world and run the startup burst with the player at the
    /// track origin
    pub fn new(tuning: Tuning, seed: u64) -> Self {
        let player = PlayerState::at(Vec3::new(0.0, 0.0, tuning.segments.origin_z));
        let mut world = Self {
            orchestrator: Orchestrator::new(&tuning, seed),
            segments: SegmentStreamer::new(&tuning, seed.wrapping_add(1)),
            traffic: SpawnScheduler::new(&tuning, seed.wrapping_add(2)),
            clocks: Clocks::new(),
            player,
            accumulator: 0.0,
            tick_count: 0,
            tuning,
            seed,
        };
        world.start();
        log::info!("World initialized with seed: {}", seed);
        world
    }

    fn start(&mut self) {
        self.traffic.reset(&self.clocks, &self.player);
        self.segments.warm_up(&self.clocks, &mut self.traffic);
    }

    /// Tear everything down and start a fresh run
    pub fn restart(&mut self, seed: u64) {
        *self = Self::new(self.tuning.clone(), seed);
    }

    /// Frame logic: controllers, streaming, spawning (in that order)
    pub(crate) fn frame_update(&mut self, sim_dt: f32) {
        self.orchestrator.update(&self.clocks, sim_dt);
        self.segments.update(&self.clocks, &mut self.traffic);
        let newest = self.segments.newest().map(|s| (s.start, s.end));
        self.traffic
            .update(&self.clocks, &self.player, newest, &mut self.orchestrator);
    }

    /// One fixed physics tick
    pub(crate) fn fixed_update(&mut self, dt: f32, detect: bool) {
        self.traffic
            .fixed_tick(dt, &self.player, &mut self.orchestrator);
        if detect {
            for contact in self.detect_contacts() {
                self.handle_contact(contact);
            }
        }
        self.tick_count += 1;
    }

    /// Contacts found by the built-in overlap detector
    pub fn detect_contacts(&self) -> Vec<Contact> {
        detect_contacts(
            &self.player,
            &self.tuning.colliders,
            &self.traffic,
            &self.segments,
        )
    }

    /// Route a contact to whatever reacts to it. Non-qualifying pairs are
    /// ignored.
    pub fn handle_contact(&mut self, contact: Contact) {
        if let Some(other) = contact.other(Collider::Player) {
            match other {
                Collider::Traffic(handle) => {
                    self.player_hit(ActorRef::Traffic(handle), contact.point)
                }
                Collider::Hazard(id) => self.player_hit(ActorRef::Hazard(id), contact.point),
                Collider::SegmentEnd(id) => {
                    if self.segments.fire_trigger(id) {
                        self.request_segment_destroy(id, None);
                    }
                }
                Collider::Pickup(id) => {
                    if self.segments.collect_pickup(id).is_some() {
                        let duration = self.segments.sprint_duration();
                        self.orchestrator
                            .emit(EffectCommand::SprintBoost { duration });
                        log::debug!("Pickup {:?} collected", id);
                    }
                }
                Collider::Player | Collider::Surface(_) => {
                    log::trace!("Ignored contact {:?}", contact);
                }
            }
            return;
        }

        let surface = match (contact.a, contact.b) {
            (Collider::Hazard(id), Collider::Surface(tag))
            | (Collider::Surface(tag), Collider::Hazard(id)) => Some((id, tag)),
            (Collider::Hazard(id), Collider::Traffic(_))
            | (Collider::Traffic(_), Collider::Hazard(id)) => Some((id, SurfaceTag::Car)),
            _ => None,
        };
        let Some((id, tag)) = surface else {
            log::trace!("Ignored contact {:?}", contact);
            return;
        };
        let Some(hazard) = self.traffic.hazards().get(id) else {
            return;
        };
        if hazard.doomed {
            return;
        }
        let (kind, position) = (hazard.kind, hazard.position());
        let resolution = self.orchestrator.resolve_impact(
            &self.clocks,
            kind,
            position,
            contact.point,
            ImpactTarget::Surface(tag),
        );
        if let Some(resolution) = resolution {
            self.finish_impact(ActorRef::Hazard(id), kind, resolution);
        }
    }

    fn player_hit(&mut self, actor: ActorRef, point: Vec3) {
        if !self.player.alive {
            log::trace!("Ignored hit on dead player by {:?}", actor);
            return;
        }
        let found = match actor {
            ActorRef::Traffic(handle) => self
                .traffic
                .pool()
                .get(handle)
                .filter(|e| e.active && !e.data.doomed)
                .map(|e| (HazardKind::Traffic, e.transform.position)),
            ActorRef::Hazard(id) => self
                .traffic
                .hazards()
                .get(id)
                .filter(|h| !h.doomed)
                .map(|h| (h.kind, h.position())),
        };
        let Some((kind, position)) = found else {
            return;
        };
        let target = ImpactTarget::Player {
            position: self.player.position,
            boosted: self.player.boosted,
        };
        if let Some(resolution) =
            self.orchestrator
                .resolve_impact(&self.clocks, kind, position, point, target)
        {
            self.finish_impact(actor, kind, resolution);
        }
    }

    fn finish_impact(&mut self, actor: ActorRef, kind: HazardKind, resolution: Resolution) {
        if let ActorRef::Hazard(id) = actor {
            if kind == HazardKind::Meteor {
                self.traffic.release_ambient_of(id, &mut self.orchestrator);
            }
        }
        self.traffic
            .destroy_after(&self.clocks, actor, resolution.destroy_delay);
    }

    /// Schedule segment teardown (simulated clock). `None` uses the
    /// configured default delay. Duplicate requests are ignored.
    pub fn request_segment_destroy(&mut self, segment: SegmentId, delay: Option<f32>) -> bool {
        self.segments.request_destroy(&self.clocks, segment, delay)
    }

    /// Independent hazard roll for a segment spanning `[start, end]`
    pub fn notify_segment_spawned(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
        self.traffic.notify_segment_spawned(start, end)
    }

    /// Populate a segment spanning `[start, end]`
    pub fn spawn_on_segment(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
        self.traffic.spawn_on_segment(start, end)
    }

    /// Give a spawned actor back to the scheduler
    pub fn release_actor(&mut self, actor: ActorRef) -> bool {
        self.traffic.release_actor(&self.clocks, actor)
    }

    pub fn trigger_slow_motion(&mut self, duration: Option<f32>) {
        self.orchestrator.trigger_slow_motion(&self.clocks, duration);
    }

    pub fn shake_camera(&mut self, intensity: f32, duration: f32) {
        self.orchestrator.shake_camera(intensity, duration);
    }

    pub fn spawn_impact_effect(&mut self, kind: ExplosionKind, position: Vec3) {
        self.orchestrator.spawn_impact_effect(kind, position);
    }

    /// Take the commands produced since the last drain
    pub fn drain_effects(&mut self) -> Vec<EffectCommand> {
        self.orchestrator.drain_effects()
    }

    /// Attract-mode camera: impacts play effects only
    pub fn set_cinematic(&mut self, cinematic: bool) {
        self.orchestrator.set_cinematic(cinematic);
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clocks(&self) -> &Clocks {
        &self.clocks
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn time_scale(&self) -> f32 {
        self.orchestrator.time_scale()
    }

    pub fn fixed_dt(&self) -> f32 {
        self.orchestrator.fixed_dt()
    }

    pub fn camera_offset(&self) -> Vec3 {
        self.orchestrator.shake().offset()
    }

    pub fn darkness(&self) -> f32 {
        self.orchestrator.ambient().darkness()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn segments(&self) -> &SegmentStreamer {
        &self.segments
    }

    pub fn active_segments(&self) -> impl Iterator<Item = &WorldSegment> {
        self.segments.segments()
    }

    pub fn traffic(&self) -> &SpawnScheduler {
        &self.traffic
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.traffic.pool_stats()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
