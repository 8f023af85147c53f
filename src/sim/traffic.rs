//! Hazard spawn scheduler
//!
//! Owns the traffic car pool, the hazard roster and the active roster of
//! everything it placed. Each frame it prunes lost actors, recycles what
//! fell behind the player, then spawns: distance-driven traffic, hazard
//! vehicle waves and timed meteor waves. It is also the streamer's
//! [`SegmentListener`].

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::clock::{ClockDomain, Clocks, TaskQueue};
use super::events::Orchestrator;
use super::pool::{EntityPool, PoolStats, PrototypeSelector};
use super::segment::{SegmentListener, inner_range};
use super::state::{ActorRef, EntityHandle, HazardId, HazardKind, PlayerState, Transform};
use super::steering::{HazardActor, HazardProfile, HazardRoster};
use crate::consts::TRACK_BACK;
use crate::tuning::{HazardTuning, MeteorTuning, TrafficTuning, Tuning};
use crate::{random_between, random_count, random_in_unit_sphere};

/// Per-instance payload of a pooled traffic car
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficCar {
    pub model: String,
    pub half_extents: Vec3,
    /// Drive speed toward -Z
    pub speed: f32,
    /// Hit something; removal is scheduled
    pub doomed: bool,
}

/// Scheduler bookkeeping, reset on every restart
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnScheduleState {
    /// Z of the next regular traffic spawn
    pub traffic_frontier: f32,
    /// Player Z that triggers the next hazard wave
    pub hazard_frontier: f32,
    /// Hazard vehicles currently alive
    pub live_hazards: usize,
    /// Simulated time of the next meteor wave
    pub next_meteor_at: Option<f64>,
    /// Regular cars placed by the distance trigger since the last reset
    pub traffic_spawned: u32,
    pub waves_spawned: u32,
    pub meteor_waves: u32,
}

/// Rate-limited, randomized spawning of traffic and hazards
#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    traffic: TrafficTuning,
    hazard_tuning: HazardTuning,
    meteors: Option<MeteorTuning>,
    meteor_profile: Option<HazardProfile>,
    pool: EntityPool<TrafficCar>,
    hazards: HazardRoster,
    roster: Vec<ActorRef>,
    removals: TaskQueue<ActorRef>,
    state: SpawnScheduleState,
    rng: Pcg32,
}

impl SpawnScheduler {
    pub fn new(tuning: &Tuning, seed: u64) -> Self {
        let traffic = tuning.traffic.clone();
        // The window fill loop only terminates with a positive step
        let step_ok = traffic.step.min > 0.0 && traffic.step.max >= traffic.step.min;
        let prototypes: Vec<TrafficCar> = if step_ok {
            traffic
                .prototypes
                .iter()
                .map(|p| TrafficCar {
                    model: p.name.clone(),
                    half_extents: p.half_extents,
                    speed: traffic.speed,
                    doomed: false,
                })
                .collect()
        } else {
            log::error!(
                "Traffic step {}..{} must be positive; traffic disabled",
                traffic.step.min,
                traffic.step.max
            );
            Vec::new()
        };
        if step_ok && prototypes.is_empty() {
            log::error!("No traffic car prototypes configured; traffic disabled");
        }
        if tuning.hazards.profiles.is_empty() {
            log::error!("No hazard profiles configured; hazard vehicles disabled");
        }
        if tuning.meteors.is_none() {
            log::warn!("No meteor configuration; meteor waves disabled");
        }

        let mut rng = Pcg32::seed_from_u64(seed);
        let mut pool = EntityPool::new(prototypes);
        pool.warm(traffic.pool_size, &mut rng);

        Self {
            traffic,
            hazard_tuning: tuning.hazards.clone(),
            meteors: tuning.meteors.clone(),
            meteor_profile: tuning.meteors.as_ref().map(MeteorTuning::profile),
            pool,
            hazards: HazardRoster::new(),
            roster: Vec::new(),
            removals: TaskQueue::new(),
            state: SpawnScheduleState::default(),
            rng,
        }
    }

    #[inline]
    pub fn traffic_enabled(&self) -> bool {
        self.pool.has_prototypes()
    }

    #[inline]
    pub fn hazards_enabled(&self) -> bool {
        !self.hazard_tuning.profiles.is_empty()
    }

    #[inline]
    pub fn meteors_enabled(&self) -> bool {
        self.meteors.is_some()
    }

    /// (Re)initialize the frontiers relative to the player
    pub fn reset(&mut self, clocks: &Clocks, player: &PlayerState) {
        let z = player.progress();
        let gap = self.hazard_tuning.wave_gap;
        self.state = SpawnScheduleState {
            traffic_frontier: z + self.traffic.spawn_distance_ahead,
            hazard_frontier: z + random_between(&mut self.rng, gap.min, gap.max),
            live_hazards: self.hazards.live_vehicles(),
            next_meteor_at: None,
            ..SpawnScheduleState::default()
        };
        if self.meteors.is_some() {
            self.state.next_meteor_at = Some(clocks.sim() + self.next_meteor_delay() as f64);
        }
    }

    fn next_meteor_delay(&mut self) -> f32 {
        match &self.meteors {
            Some(m) => {
                let jitter = random_between(&mut self.rng, m.interval_jitter.min, m.interval_jitter.max);
                (m.interval + jitter).max(0.1)
            }
            None => 0.0,
        }
    }

    /// Frame update. `newest_segment` is `(start, end)` of the newest
    /// active segment, if any.
    pub fn update(
        &mut self,
        clocks: &Clocks,
        player: &PlayerState,
        newest_segment: Option<(f32, f32)>,
        orchestrator: &mut Orchestrator,
    ) {
        self.run_removals(clocks, orchestrator);
        self.prune();
        self.recycle_behind(clocks, player);

        self.spawn_traffic(player);
        self.spawn_hazard_wave(player);
        self.spawn_meteor_wave(clocks, player, newest_segment, orchestrator);

        self.state.live_hazards = self.hazards.live_vehicles();
    }

    fn run_removals(&mut self, clocks: &Clocks, orchestrator: &mut Orchestrator) {
        for actor in self.removals.drain_due(clocks) {
            match actor {
                ActorRef::Traffic(handle) => {
                    self.pool.destroy(handle);
                }
                ActorRef::Hazard(id) => {
                    self.remove_hazard_now(id, orchestrator);
                }
            }
        }
    }

    /// Drop roster entries whose actor no longer exists
    fn prune(&mut self) {
        let pool = &self.pool;
        let hazards = &self.hazards;
        self.roster.retain(|actor| match *actor {
            ActorRef::Traffic(handle) => pool.is_active(handle),
            ActorRef::Hazard(id) => hazards.contains(id),
        });
    }

    fn recycle_behind(&mut self, clocks: &Clocks, player: &PlayerState) {
        let limit = player.progress() - self.traffic.recycle_distance;
        let behind: Vec<ActorRef> = self
            .roster
            .iter()
            .copied()
            .filter(|actor| {
                self.actor_position(*actor)
                    .map(|p| p.z < limit)
                    .unwrap_or(false)
            })
            .collect();
        for actor in behind {
            self.release_actor(clocks, actor);
        }
    }

    /// Give an actor back: pooled cars return to the free list, hazards are
    /// destroyed after the grace delay. Returns `false` for unknown actors.
    pub fn release_actor(&mut self, clocks: &Clocks, actor: ActorRef) -> bool {
        self.roster.retain(|a| *a != actor);
        match actor {
            ActorRef::Traffic(handle) => self.pool.release(handle),
            ActorRef::Hazard(id) => {
                if !self.hazards.contains(id) {
                    return false;
                }
                if !self.removals.any(|a| *a == actor) {
                    self.removals.schedule(
                        clocks,
                        ClockDomain::Sim,
                        self.hazard_tuning.release_grace,
                        actor,
                    );
                }
                true
            }
        }
    }

    /// Mark an actor doomed and remove it after `delay` simulated seconds.
    /// The first request wins.
    pub fn destroy_after(&mut self, clocks: &Clocks, actor: ActorRef, delay: f32) -> bool {
        let marked = match actor {
            ActorRef::Traffic(handle) => match self.pool.get_mut(handle) {
                Some(entity) if entity.active && !entity.data.doomed => {
                    entity.data.doomed = true;
                    true
                }
                _ => false,
            },
            ActorRef::Hazard(id) => match self.hazards.get_mut(id) {
                Some(hazard) if !hazard.doomed => {
                    hazard.doomed = true;
                    true
                }
                _ => false,
            },
        };
        if marked {
            self.removals.schedule(clocks, ClockDomain::Sim, delay, actor);
        }
        marked
    }

    /// Remove a hazard immediately, releasing its ambient registration
    pub fn remove_hazard_now(&mut self, id: HazardId, orchestrator: &mut Orchestrator) -> bool {
        match self.hazards.remove(id) {
            Some(actor) => {
                release_ambient(&actor, orchestrator);
                true
            }
            None => false,
        }
    }

    /// Release a hazard's ambient registration early (e.g. on impact)
    pub fn release_ambient_of(&mut self, id: HazardId, orchestrator: &mut Orchestrator) {
        if let Some(actor) = self.hazards.get_mut(id) {
            if actor.darkens_sky {
                actor.darkens_sky = false;
                orchestrator.ambient_mut().unregister();
            }
        }
    }

    fn actor_position(&self, actor: ActorRef) -> Option<Vec3> {
        match actor {
            ActorRef::Traffic(handle) => self
                .pool
                .get(handle)
                .filter(|e| e.active)
                .map(|e| e.transform.position),
            ActorRef::Hazard(id) => self.hazards.get(id).map(HazardActor::position),
        }
    }

    fn random_lane(&mut self) -> f32 {
        let lanes = &self.traffic.lanes;
        if lanes.is_empty() {
            return 0.0;
        }
        lanes[self.rng.random_range(0..lanes.len())]
    }

    /// Place a pooled car at (`x`, lane height, `z`) facing the player
    fn place_car(&mut self, x: f32, z: f32) -> Option<EntityHandle> {
        let transform = Transform::facing(Vec3::new(x, self.traffic.lane_y, z), TRACK_BACK);
        let handle = self
            .pool
            .acquire(PrototypeSelector::Any, transform, &mut self.rng)?;
        self.roster.push(ActorRef::Traffic(handle));
        Some(handle)
    }

    /// Place a hazard vehicle with a weighted-random profile
    fn place_hazard(&mut self, x: f32, z: f32) -> Option<HazardId> {
        let profile = self.pick_profile()?.clone();
        let position = Vec3::new(
            x,
            self.traffic.lane_y + self.hazard_tuning.spawn_height_offset,
            z,
        );
        let id = self.hazards.spawn(
            HazardKind::Vehicle,
            &profile,
            Transform::facing(position, TRACK_BACK),
        );
        self.roster.push(ActorRef::Hazard(id));
        log::debug!("Hazard vehicle {:?} ({}) at {:?}", id, profile.name, position);
        Some(id)
    }

    fn pick_profile(&mut self) -> Option<&HazardProfile> {
        let profiles = &self.hazard_tuning.profiles;
        let total: f32 = profiles.iter().map(|p| p.weight.max(0.0)).sum();
        if profiles.is_empty() {
            return None;
        }
        if total <= 0.0 {
            return profiles.first();
        }
        let mut roll = self.rng.random::<f32>() * total;
        for profile in profiles {
            let weight = profile.weight.max(0.0);
            if roll < weight {
                return Some(profile);
            }
            roll -= weight;
        }
        profiles.last()
    }

    /// Regular traffic: fill the window ahead of the player
    fn spawn_traffic(&mut self, player: &PlayerState) {
        if !self.traffic_enabled() {
            return;
        }
        let window_end = player.progress() + self.traffic.respawn_window;
        while self.state.traffic_frontier < window_end {
            let x = self.random_lane();
            let jitter = self.traffic.jitter;
            let z = self.state.traffic_frontier + random_between(&mut self.rng, -jitter, jitter);
            if self.place_car(x, z).is_some() {
                self.state.traffic_spawned += 1;
            }
            let step = self.traffic.step;
            self.state.traffic_frontier += random_between(&mut self.rng, step.min, step.max);
        }
    }

    /// Hazard vehicle waves, triggered by distance. Waves ignore the live cap.
    fn spawn_hazard_wave(&mut self, player: &PlayerState) {
        if !self.hazards_enabled() || player.progress() < self.state.hazard_frontier {
            return;
        }
        let t = &self.hazard_tuning;
        let (size, ahead, gap) = (t.wave_size, t.wave_ahead, t.wave_gap);
        let count = random_count(&mut self.rng, size.min, size.max);
        for _ in 0..count {
            let x = self.random_lane();
            let z = player.progress() + random_between(&mut self.rng, ahead.min, ahead.max);
            self.place_hazard(x, z);
        }
        self.state.hazard_frontier = player.progress() + random_between(&mut self.rng, gap.min, gap.max);
        self.state.waves_spawned += 1;
        log::info!(
            "Hazard wave of {} at z {:.0}; next at {:.0}",
            count,
            player.progress(),
            self.state.hazard_frontier
        );
    }

    /// Timed meteor waves near the newest segment
    fn spawn_meteor_wave(
        &mut self,
        clocks: &Clocks,
        player: &PlayerState,
        newest_segment: Option<(f32, f32)>,
        orchestrator: &mut Orchestrator,
    ) {
        let Some(due) = self.state.next_meteor_at else {
            return;
        };
        if clocks.sim() < due {
            return;
        }
        let delay = self.next_meteor_delay();
        self.state.next_meteor_at = Some(clocks.sim() + delay as f64);

        let (Some(meteors), Some(profile), Some((start, end))) =
            (self.meteors.clone(), self.meteor_profile.clone(), newest_segment)
        else {
            return;
        };
        let count = random_count(&mut self.rng, meteors.wave_size.min, meteors.wave_size.max);
        let mid = (start + end) * 0.5;
        let origin = player.position;
        for _ in 0..count {
            let spawn = Vec3::new(
                origin.x + random_between(&mut self.rng, -meteors.spread, meteors.spread),
                origin.y + meteors.spawn_height,
                mid + random_between(&mut self.rng, meteors.z_jitter.min, meteors.z_jitter.max),
            );
            let aim = origin
                + Vec3::new(
                    random_between(
                        &mut self.rng,
                        -meteors.aim_lateral_jitter,
                        meteors.aim_lateral_jitter,
                    ),
                    -meteors.aim_drop,
                    random_between(&mut self.rng, meteors.aim_ahead.min, meteors.aim_ahead.max),
                );
            let dir = (aim - spawn).normalize_or_zero();
            let id = self
                .hazards
                .spawn(HazardKind::Meteor, &profile, Transform::facing(spawn, dir));
            let spin = random_in_unit_sphere(&mut self.rng) * meteors.spin;
            if let Some(actor) = self.hazards.get_mut(id) {
                actor.velocity = dir * meteors.speed;
                actor.spin = spin;
                actor.darkens_sky = true;
                orchestrator.ambient_mut().register();
            }
        }
        self.state.meteor_waves += 1;
        log::info!("Meteor wave of {} over segment at z {:.0}", count, mid);
    }

    /// Fixed tick: drive traffic, steer hazards, drop what despawned
    pub fn fixed_tick(&mut self, dt: f32, player: &PlayerState, orchestrator: &mut Orchestrator) {
        for entity in self.pool.iter_active_mut() {
            entity.transform.position += TRACK_BACK * entity.data.speed * dt;
        }

        for actor in self.hazards.steer_all(player, dt) {
            log::debug!("{:?} {:?} despawned behind player", actor.kind, actor.id);
            release_ambient(&actor, orchestrator);
        }

        if let Some(kill_height) = self.meteors.as_ref().map(|m| m.kill_height) {
            let fallen = self
                .hazards
                .remove_where(|a| a.kind == HazardKind::Meteor && a.position().y < kill_height);
            for actor in fallen {
                release_ambient(&actor, orchestrator);
            }
        }
    }

    /// Tear everything down (pool returns to all-free)
    pub fn clear(&mut self, orchestrator: &mut Orchestrator) {
        for actor in self.hazards.clear() {
            release_ambient(&actor, orchestrator);
        }
        for actor in std::mem::take(&mut self.roster) {
            if let ActorRef::Traffic(handle) = actor {
                self.pool.release(handle);
            }
        }
        self.removals.clear();
        self.state.live_hazards = 0;
    }

    pub fn pool(&self) -> &EntityPool<TrafficCar> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn hazards(&self) -> &HazardRoster {
        &self.hazards
    }

    pub fn roster(&self) -> &[ActorRef] {
        &self.roster
    }

    pub fn state(&self) -> &SpawnScheduleState {
        &self.state
    }
}

fn release_ambient(actor: &HazardActor, orchestrator: &mut Orchestrator) {
    if actor.darkens_sky {
        orchestrator.ambient_mut().unregister();
    }
}

impl SegmentListener for SpawnScheduler {
    fn spawn_on_segment(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
        let (lo, hi) = inner_range(start, end, self.traffic.segment_margin);
        let count = random_count(
            &mut self.rng,
            self.traffic.segment_count.min,
            self.traffic.segment_count.max,
        );
        let mut placed = Vec::new();
        for _ in 0..count {
            let x = self.random_lane();
            let z = random_between(&mut self.rng, lo, hi);
            let hazard_roll = self.rng.random::<f32>() < self.traffic.segment_hazard_chance;
            let under_cap = self.hazards.live_vehicles() < self.hazard_tuning.max_live;
            if hazard_roll && self.hazards_enabled() && under_cap {
                if let Some(id) = self.place_hazard(x, z) {
                    placed.push(ActorRef::Hazard(id));
                }
            } else if self.traffic_enabled() {
                if let Some(handle) = self.place_car(x, z) {
                    placed.push(ActorRef::Traffic(handle));
                }
            }
        }
        self.state.live_hazards = self.hazards.live_vehicles();
        placed
    }

    fn notify_segment_spawned(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
        if !self.hazards_enabled() {
            return Vec::new();
        }
        if self.hazards.live_vehicles() >= self.hazard_tuning.max_live {
            log::trace!("Hazard cap reached; skipping roll for segment at {:.0}", start);
            return Vec::new();
        }
        if self.rng.random::<f32>() >= self.hazard_tuning.segment_chance {
            return Vec::new();
        }
        let (lo, hi) = inner_range(start, end, self.traffic.segment_margin);
        let x = self.random_lane();
        let z = random_between(&mut self.rng, lo, hi);
        let placed = self
            .place_hazard(x, z)
            .map(ActorRef::Hazard)
            .into_iter()
            .collect();
        self.state.live_hazards = self.hazards.live_vehicles();
        placed
    }
}
