//! Track segment streaming
//!
//! Segments are laid end to end along +Z on a fixed cadence. Each new
//! segment asks its [`SegmentListener`] to populate it and gets a handful of
//! sprint pickups. Teardown happens only when the player crosses a segment's
//! end trigger, after a grace delay.

use std::collections::VecDeque;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::bounds::Bounds;
use super::clock::{ClockDomain, Clocks, TaskQueue};
use super::state::{ActorRef, PickupId, SegmentId};
use crate::tuning::{PickupTuning, SegmentPrototype, SegmentTuning, Tuning};
use crate::{random_between, random_count};

/// Receives each new segment exactly once
pub trait SegmentListener {
    /// Populate a new segment spanning `[start, end]`
    fn spawn_on_segment(&mut self, start: f32, end: f32) -> Vec<ActorRef>;

    /// Independent hazard roll for a new segment
    fn notify_segment_spawned(&mut self, start: f32, end: f32) -> Vec<ActorRef>;
}

/// A contiguous slice of track
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSegment {
    pub id: SegmentId,
    pub start: f32,
    pub end: f32,
    /// Player crossing this coordinate fires the end trigger
    pub trigger_z: f32,
    /// Actors placed when the segment was created
    pub roster: Vec<ActorRef>,
    pub pickups: Vec<PickupId>,
    pub trigger_fired: bool,
    pub destroy_pending: bool,
}

impl WorldSegment {
    #[inline]
    pub fn length(&self) -> f32 {
        self.end - self.start
    }

    #[inline]
    pub fn midpoint(&self) -> f32 {
        (self.start + self.end) * 0.5
    }
}

/// Sprint power-up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub id: PickupId,
    pub segment: SegmentId,
    pub position: Vec3,
    /// Simulated time the pickup disappears
    pub expires_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentTask {
    Destroy(SegmentId),
    Expire(PickupId),
}

/// Streams segments ahead of the player
#[derive(Debug, Clone)]
pub struct SegmentStreamer {
    tuning: SegmentTuning,
    pickup_tuning: Option<PickupTuning>,
    prototype: Option<SegmentPrototype>,
    /// Resolved on first spawn
    length: Option<f32>,
    frontier: f32,
    next_spawn_at: f64,
    segments: VecDeque<WorldSegment>,
    pickups: Vec<Pickup>,
    tasks: TaskQueue<SegmentTask>,
    rng: Pcg32,
    next_segment_id: u32,
    next_pickup_id: u32,
}

impl SegmentStreamer {
    pub fn new(tuning: &Tuning, seed: u64) -> Self {
        let prototype = tuning.segments.prototype.clone();
        if prototype.is_none() {
            log::error!("No segment prototype configured; segment streaming disabled");
        }
        Self {
            tuning: tuning.segments.clone(),
            pickup_tuning: tuning.pickups.clone(),
            prototype,
            length: None,
            frontier: tuning.segments.origin_z,
            next_spawn_at: 0.0,
            segments: VecDeque::new(),
            pickups: Vec::new(),
            tasks: TaskQueue::new(),
            rng: Pcg32::seed_from_u64(seed),
            next_segment_id: 1,
            next_pickup_id: 1,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.prototype.is_some()
    }

    /// Length of one segment; measured from the prototype's renderables
    /// when auto-measurement is on, else the configured constant
    pub fn segment_length(&mut self) -> f32 {
        if let Some(length) = self.length {
            return length;
        }
        let length = match (&self.prototype, self.tuning.auto_measure) {
            (Some(prototype), true) => match measure(prototype) {
                Some(measured) => measured,
                None => {
                    log::warn!(
                        "Segment prototype '{}' has no renderables; using length {}",
                        prototype.name,
                        self.tuning.length
                    );
                    self.tuning.length
                }
            },
            _ => self.tuning.length,
        };
        self.length = Some(length);
        length
    }

    /// Startup burst: spawn the configured number of segments synchronously
    /// and start the cadence
    pub fn warm_up(&mut self, clocks: &Clocks, listener: &mut impl SegmentListener) {
        for _ in 0..self.tuning.startup_segments {
            self.spawn_next(clocks, listener);
        }
        self.next_spawn_at =
            clocks.now(self.tuning.cadence_clock) + self.tuning.spawn_interval as f64;
        log::info!(
            "Segment streamer warmed up: {} segments, frontier {:.1}",
            self.segments.len(),
            self.frontier
        );
    }

    /// Per-frame update: run due teardown tasks, then the spawn cadence
    pub fn update(&mut self, clocks: &Clocks, listener: &mut impl SegmentListener) {
        for task in self.tasks.drain_due(clocks) {
            match task {
                SegmentTask::Destroy(id) => self.destroy_now(id),
                SegmentTask::Expire(id) => {
                    if self.remove_pickup(id).is_some() {
                        log::debug!("Pickup {:?} expired", id);
                    }
                }
            }
        }

        let now = clocks.now(self.tuning.cadence_clock);
        if self.is_enabled() && now >= self.next_spawn_at {
            self.spawn_next(clocks, listener);
            self.next_spawn_at = now + self.tuning.spawn_interval as f64;
        }
    }

    /// Instantiate the next segment at the frontier
    pub fn spawn_next(
        &mut self,
        clocks: &Clocks,
        listener: &mut impl SegmentListener,
    ) -> Option<SegmentId> {
        if !self.is_enabled() {
            return None;
        }
        let length = self.segment_length();
        let start = self.frontier;
        let end = start + length;
        let id = SegmentId(self.next_segment_id);
        self.next_segment_id += 1;
        self.frontier += length - self.tuning.overlap;

        let mut roster = listener.spawn_on_segment(start, end);
        roster.extend(listener.notify_segment_spawned(start, end));
        let pickups = self.place_pickups(clocks, id, start, end);

        log::debug!(
            "Segment {:?} spawned at [{:.1}, {:.1}] with {} actors, {} pickups",
            id,
            start,
            end,
            roster.len(),
            pickups.len()
        );
        self.segments.push_back(WorldSegment {
            id,
            start,
            end,
            trigger_z: end,
            roster,
            pickups,
            trigger_fired: false,
            destroy_pending: false,
        });
        Some(id)
    }

    fn place_pickups(&mut self, clocks: &Clocks, segment: SegmentId, start: f32, end: f32) -> Vec<PickupId> {
        let Some(tuning) = &self.pickup_tuning else {
            return Vec::new();
        };
        if tuning.lanes.is_empty() {
            return Vec::new();
        }
        let count = random_count(&mut self.rng, tuning.count.min, tuning.count.max);
        let (lo, hi) = inner_range(start, end, tuning.margin);
        let mut placed = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let lane = tuning.lanes[self.rng.random_range(0..tuning.lanes.len())];
            let z = random_between(&mut self.rng, lo, hi);
            let id = PickupId(self.next_pickup_id);
            self.next_pickup_id += 1;
            self.pickups.push(Pickup {
                id,
                segment,
                position: Vec3::new(lane, tuning.height, z),
                expires_at: clocks.sim() + tuning.lifetime as f64,
            });
            self.tasks
                .schedule(clocks, ClockDomain::Sim, tuning.lifetime, SegmentTask::Expire(id));
            placed.push(id);
        }
        placed
    }

    /// Mark a segment's end trigger as fired. Returns `false` if it already was.
    pub fn fire_trigger(&mut self, id: SegmentId) -> bool {
        match self.segments.iter_mut().find(|s| s.id == id) {
            Some(segment) if !segment.trigger_fired => {
                segment.trigger_fired = true;
                true
            }
            _ => false,
        }
    }

    /// Schedule teardown on the simulated clock. A missing or non-positive
    /// delay uses the configured default. Duplicate requests are ignored
    /// (the first delay wins); unknown ids return `false`.
    pub fn request_destroy(&mut self, clocks: &Clocks, id: SegmentId, delay: Option<f32>) -> bool {
        let Some(segment) = self.segments.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        if segment.destroy_pending {
            return false;
        }
        segment.destroy_pending = true;
        let delay = delay
            .filter(|d| *d > 0.0)
            .unwrap_or(self.tuning.destroy_delay);
        self.tasks
            .schedule(clocks, ClockDomain::Sim, delay, SegmentTask::Destroy(id));
        log::debug!("Segment {:?} destroy scheduled in {:.2}s", id, delay);
        true
    }

    fn destroy_now(&mut self, id: SegmentId) {
        let Some(index) = self.segments.iter().position(|s| s.id == id) else {
            return;
        };
        if let Some(segment) = self.segments.remove(index) {
            self.pickups.retain(|p| p.segment != segment.id);
            log::debug!("Segment {:?} destroyed", segment.id);
        }
    }

    /// Remove a pickup the player touched
    pub fn collect_pickup(&mut self, id: PickupId) -> Option<Pickup> {
        self.remove_pickup(id)
    }

    fn remove_pickup(&mut self, id: PickupId) -> Option<Pickup> {
        let index = self.pickups.iter().position(|p| p.id == id)?;
        let pickup = self.pickups.remove(index);
        if let Some(segment) = self.segments.iter_mut().find(|s| s.id == pickup.segment) {
            segment.pickups.retain(|p| *p != id);
        }
        Some(pickup)
    }

    /// Sprint duration granted by pickups
    pub fn sprint_duration(&self) -> f32 {
        self.pickup_tuning
            .as_ref()
            .map(|p| p.sprint_duration)
            .unwrap_or(0.0)
    }

    /// Tear everything down immediately
    pub fn clear(&mut self) {
        self.segments.clear();
        self.pickups.clear();
        self.tasks.clear();
        self.frontier = self.tuning.origin_z;
    }

    pub fn segments(&self) -> impl Iterator<Item = &WorldSegment> {
        self.segments.iter()
    }

    pub fn get(&self, id: SegmentId) -> Option<&WorldSegment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Most recently spawned segment
    pub fn newest(&self) -> Option<&WorldSegment> {
        self.segments.back()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn pickups(&self) -> &[Pickup] {
        &self.pickups
    }

    /// Coordinate the next segment starts at
    #[inline]
    pub fn frontier(&self) -> f32 {
        self.frontier
    }
}

/// Z extent of the union of every renderable
fn measure(prototype: &SegmentPrototype) -> Option<f32> {
    Bounds::union_all(&prototype.renderables)
        .map(|b| b.size().z)
        .filter(|len| *len > 0.0)
}

/// `[start + margin, end - margin]`, collapsing to the midpoint if inverted
pub(crate) fn inner_range(start: f32, end: f32, margin: f32) -> (f32, f32) {
    let lo = start + margin;
    let hi = end - margin;
    if lo <= hi {
        (lo, hi)
    } else {
        let mid = (start + end) * 0.5;
        (mid, mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call and places nothing
    #[derive(Default)]
    struct Recorder {
        spawned: Vec<(f32, f32)>,
        notified: Vec<(f32, f32)>,
    }

    impl SegmentListener for Recorder {
        fn spawn_on_segment(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
            self.spawned.push((start, end));
            Vec::new()
        }

        fn notify_segment_spawned(&mut self, start: f32, end: f32) -> Vec<ActorRef> {
            self.notified.push((start, end));
            Vec::new()
        }
    }

    fn tuning() -> Tuning {
        let mut tuning = Tuning::full();
        tuning.segments.startup_segments = 3;
        tuning
    }

    #[test]
    fn test_frontier_spacing_is_exact() {
        let mut streamer = SegmentStreamer::new(&tuning(), 1);
        let mut listener = Recorder::default();
        let clocks = Clocks::new();
        streamer.warm_up(&clocks, &mut listener);

        let starts: Vec<f32> = streamer.segments().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 199.5, 399.0]);
        assert_eq!(streamer.frontier(), 598.5);
        for pair in starts.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_listener_called_once_per_segment() {
        let mut streamer = SegmentStreamer::new(&tuning(), 1);
        let mut listener = Recorder::default();
        let mut clocks = Clocks::new();
        streamer.warm_up(&clocks, &mut listener);
        assert_eq!(listener.spawned.len(), 3);

        // Cadence runs on the real clock: slow motion does not delay it
        clocks.advance(2.0, 0.4);
        streamer.update(&clocks, &mut listener);
        assert_eq!(listener.spawned.len(), 4);
        assert_eq!(listener.spawned, listener.notified);

        clocks.advance(1.0, 1.0);
        streamer.update(&clocks, &mut listener);
        assert_eq!(listener.spawned.len(), 4);
    }

    #[test]
    fn test_measured_length_and_fallback() {
        let mut tuning = tuning();
        tuning.segments.prototype = Some(SegmentPrototype {
            name: "short".to_string(),
            renderables: vec![Bounds::new(Vec3::ZERO, Vec3::new(10.0, 1.0, 120.0))],
        });
        let mut streamer = SegmentStreamer::new(&tuning, 1);
        assert_eq!(streamer.segment_length(), 120.0);

        tuning.segments.prototype = Some(SegmentPrototype {
            name: "empty".to_string(),
            renderables: Vec::new(),
        });
        let mut streamer = SegmentStreamer::new(&tuning, 1);
        assert_eq!(streamer.segment_length(), 200.0);
    }

    #[test]
    fn test_destroy_is_idempotent_first_wins() {
        let mut streamer = SegmentStreamer::new(&tuning(), 1);
        let mut listener = Recorder::default();
        let mut clocks = Clocks::new();
        streamer.warm_up(&clocks, &mut listener);
        let first = streamer.segments().next().unwrap().id;

        assert!(streamer.request_destroy(&clocks, first, Some(2.0)));
        assert!(!streamer.request_destroy(&clocks, first, Some(0.0)));
        assert!(!streamer.request_destroy(&clocks, SegmentId(999), None));

        clocks.advance(1.0, 1.0);
        streamer.update(&clocks, &mut listener);
        assert!(streamer.get(first).is_some());

        clocks.advance(1.0, 1.0);
        streamer.update(&clocks, &mut listener);
        assert!(streamer.get(first).is_none());
        assert!(streamer.pickups().iter().all(|p| p.segment != first));
    }

    #[test]
    fn test_non_positive_delay_uses_default() {
        let mut streamer = SegmentStreamer::new(&tuning(), 1);
        let mut listener = Recorder::default();
        let mut clocks = Clocks::new();
        streamer.warm_up(&clocks, &mut listener);
        let ids: Vec<SegmentId> = streamer.segments().take(2).map(|s| s.id).collect();

        assert!(streamer.request_destroy(&clocks, ids[0], Some(0.0)));
        assert!(streamer.request_destroy(&clocks, ids[1], Some(-1.0)));
        clocks.advance(1.0, 1.0);
        streamer.update(&clocks, &mut listener);
        assert!(ids.iter().all(|id| streamer.get(*id).is_some()));

        clocks.advance(1.0, 1.0);
        streamer.update(&clocks, &mut listener);
        assert!(ids.iter().all(|id| streamer.get(*id).is_none()));
    }

    #[test]
    fn test_pickups_inside_segment_margins() {
        let mut tuning = tuning();
        tuning.segments.startup_segments = 20;
        let mut streamer = SegmentStreamer::new(&tuning, 9);
        streamer.warm_up(&Clocks::new(), &mut Recorder::default());

        for segment in streamer.segments() {
            assert!(segment.pickups.len() <= 2);
        }
        for pickup in streamer.pickups() {
            let segment = streamer.get(pickup.segment).unwrap();
            assert!(pickup.position.z >= segment.start + 10.0);
            assert!(pickup.position.z <= segment.end - 10.0);
            assert!([-6.0, -2.0, 2.0, 6.0].contains(&pickup.position.x));
            assert_eq!(pickup.position.y, 1.5);
        }
    }

    #[test]
    fn test_pickups_expire_on_sim_clock() {
        let mut tuning = tuning();
        tuning.pickups = Some(PickupTuning {
            count: crate::tuning::CountRange::new(2, 2),
            ..PickupTuning::default()
        });
        let mut streamer = SegmentStreamer::new(&tuning, 2);
        let mut listener = Recorder::default();
        let mut clocks = Clocks::new();
        streamer.warm_up(&clocks, &mut listener);
        assert_eq!(streamer.pickups().len(), 6);

        let id = streamer.pickups()[0].id;
        assert!(streamer.collect_pickup(id).is_some());
        assert!(streamer.collect_pickup(id).is_none());

        clocks.advance(20.0, 20.0);
        streamer.update(&clocks, &mut listener);
        assert!(streamer.pickups().is_empty());
    }

    #[test]
    fn test_missing_prototype_disables_streaming() {
        let mut tuning = tuning();
        tuning.segments.prototype = None;
        let mut streamer = SegmentStreamer::new(&tuning, 1);
        let mut listener = Recorder::default();
        streamer.warm_up(&Clocks::new(), &mut listener);
        assert!(!streamer.is_enabled());
        assert!(streamer.is_empty());
        assert!(listener.spawned.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut streamer = SegmentStreamer::new(&tuning(), 1);
        streamer.warm_up(&Clocks::new(), &mut Recorder::default());
        streamer.clear();
        assert!(streamer.is_empty());
        assert!(streamer.pickups().is_empty());
        assert_eq!(streamer.frontier(), 0.0);
    }
}
