//! Contact events
//!
//! Hosts with a physics engine feed contacts in through `TickInput`; the
//! built-in detector covers headless runs with simple sphere/box overlaps.

use glam::Vec3;

use super::bounds::Bounds;
use super::segment::SegmentStreamer;
use super::state::{EntityHandle, HazardId, HazardKind, PickupId, PlayerState, SegmentId, SurfaceTag};
use super::pool::PooledEntity;
use super::traffic::{SpawnScheduler, TrafficCar};
use crate::tuning::ColliderTuning;

/// One side of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collider {
    Player,
    Traffic(EntityHandle),
    Hazard(HazardId),
    /// End-of-segment trigger volume
    SegmentEnd(SegmentId),
    Pickup(PickupId),
    Surface(SurfaceTag),
}

/// Two colliders touching at `point`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub a: Collider,
    pub b: Collider,
    pub point: Vec3,
}

impl Contact {
    pub fn new(a: Collider, b: Collider, point: Vec3) -> Self {
        Self { a, b, point }
    }

    /// The collider paired with `side`, if `side` takes part
    pub fn other(&self, side: Collider) -> Option<Collider> {
        if self.a == side {
            Some(self.b)
        } else if self.b == side {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Overlap pass over everything the world tracks, in stable order
pub fn detect_contacts(
    player: &PlayerState,
    colliders: &ColliderTuning,
    traffic: &SpawnScheduler,
    segments: &SegmentStreamer,
) -> Vec<Contact> {
    let mut contacts = Vec::new();
    let p = player.position;
    let radius = colliders.player_radius;

    for car in traffic.pool().iter_active() {
        if car.data.doomed {
            continue;
        }
        let bounds = Bounds::from_center(car.transform.position, car.data.half_extents);
        if bounds.intersects_sphere(p, radius) {
            contacts.push(Contact::new(
                Collider::Player,
                Collider::Traffic(car.handle),
                bounds.closest_point(p),
            ));
        }
    }

    for hazard in traffic.hazards().iter() {
        if hazard.doomed {
            continue;
        }
        let position = hazard.position();
        match hazard.kind {
            HazardKind::Meteor => {
                let reach = radius + colliders.meteor_radius;
                if position.distance_squared(p) <= reach * reach {
                    let point = position + (p - position).normalize_or_zero() * colliders.meteor_radius;
                    contacts.push(Contact::new(Collider::Player, Collider::Hazard(hazard.id), point));
                } else if position.y - colliders.meteor_radius <= colliders.ground_height {
                    let point = Vec3::new(position.x, colliders.ground_height, position.z);
                    contacts.push(Contact::new(
                        Collider::Hazard(hazard.id),
                        Collider::Surface(SurfaceTag::Ground),
                        point,
                    ));
                }
            }
            HazardKind::Vehicle | HazardKind::Traffic => {
                let bounds = Bounds::from_center(position, colliders.vehicle_half_extents);
                if bounds.intersects_sphere(p, radius) {
                    contacts.push(Contact::new(
                        Collider::Player,
                        Collider::Hazard(hazard.id),
                        bounds.closest_point(p),
                    ));
                } else if let Some(car) = rammed_car(traffic, &bounds) {
                    contacts.push(Contact::new(
                        Collider::Hazard(hazard.id),
                        Collider::Traffic(car.handle),
                        bounds.closest_point(car.transform.position),
                    ));
                }
            }
        }
    }

    for segment in segments.segments() {
        if !segment.trigger_fired && p.z >= segment.trigger_z {
            contacts.push(Contact::new(
                Collider::Player,
                Collider::SegmentEnd(segment.id),
                Vec3::new(p.x, p.y, segment.trigger_z),
            ));
        }
    }

    let reach = radius + colliders.pickup_radius;
    for pickup in segments.pickups() {
        if pickup.position.distance_squared(p) <= reach * reach {
            contacts.push(Contact::new(Collider::Player, Collider::Pickup(pickup.id), pickup.position));
        }
    }

    contacts
}

/// First live traffic car overlapping a hazard vehicle's box
fn rammed_car<'a>(
    traffic: &'a SpawnScheduler,
    bounds: &Bounds,
) -> Option<&'a PooledEntity<TrafficCar>> {
    traffic.pool().iter_active().find(|car| {
        !car.data.doomed
            && Bounds::from_center(car.transform.position, car.data.half_extents).intersects(bounds)
    })
}
