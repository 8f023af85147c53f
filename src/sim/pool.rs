//! Reusable entity pool
//!
//! Entities are warmed up front and recycled instead of destroyed. When no
//! matching free entity exists the pool grows by one, so the configured size
//! is a soft target rather than a hard cap.
//!
//! Slots are addressed by generational handles. A slot destroyed by some other
//! system bumps its generation, so stale handles held by rosters or the free
//! list simply stop resolving and get skipped.

use std::collections::VecDeque;

use rand::Rng;

use super::state::{EntityHandle, Transform};

/// Where an entity currently hangs in the scene hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    PoolRoot,
    World,
}

/// Which prototype an acquire wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrototypeSelector {
    /// Whatever is free first; growth picks a random prototype
    Any,
    /// A specific prototype index
    Prototype(usize),
}

/// One pooled instance
#[derive(Debug, Clone)]
pub struct PooledEntity<T> {
    pub handle: EntityHandle,
    /// Index of the prototype this instance was built from
    pub prototype: usize,
    pub active: bool,
    pub parent: Parent,
    pub transform: Transform,
    /// Per-instance state, reset from the prototype on every activation
    pub data: T,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entity: Option<PooledEntity<T>>,
}

/// Pool bookkeeping snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Live instances (free + active)
    pub total: usize,
    pub free: usize,
    pub active: usize,
    /// Instances created on demand after warm-up
    pub grown: usize,
}

/// Fixed-reserve pool of entities cloned from a set of prototypes
#[derive(Debug, Clone)]
pub struct EntityPool<T> {
    prototypes: Vec<T>,
    slots: Vec<Slot<T>>,
    free: VecDeque<EntityHandle>,
    grown: usize,
}

impl<T: Clone> EntityPool<T> {
    pub fn new(prototypes: Vec<T>) -> Self {
        Self {
            prototypes,
            slots: Vec::new(),
            free: VecDeque::new(),
            grown: 0,
        }
    }

    /// Whether the pool has anything to instantiate
    pub fn has_prototypes(&self) -> bool {
        !self.prototypes.is_empty()
    }

    /// Pre-instantiate `count` free entities with random prototypes
    pub fn warm<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        if !self.has_prototypes() {
            return;
        }
        for _ in 0..count {
            let prototype = rng.random_range(0..self.prototypes.len());
            let handle = self.instantiate(prototype);
            self.free.push_back(handle);
        }
    }

    fn instantiate(&mut self, prototype: usize) -> EntityHandle {
        let data = self.prototypes[prototype].clone();
        // Reuse a destroyed slot before appending
        let index = match self.slots.iter().position(|s| s.entity.is_none()) {
            Some(i) => i,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entity: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        let handle = EntityHandle {
            index: index as u32,
            generation: slot.generation,
        };
        slot.entity = Some(PooledEntity {
            handle,
            prototype,
            active: false,
            parent: Parent::PoolRoot,
            transform: Transform::default(),
            data,
        });
        handle
    }

    /// Activate a free entity matching `selector` at `transform`, growing the
    /// pool when nothing matches. `None` only when the selector names a
    /// prototype that doesn't exist (or there are no prototypes at all).
    pub fn acquire<R: Rng + ?Sized>(
        &mut self,
        selector: PrototypeSelector,
        transform: Transform,
        rng: &mut R,
    ) -> Option<EntityHandle> {
        if !self.has_prototypes() {
            return None;
        }
        if let PrototypeSelector::Prototype(p) = selector {
            if p >= self.prototypes.len() {
                return None;
            }
        }

        // Drop stale entries from the front, then look for a match
        let mut found = None;
        let mut i = 0;
        while i < self.free.len() {
            let handle = self.free[i];
            let Some(entity) = self.get(handle) else {
                self.free.remove(i);
                continue;
            };
            let matches = match selector {
                PrototypeSelector::Any => true,
                PrototypeSelector::Prototype(p) => entity.prototype == p,
            };
            if matches {
                self.free.remove(i);
                found = Some(handle);
                break;
            }
            i += 1;
        }

        let handle = match found {
            Some(h) => h,
            None => {
                let prototype = match selector {
                    PrototypeSelector::Any => rng.random_range(0..self.prototypes.len()),
                    PrototypeSelector::Prototype(p) => p,
                };
                self.grown += 1;
                log::debug!("Pool grew to {} entities", self.stats().total + 1);
                self.instantiate(prototype)
            }
        };

        let prototype_data = {
            let entity = self.get(handle)?;
            self.prototypes[entity.prototype].clone()
        };
        let entity = self.get_mut(handle)?;
        entity.active = true;
        entity.parent = Parent::World;
        entity.transform = transform;
        entity.data = prototype_data;
        Some(handle)
    }

    /// Return an entity to the free list. Double release and stale handles
    /// are no-ops (returns `false`).
    pub fn release(&mut self, handle: EntityHandle) -> bool {
        let Some(entity) = self.get_mut(handle) else {
            return false;
        };
        if !entity.active {
            return false;
        }
        entity.active = false;
        entity.parent = Parent::PoolRoot;
        self.free.push_back(handle);
        true
    }

    /// Destroy an entity outright (e.g. another system blew it up). Any
    /// outstanding handles to it go stale.
    pub fn destroy(&mut self, handle: EntityHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.entity.is_none() {
            return false;
        }
        slot.entity = None;
        slot.generation = slot.generation.wrapping_add(1);
        true
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&PooledEntity<T>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entity.as_ref()
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut PooledEntity<T>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entity.as_mut()
    }

    pub fn is_active(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some_and(|e| e.active)
    }

    /// Whether `handle` currently sits in the free list
    pub fn is_free(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some_and(|e| !e.active) && self.free.contains(&handle)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &PooledEntity<T>> {
        self.slots
            .iter()
            .filter_map(|s| s.entity.as_ref())
            .filter(|e| e.active)
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut PooledEntity<T>> {
        self.slots
            .iter_mut()
            .filter_map(|s| s.entity.as_mut())
            .filter(|e| e.active)
    }

    pub fn stats(&self) -> PoolStats {
        let total = self.slots.iter().filter(|s| s.entity.is_some()).count();
        let active = self.iter_active().count();
        PoolStats {
            total,
            free: total - active,
            active,
            grown: self.grown,
        }
    }

    /// Tear the pool down; every handle goes stale
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.entity.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[derive(Debug, Clone, PartialEq)]
    struct Car {
        model: &'static str,
        dents: u32,
    }

    fn pool() -> EntityPool<Car> {
        EntityPool::new(vec![
            Car {
                model: "sedan",
                dents: 0,
            },
            Car {
                model: "van",
                dents: 0,
            },
        ])
    }

    #[test]
    fn test_acquire_reuses_free_entities() {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut pool = pool();
        pool.warm(3, &mut rng);
        assert_eq!(pool.stats().free, 3);

        let at = Transform::at(Vec3::new(1.0, 0.5, 50.0));
        let h = pool.acquire(PrototypeSelector::Any, at, &mut rng).unwrap();
        let entity = pool.get(h).unwrap();
        assert!(entity.active);
        assert_eq!(entity.parent, Parent::World);
        assert_eq!(entity.transform, at);
        assert_eq!(pool.stats().grown, 0);
        assert_eq!(pool.stats().total, 3);
    }

    #[test]
    fn test_grows_when_empty() {
        let mut rng = Pcg32::seed_from_u64(2);
        let mut pool = pool();
        pool.warm(1, &mut rng);
        let a = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng);
        let b = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng);
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.grown, 1);
        assert_eq!(stats.active, 2);
    }

    #[test]
    fn test_selector_matches_prototype() {
        let mut rng = Pcg32::seed_from_u64(3);
        let mut pool = pool();
        let h = pool
            .acquire(PrototypeSelector::Prototype(1), Transform::default(), &mut rng)
            .unwrap();
        assert_eq!(pool.get(h).unwrap().data.model, "van");
        assert!(
            pool.acquire(PrototypeSelector::Prototype(9), Transform::default(), &mut rng)
                .is_none()
        );
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut rng = Pcg32::seed_from_u64(4);
        let mut pool = pool();
        pool.warm(2, &mut rng);
        let h = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng).unwrap();
        assert!(pool.release(h));
        assert!(!pool.release(h));
        assert!(pool.is_free(h));
        assert_eq!(pool.get(h).unwrap().parent, Parent::PoolRoot);
        assert_eq!(pool.stats().free, 2);
    }

    #[test]
    fn test_reactivation_resets_instance_state() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut pool = pool();
        let h = pool
            .acquire(PrototypeSelector::Prototype(0), Transform::default(), &mut rng)
            .unwrap();
        pool.get_mut(h).unwrap().data.dents = 7;
        pool.release(h);
        let again = pool
            .acquire(PrototypeSelector::Prototype(0), Transform::default(), &mut rng)
            .unwrap();
        assert_eq!(again, h);
        assert_eq!(pool.get(again).unwrap().data.dents, 0);
    }

    #[test]
    fn test_destroyed_entities_are_skipped() {
        let mut rng = Pcg32::seed_from_u64(6);
        let mut pool = pool();
        pool.warm(1, &mut rng);
        let h = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng).unwrap();
        pool.release(h);
        assert!(pool.destroy(h));
        assert!(pool.get(h).is_none());
        assert!(!pool.release(h));

        // The stale free-list entry is skipped; a fresh entity is built
        let fresh = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng).unwrap();
        assert_ne!(fresh, h);
        assert!(pool.is_active(fresh));
        assert!(!pool.is_active(h));
    }

    #[test]
    fn test_no_prototypes_never_spawns() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut pool: EntityPool<Car> = EntityPool::new(Vec::new());
        pool.warm(5, &mut rng);
        assert!(pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng).is_none());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    proptest! {
        #[test]
        fn prop_pool_conservation(ops in proptest::collection::vec(any::<(bool, u8)>(), 0..200)) {
            let mut rng = Pcg32::seed_from_u64(42);
            let mut pool = pool();
            let initial = 4;
            pool.warm(initial, &mut rng);
            let mut roster: Vec<EntityHandle> = Vec::new();

            for (acquire, pick) in ops {
                if acquire {
                    let h = pool.acquire(PrototypeSelector::Any, Transform::default(), &mut rng).unwrap();
                    prop_assert!(!roster.contains(&h));
                    roster.push(h);
                } else if !roster.is_empty() {
                    let h = roster.remove(pick as usize % roster.len());
                    prop_assert!(pool.release(h));
                    // Double release is a no-op
                    prop_assert!(!pool.release(h));
                }

                let stats = pool.stats();
                prop_assert!(stats.active <= initial + stats.grown);
                prop_assert_eq!(stats.active, roster.len());
                for h in &roster {
                    prop_assert!(pool.is_active(*h));
                    prop_assert!(!pool.is_free(*h));
                }
            }
        }
    }
}
