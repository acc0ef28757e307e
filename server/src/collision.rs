//! Avatar-versus-soul overlap tests.
//!
//! A cheap broad phase keeps only collidable souls near the avatar, then the
//! narrow phase does an exact sphere test. Every soul that overlaps is handed
//! to `SoulManager::collect_soul`; callbacks fire once per collection that
//! actually started.

use crate::soul::SoulId;
use crate::soul_manager::SoulManager;
use skull_shared::config::GameConfig;
use skull_shared::vec3::{distance, distance_squared, Vec3};
use std::panic::{self, AssertUnwindSafe};

/// Emitted once per newly collected soul.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub soul_id: SoulId,
    pub avatar_position: Vec3,
    pub soul_position: Vec3,
    pub distance: f64,
}

/// Subscriber invoked for each collision. An `Err` is logged and does not
/// stop the remaining subscribers.
pub type CollisionCallback = Box<dyn FnMut(&CollisionEvent) -> Result<(), String> + Send>;

/// Handle returned by `add_collision_callback`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

pub struct CollisionResolver {
    avatar_radius: f64,
    broad_phase_radius: f64,
    callbacks: Vec<(CallbackId, CollisionCallback)>,
    next_callback_id: u32,
    /// Broad-phase survivors: id, position, collision radius
    candidates: Vec<(SoulId, Vec3, f64)>,
    event_buffer: Vec<CollisionEvent>,
}

impl CollisionResolver {
    pub fn new(avatar_radius: f64, broad_phase_radius: f64) -> Self {
        Self {
            avatar_radius: avatar_radius.max(0.0),
            broad_phase_radius: broad_phase_radius.max(0.0),
            callbacks: Vec::new(),
            next_callback_id: 1,
            candidates: Vec::new(),
            event_buffer: Vec::new(),
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        let config = config.sanitized();
        Self::new(config.avatar_radius, config.broad_phase_radius)
    }

    pub fn add_collision_callback(&mut self, callback: CollisionCallback) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id = self.next_callback_id.wrapping_add(1);
        self.callbacks.push((id, callback));
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove_collision_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cid, _)| *cid != id);
        self.callbacks.len() != before
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn avatar_radius(&self) -> f64 {
        self.avatar_radius
    }

    pub fn set_avatar_radius(&mut self, radius: f64) {
        if radius.is_finite() {
            self.avatar_radius = radius.max(0.0);
        }
    }

    pub fn broad_phase_radius(&self) -> f64 {
        self.broad_phase_radius
    }

    pub fn set_broad_phase_radius(&mut self, radius: f64) {
        if radius.is_finite() {
            self.broad_phase_radius = radius.max(0.0);
        }
    }

    /// Collect every soul the avatar overlaps. Ids of souls whose collection
    /// started this call are appended to `collected`.
    pub fn resolve_into(
        &mut self,
        avatar_position: Vec3,
        registry: &mut SoulManager,
        collected: &mut Vec<SoulId>,
    ) {
        let mut candidates = std::mem::take(&mut self.candidates);
        candidates.clear();

        let broad_sq = self.broad_phase_radius * self.broad_phase_radius;
        candidates.extend(
            registry
                .collidable_souls()
                .filter(|soul| distance_squared(avatar_position, soul.position()) <= broad_sq)
                .map(|soul| (soul.id(), soul.position(), soul.collision_radius())),
        );

        let mut events = std::mem::take(&mut self.event_buffer);
        events.clear();

        for &(soul_id, soul_position, soul_radius) in &candidates {
            let d = distance(avatar_position, soul_position);
            if d > self.avatar_radius + soul_radius {
                continue;
            }
            // Only a collection that actually started counts
            if registry.collect_soul(soul_id) {
                collected.push(soul_id);
                events.push(CollisionEvent {
                    soul_id,
                    avatar_position,
                    soul_position,
                    distance: d,
                });
            }
        }

        for event in &events {
            self.notify(event);
        }

        self.event_buffer = events;
        self.candidates = candidates;
    }

    /// Allocating form of `resolve_into`.
    pub fn resolve(&mut self, avatar_position: Vec3, registry: &mut SoulManager) -> Vec<SoulId> {
        let mut collected = Vec::new();
        self.resolve_into(avatar_position, registry, &mut collected);
        collected
    }

    fn notify(&mut self, event: &CollisionEvent) {
        for (id, callback) in &mut self.callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Collision callback {:?} failed for soul {}: {}",
                        id,
                        event.soul_id,
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "Collision callback {:?} panicked for soul {}",
                        id,
                        event.soul_id
                    );
                }
            }
        }
    }
}
