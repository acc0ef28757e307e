//! Owns the active souls: spawn cadence, population cap, per-frame
//! animation, and recycling through the entity pool.

use crate::pool::{EntityPool, PoolHandle};
use crate::soul::{Soul, SoulBounds, SoulId, SoulMotion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skull_shared::config::{GameConfig, MIN_FIELD_SIZE, MIN_SPAWN_RATE};
use skull_shared::vec3::{clamp_horizontal, horizontal_length, Vec3};
use std::collections::HashMap;

/// Rejection-sampling attempts before falling back to a clamped sample
const SPAWN_SAMPLE_ATTEMPTS: usize = 16;

pub struct SoulManager {
    pool: EntityPool<Soul>,
    active: HashMap<SoulId, PoolHandle>,
    max_active: usize,
    spawn_rate: f64,
    spawn_accumulator: f64,
    spawning_paused: bool,
    field_half_x: f64,
    field_half_z: f64,
    /// Requested boundary; the effective one is limited by the field
    configured_radius: f64,
    spawn_height: (f64, f64),
    vertical_band: (f64, f64),
    next_id: SoulId,
    rng: ChaCha8Rng,
    removal_buffer: Vec<SoulId>,
    total_spawned: u32,
    total_collected: u32,
}

impl SoulManager {
    /// Build a registry from a sanitized config. Spawning starts paused.
    pub fn new(config: &GameConfig, rng_seed: u64) -> Self {
        let config = config.sanitized();
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);

        let max_active = config.max_souls as usize;
        let mut pool = EntityPool::new();
        pool.prewarm(max_active, || Soul::new(rng.gen()));

        Self {
            pool,
            active: HashMap::with_capacity(max_active),
            max_active,
            spawn_rate: config.spawn_rate,
            spawn_accumulator: 0.0,
            spawning_paused: true,
            field_half_x: config.field_half_x,
            field_half_z: config.field_half_z,
            configured_radius: config.soul_boundary_radius,
            spawn_height: (config.spawn_height_min, config.spawn_height_max),
            vertical_band: (config.soul_min_height, config.soul_max_height),
            next_id: 1,
            rng,
            removal_buffer: Vec::with_capacity(max_active),
            total_spawned: 0,
            total_collected: 0,
        }
    }

    /// Advance spawning, animate every soul, and return finished ones to
    /// the pool. At most one soul spawns per call.
    pub fn update(&mut self, dt: f64) {
        let dt = dt.max(0.0);

        if !self.spawning_paused {
            self.spawn_accumulator += dt;
            let interval = 1.0 / self.spawn_rate;
            if self.spawn_accumulator >= interval {
                if self.active.len() < self.max_active {
                    self.spawn_soul();
                } else {
                    // Full: hold one interval of credit so a freed slot
                    // refills promptly without a burst.
                    self.spawn_accumulator = interval;
                }
            }
        }

        for &handle in self.active.values() {
            if let Some(soul) = self.pool.get_mut(handle) {
                soul.update(dt);
            }
        }

        let mut finished = std::mem::take(&mut self.removal_buffer);
        finished.clear();
        finished.extend(
            self.active
                .iter()
                .filter(|&(_, &h)| self.pool.get(h).map_or(true, Soul::is_removable))
                .map(|(&id, _)| id),
        );
        for id in &finished {
            if let Some(handle) = self.active.remove(id) {
                self.pool.release(handle);
            }
        }
        self.removal_buffer = finished;
    }

    /// Spawn one soul at a random spot. `None` when paused or full.
    pub fn spawn_soul(&mut self) -> Option<SoulId> {
        // Refused spawns must not draw from the RNG
        if !self.can_spawn() {
            return None;
        }
        let position = self.random_spawn_position();
        self.spawn_with(position, None)
    }

    /// Scripted placement: spawn a soul anchored at `position` with fixed
    /// motion. Same pause and capacity rules as `spawn_soul`.
    pub fn spawn_soul_at(&mut self, position: Vec3, motion: SoulMotion) -> Option<SoulId> {
        self.spawn_with(position, Some(motion))
    }

    fn spawn_with(&mut self, position: Vec3, motion: Option<SoulMotion>) -> Option<SoulId> {
        if !self.can_spawn() {
            return None;
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let bounds = self.bounds();
        let seed: u64 = self.rng.gen();
        let handle = self.pool.acquire_with(|| Soul::new(seed));
        if let Some(soul) = self.pool.get_mut(handle) {
            soul.activate(id, position, bounds);
            if let Some(motion) = motion {
                soul.set_motion(motion);
            }
        }

        self.active.insert(id, handle);
        self.spawn_accumulator = 0.0;
        self.total_spawned += 1;
        tracing::trace!("Spawned soul {} ({} active)", id, self.active.len());
        Some(id)
    }

    fn can_spawn(&self) -> bool {
        !self.spawning_paused && self.active.len() < self.max_active
    }

    /// Boundary in effect for the current field size.
    fn boundary_radius(&self) -> f64 {
        self.configured_radius
            .clamp(MIN_FIELD_SIZE, self.field_half_x.min(self.field_half_z))
    }

    fn random_spawn_position(&mut self) -> Vec3 {
        let radius = self.boundary_radius();
        let (min_y, max_y) = self.spawn_height;
        let y = min_y + self.rng.gen::<f64>() * (max_y - min_y);

        let mut candidate = Vec3::new(0.0, y, 0.0);
        for _ in 0..SPAWN_SAMPLE_ATTEMPTS {
            candidate.x = self.rng.gen_range(-self.field_half_x..=self.field_half_x);
            candidate.z = self.rng.gen_range(-self.field_half_z..=self.field_half_z);
            if horizontal_length(candidate) <= radius {
                return candidate;
            }
        }
        clamp_horizontal(candidate, radius)
    }

    /// Trigger collection of a soul. `false` for unknown ids and for souls
    /// already collecting. This is the only way to change a soul's state
    /// from outside the registry.
    pub fn collect_soul(&mut self, id: SoulId) -> bool {
        let Some(&handle) = self.active.get(&id) else {
            return false;
        };
        let started = self
            .pool
            .get_mut(handle)
            .map_or(false, |soul| soul.start_collection());
        if started {
            self.total_collected += 1;
        }
        started
    }

    pub fn pause_spawning(&mut self) {
        self.spawning_paused = true;
        self.spawn_accumulator = 0.0;
    }

    pub fn resume_spawning(&mut self, rate: Option<f64>) {
        if let Some(rate) = rate {
            self.set_spawn_rate(rate);
        }
        self.spawning_paused = false;
        self.spawn_accumulator = 0.0;
    }

    /// Send every active soul back to the pool, whatever its state.
    pub fn clear_all_souls(&mut self) {
        for (_, handle) in self.active.drain() {
            self.pool.release(handle);
        }
        self.spawn_accumulator = 0.0;
    }

    /// Drop every soul and run the pool's disposal hook.
    pub fn dispose(&mut self) {
        self.active.clear();
        self.pool.dispose();
        self.spawn_accumulator = 0.0;
    }

    pub fn set_max_souls(&mut self, max: usize) {
        self.max_active = max.max(1);
    }

    pub fn set_spawn_rate(&mut self, rate: f64) {
        if rate.is_finite() {
            self.spawn_rate = rate.max(MIN_SPAWN_RATE);
        }
    }

    /// Resize the spawn rectangle. The effective boundary radius follows
    /// the new size on the next spawn.
    pub fn set_field_size(&mut self, half_x: f64, half_z: f64) {
        if half_x.is_finite() {
            self.field_half_x = half_x.max(MIN_FIELD_SIZE);
        }
        if half_z.is_finite() {
            self.field_half_z = half_z.max(MIN_FIELD_SIZE);
        }
    }

    /// Souls never leave this radius, limited to the narrower field axis so
    /// every soul stays where the avatar can reach it.
    pub fn set_boundary_radius(&mut self, radius: f64) {
        if radius.is_finite() {
            self.configured_radius = radius.max(MIN_FIELD_SIZE);
        }
    }

    /// Set the spawn height band; it is kept inside the vertical band souls
    /// are clamped to.
    pub fn set_spawn_height_range(&mut self, min: f64, max: f64) {
        if !min.is_finite() || !max.is_finite() {
            return;
        }
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let (band_lo, band_hi) = self.vertical_band;
        self.spawn_height = (lo.clamp(band_lo, band_hi), hi.clamp(band_lo, band_hi));
    }

    pub fn bounds(&self) -> SoulBounds {
        SoulBounds {
            max_radius: self.boundary_radius(),
            min_y: self.vertical_band.0,
            max_y: self.vertical_band.1,
        }
    }

    pub fn soul(&self, id: SoulId) -> Option<&Soul> {
        self.active.get(&id).and_then(|&h| self.pool.get(h))
    }

    /// All active souls, in no particular order.
    pub fn souls(&self) -> impl Iterator<Item = &Soul> {
        self.active.values().filter_map(|&h| self.pool.get(h))
    }

    /// Active souls that can still be collected.
    pub fn collidable_souls(&self) -> impl Iterator<Item = &Soul> {
        self.souls().filter(|s| s.is_collidable())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }

    pub fn max_souls(&self) -> usize {
        self.max_active
    }

    pub fn spawn_rate(&self) -> f64 {
        self.spawn_rate
    }

    pub fn spawn_accumulator(&self) -> f64 {
        self.spawn_accumulator
    }

    pub fn is_spawning_paused(&self) -> bool {
        self.spawning_paused
    }

    pub fn spawn_height_range(&self) -> (f64, f64) {
        self.spawn_height
    }

    pub fn field_size(&self) -> (f64, f64) {
        (self.field_half_x, self.field_half_z)
    }

    pub fn total_spawned(&self) -> u32 {
        self.total_spawned
    }

    pub fn total_collected(&self) -> u32 {
        self.total_collected
    }

    /// Zero the lifetime counters reported in game stats.
    pub fn reset_counters(&mut self) {
        self.total_spawned = 0;
        self.total_collected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soul::SoulState;
    use std::collections::HashSet;

    fn config() -> GameConfig {
        GameConfig {
            max_souls: 10,
            spawn_rate: 2.0,
            ..Default::default()
        }
    }

    fn running(config: &GameConfig) -> SoulManager {
        let mut manager = SoulManager::new(config, 42);
        manager.resume_spawning(None);
        manager
    }

    fn finish_collections(manager: &mut SoulManager) {
        for _ in 0..30 {
            manager.update(1.0 / 60.0);
        }
    }

    #[test]
    fn starts_paused_and_empty() {
        let mut manager = SoulManager::new(&config(), 1);
        assert!(manager.is_spawning_paused());
        assert_eq!(manager.spawn_soul(), None);
        manager.update(10.0);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.idle_count(), 10);
    }

    #[test]
    fn second_spawn_at_capacity_one_returns_none() {
        let mut manager = running(&GameConfig {
            max_souls: 1,
            ..Default::default()
        });
        assert!(manager.spawn_soul().is_some());
        assert_eq!(manager.spawn_soul(), None);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn population_never_exceeds_cap_under_fast_spawning() {
        let mut manager = running(&GameConfig {
            max_souls: 5,
            spawn_rate: 500.0,
            ..Default::default()
        });
        for frame in 0..600 {
            manager.update(1.0 / 30.0);
            assert!(manager.active_count() <= 5);
            // Free a slot now and then
            if frame % 7 == 0 {
                let first = manager.collidable_souls().next().map(|s| s.id());
                if let Some(id) = first {
                    manager.collect_soul(id);
                }
            }
            for _ in 0..3 {
                manager.spawn_soul();
                assert!(manager.active_count() <= 5);
            }
        }
    }

    #[test]
    fn cadence_does_not_exceed_spawn_rate() {
        let mut manager = running(&GameConfig {
            max_souls: 1000,
            spawn_rate: 4.0,
            ..Default::default()
        });
        for _ in 0..600 {
            manager.update(1.0 / 60.0);
        }
        // 10 seconds at 4/s
        assert!(manager.total_spawned() <= 40);
        assert!(manager.total_spawned() >= 30);
    }

    #[test]
    fn accumulator_resets_on_spawn_and_pause() {
        let mut manager = running(&config());
        manager.update(0.3);
        assert!(manager.spawn_accumulator() > 0.0);
        manager.update(0.3);
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.spawn_accumulator(), 0.0);

        manager.update(0.2);
        manager.pause_spawning();
        assert_eq!(manager.spawn_accumulator(), 0.0);
    }

    #[test]
    fn ids_are_unique_across_recycling() {
        let mut manager = running(&GameConfig {
            max_souls: 3,
            spawn_rate: MIN_SPAWN_RATE,
            ..Default::default()
        });
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = manager.spawn_soul().unwrap();
            assert!(seen.insert(id), "id {} reused", id);
            assert!(manager.collect_soul(id));
            finish_collections(&mut manager);
        }
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn collect_unknown_id_returns_false() {
        let mut manager = running(&config());
        assert!(!manager.collect_soul(12345));
    }

    #[test]
    fn second_collect_returns_false_and_keeps_decay() {
        let mut manager = running(&config());
        let id = manager.spawn_soul().unwrap();
        assert!(manager.collect_soul(id));
        manager.update(0.1);
        let progress = manager.soul(id).unwrap().collection_progress();

        assert!(!manager.collect_soul(id));
        assert_eq!(manager.soul(id).unwrap().collection_progress(), progress);
        assert_eq!(manager.total_collected(), 1);
    }

    #[test]
    fn finished_souls_return_to_pool() {
        let mut manager = running(&config());
        let id = manager.spawn_soul().unwrap();
        assert_eq!(manager.idle_count(), 9);
        manager.collect_soul(id);
        manager.pause_spawning();
        finish_collections(&mut manager);
        assert!(manager.soul(id).is_none());
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.idle_count(), 10);
    }

    #[test]
    fn paused_registry_still_animates_collections() {
        let mut manager = running(&config());
        let id = manager.spawn_soul().unwrap();
        manager.collect_soul(id);
        manager.pause_spawning();
        manager.update(0.1);
        let soul = manager.soul(id).unwrap();
        assert_eq!(soul.state(), SoulState::Collecting);
        assert!(soul.collection_progress() < 1.0);
        manager.update(1.0);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn clear_all_returns_mixed_souls_to_idle() {
        let mut manager = running(&config());
        let ids: Vec<SoulId> = (0..5).map(|_| manager.spawn_soul().unwrap()).collect();
        manager.collect_soul(ids[0]);
        manager.collect_soul(ids[1]);
        manager.update(0.05);
        assert_eq!(manager.idle_count(), 5);

        manager.clear_all_souls();
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.idle_count(), 10);
        assert_eq!(manager.spawn_accumulator(), 0.0);
        for id in ids {
            assert!(manager.soul(id).is_none());
        }
    }

    #[test]
    fn spawned_souls_are_inside_field_and_band() {
        let cfg = GameConfig {
            max_souls: 200,
            field_half_x: 6.0,
            field_half_z: 3.0,
            soul_boundary_radius: 5.0,
            ..Default::default()
        };
        let mut manager = running(&cfg);
        for _ in 0..200 {
            let id = manager.spawn_soul().unwrap();
            let p = manager.soul(id).unwrap().base_position();
            assert!(p.x.abs() <= 6.0 && p.z.abs() <= 3.0);
            assert!(horizontal_length(p) <= 5.0 + 1e-9);
            assert!(p.y >= cfg.spawn_height_min && p.y <= cfg.spawn_height_max);
        }
    }

    #[test]
    fn setters_clamp_to_minimums() {
        let mut manager = SoulManager::new(&config(), 3);
        manager.set_spawn_rate(0.0);
        assert_eq!(manager.spawn_rate(), MIN_SPAWN_RATE);
        manager.set_spawn_rate(f64::NAN);
        assert_eq!(manager.spawn_rate(), MIN_SPAWN_RATE);
        manager.set_max_souls(0);
        assert_eq!(manager.max_souls(), 1);
        manager.set_field_size(-4.0, 0.5);
        assert_eq!(manager.field_size(), (MIN_FIELD_SIZE, MIN_FIELD_SIZE));
        assert!(manager.bounds().max_radius <= MIN_FIELD_SIZE);
        manager.set_spawn_height_range(10.0, -3.0);
        let (lo, hi) = manager.spawn_height_range();
        assert!(lo <= hi);
        assert_eq!((lo, hi), (manager.bounds().min_y, manager.bounds().max_y));
    }

    #[test]
    fn boundary_follows_field_after_shrink_and_regrow() {
        let mut manager = running(&GameConfig::default());
        assert_eq!(manager.bounds().max_radius, 14.0);

        manager.set_field_size(1.0, 1.0);
        assert_eq!(manager.bounds().max_radius, MIN_FIELD_SIZE);

        manager.set_field_size(15.0, 15.0);
        assert_eq!(manager.bounds().max_radius, 14.0);
        let mut farthest: f64 = 0.0;
        for _ in 0..20 {
            if let Some(id) = manager.spawn_soul() {
                let r = horizontal_length(manager.soul(id).unwrap().base_position());
                farthest = farthest.max(r);
            }
        }
        assert!(farthest > 2.0, "souls still confined to the shrunken field");
    }

    #[test]
    fn boundary_is_limited_by_narrow_axis() {
        let mut manager = running(&GameConfig::default());
        manager.set_field_size(15.0, 2.0);
        assert_eq!(manager.bounds().max_radius, 2.0);
        manager.set_boundary_radius(0.1);
        assert_eq!(manager.bounds().max_radius, MIN_FIELD_SIZE);
    }

    #[test]
    fn refused_spawns_leave_random_sequence_untouched() {
        let cfg = config();
        let mut refused = SoulManager::new(&cfg, 9);
        let mut fresh = SoulManager::new(&cfg, 9);

        // Paused: every request is refused
        for _ in 0..5 {
            assert_eq!(refused.spawn_soul(), None);
        }
        refused.resume_spawning(None);
        fresh.resume_spawning(None);

        let a = refused.spawn_soul().unwrap();
        let b = fresh.spawn_soul().unwrap();
        assert_eq!(
            refused.soul(a).unwrap().base_position(),
            fresh.soul(b).unwrap().base_position()
        );
    }

    #[test]
    fn lowering_cap_does_not_evict_active_souls() {
        let mut manager = running(&config());
        for _ in 0..4 {
            manager.spawn_soul();
        }
        manager.set_max_souls(2);
        manager.update(1.0 / 60.0);
        assert_eq!(manager.active_count(), 4);
        assert_eq!(manager.spawn_soul(), None);
    }

    #[test]
    fn scripted_spawn_sits_exactly_on_anchor() {
        let mut manager = running(&config());
        let id = manager
            .spawn_soul_at(Vec3::new(2.0, 1.5, -1.0), SoulMotion::still())
            .unwrap();
        assert_eq!(manager.soul(id).unwrap().position(), Vec3::new(2.0, 1.5, -1.0));
        manager.update(0.5);
        assert_eq!(manager.soul(id).unwrap().position(), Vec3::new(2.0, 1.5, -1.0));

        manager.pause_spawning();
        assert_eq!(manager.spawn_soul_at(Vec3::ZERO, SoulMotion::still()), None);
    }

    #[test]
    fn resume_can_change_rate() {
        let mut manager = SoulManager::new(&config(), 3);
        manager.resume_spawning(Some(5.0));
        assert!(!manager.is_spawning_paused());
        assert_eq!(manager.spawn_rate(), 5.0);
    }
}
