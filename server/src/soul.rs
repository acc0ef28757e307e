//! A single collectible soul: procedural floating motion and the
//! Free -> Collecting -> Removable life cycle.

use crate::pool::Poolable;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skull_shared::vec3::{add, clamp_horizontal, horizontal_length, length, scale, Vec3};
use std::f64::consts::TAU;

pub type SoulId = u32;

/// Collision radius of every soul (world units)
pub const SOUL_COLLISION_RADIUS: f64 = 0.5;

/// Time from collection trigger to removal (seconds)
pub const COLLECTION_DURATION: f64 = 0.25;

/// Height a collected soul rises by the end of its animation
const COLLECTION_LIFT: f64 = 1.5;

/// Erratic retarget interval range (seconds)
const ERRATIC_INTERVAL_MIN: f64 = 0.2;
const ERRATIC_INTERVAL_MAX: f64 = 1.1;

/// Erratic displacement decays at this rate so it hovers around the anchor
const ERRATIC_DAMPING: f64 = 2.5;
const ERRATIC_MAX_OFFSET: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoulState {
    /// Floating and collidable
    Free,
    /// Collection animation running, no longer collidable
    Collecting,
    /// Animation finished, waiting to go back to the pool
    Removable,
}

/// Per-soul motion parameters. Re-rolled on every reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoulMotion {
    pub float_offset: f64,
    pub float_speed: f64,
    pub float_range: f64,
    pub drift_offset: f64,
    pub drift_speed: f64,
    pub drift_range: f64,
    pub erratic_speed: f64,
    pub erratic_intensity: f64,
}

impl SoulMotion {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            float_offset: rng.gen::<f64>() * TAU,
            float_speed: rng.gen_range(1.0..2.0),
            float_range: rng.gen_range(0.2..0.5),
            drift_offset: rng.gen::<f64>() * TAU,
            drift_speed: rng.gen_range(0.3..0.8),
            drift_range: rng.gen_range(0.3..1.0),
            erratic_speed: rng.gen_range(0.5..1.5),
            erratic_intensity: rng.gen_range(0.3..1.0),
        }
    }

    /// No motion at all: the soul sits on its anchor.
    pub fn still() -> Self {
        Self {
            float_offset: 0.0,
            float_speed: 0.0,
            float_range: 0.0,
            drift_offset: 0.0,
            drift_speed: 0.0,
            drift_range: 0.0,
            erratic_speed: 0.0,
            erratic_intensity: 0.0,
        }
    }
}

/// Region a soul is confined to: a vertical cylinder around the field
/// center, cut to a height band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoulBounds {
    pub max_radius: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl SoulBounds {
    pub fn clamp(&self, p: Vec3) -> Vec3 {
        let mut p = clamp_horizontal(p, self.max_radius);
        p.y = p.y.clamp(self.min_y, self.max_y);
        p
    }

    pub fn contains(&self, p: Vec3) -> bool {
        horizontal_length(p) <= self.max_radius + 1e-9 && p.y >= self.min_y && p.y <= self.max_y
    }
}

impl Default for SoulBounds {
    fn default() -> Self {
        Self {
            max_radius: 14.0,
            min_y: 0.5,
            max_y: 2.8,
        }
    }
}

/// Presentation values for the collection animation, a pure function of
/// `1 - collection_progress`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionVisual {
    pub scale: f64,
    pub opacity: f64,
    pub lift: f64,
}

#[derive(Debug, Clone)]
pub struct Soul {
    id: SoulId,
    position: Vec3,
    base_position: Vec3,
    motion: SoulMotion,
    erratic_direction: Vec3,
    erratic_offset: Vec3,
    erratic_timer: f64,
    erratic_interval: f64,
    state: SoulState,
    collection_progress: f64,
    collision_radius: f64,
    bounds: SoulBounds,
    rng: ChaCha8Rng,
}

impl Soul {
    /// Build an inert soul with its own random stream.
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let motion = SoulMotion::random(&mut rng);
        let erratic_interval = rng.gen_range(ERRATIC_INTERVAL_MIN..ERRATIC_INTERVAL_MAX);
        Self {
            id: 0,
            position: Vec3::ZERO,
            base_position: Vec3::ZERO,
            motion,
            erratic_direction: Vec3::ZERO,
            erratic_offset: Vec3::ZERO,
            erratic_timer: 0.0,
            erratic_interval,
            state: SoulState::Free,
            collection_progress: 0.0,
            collision_radius: SOUL_COLLISION_RADIUS,
            bounds: SoulBounds::default(),
            rng,
        }
    }

    /// Give a pooled soul its identity and anchor for this life.
    pub fn activate(&mut self, id: SoulId, base_position: Vec3, bounds: SoulBounds) {
        self.id = id;
        self.bounds = bounds;
        self.base_position = bounds.clamp(base_position);
        self.position = self.derive_position();
    }

    pub fn update(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        match self.state {
            SoulState::Free => self.update_motion(dt),
            SoulState::Collecting => {
                self.collection_progress =
                    (self.collection_progress - dt / COLLECTION_DURATION).max(0.0);
                if self.collection_progress <= 0.0 {
                    self.state = SoulState::Removable;
                }
            }
            SoulState::Removable => {}
        }
    }

    fn update_motion(&mut self, dt: f64) {
        let m = &mut self.motion;
        m.float_offset += dt * m.float_speed;
        m.drift_offset += dt * m.drift_speed;

        self.erratic_timer += dt;
        if self.erratic_timer >= self.erratic_interval {
            self.erratic_timer = 0.0;
            self.erratic_interval = self
                .rng
                .gen_range(ERRATIC_INTERVAL_MIN..ERRATIC_INTERVAL_MAX);
            self.erratic_direction = random_unit(&mut self.rng);
            self.motion.erratic_speed = self.rng.gen_range(0.5..1.5);
        }

        let push = scale(
            self.erratic_direction,
            self.motion.erratic_speed * self.motion.erratic_intensity * dt,
        );
        let decay = (1.0 - ERRATIC_DAMPING * dt).max(0.0);
        let mut offset = add(scale(self.erratic_offset, decay), push);
        let len = length(offset);
        if len > ERRATIC_MAX_OFFSET {
            offset = scale(offset, ERRATIC_MAX_OFFSET / len);
        }
        self.erratic_offset = offset;

        self.position = self.derive_position();
    }

    fn derive_position(&self) -> Vec3 {
        let m = &self.motion;
        let float = Vec3::new(0.0, m.float_offset.sin() * m.float_range, 0.0);
        let drift = Vec3::new(
            m.drift_offset.sin() * m.drift_range,
            0.0,
            (m.drift_offset * 0.7).cos() * m.drift_range,
        );
        let p = add(add(add(self.base_position, float), drift), self.erratic_offset);
        self.bounds.clamp(p)
    }

    /// Begin the collection animation. Only the first call per activation
    /// has an effect; returns whether this call started it.
    pub fn start_collection(&mut self) -> bool {
        if self.state != SoulState::Free {
            return false;
        }
        self.state = SoulState::Collecting;
        self.collection_progress = 1.0;
        true
    }

    pub fn is_removable(&self) -> bool {
        self.state != SoulState::Free && self.collection_progress <= 0.0
    }

    pub fn is_collidable(&self) -> bool {
        self.state == SoulState::Free
    }

    pub fn collection_visual(&self) -> CollectionVisual {
        if self.state == SoulState::Free {
            return CollectionVisual {
                scale: 1.0,
                opacity: 1.0,
                lift: 0.0,
            };
        }
        let t = 1.0 - self.collection_progress;
        CollectionVisual {
            scale: 1.0 - t,
            opacity: 1.0 - t,
            lift: t * COLLECTION_LIFT,
        }
    }

    pub fn id(&self) -> SoulId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn base_position(&self) -> Vec3 {
        self.base_position
    }

    pub fn state(&self) -> SoulState {
        self.state
    }

    pub fn collection_progress(&self) -> f64 {
        self.collection_progress
    }

    pub fn collision_radius(&self) -> f64 {
        self.collision_radius
    }

    pub fn bounds(&self) -> SoulBounds {
        self.bounds
    }

    pub fn motion(&self) -> SoulMotion {
        self.motion
    }

    /// Override the motion parameters (tuning and tests).
    pub fn set_motion(&mut self, motion: SoulMotion) {
        self.motion = motion;
        if motion.erratic_intensity == 0.0 {
            self.erratic_offset = Vec3::ZERO;
        }
        self.position = self.derive_position();
    }

    /// Back to an inert Free soul with freshly rolled motion.
    pub fn reset(&mut self) {
        self.id = 0;
        self.state = SoulState::Free;
        self.collection_progress = 0.0;
        self.motion = SoulMotion::random(&mut self.rng);
        self.erratic_direction = Vec3::ZERO;
        self.erratic_offset = Vec3::ZERO;
        self.erratic_timer = 0.0;
        self.erratic_interval = self
            .rng
            .gen_range(ERRATIC_INTERVAL_MIN..ERRATIC_INTERVAL_MAX);
        self.base_position = Vec3::ZERO;
        self.position = Vec3::ZERO;
    }
}

impl Poolable for Soul {
    fn reset(&mut self) {
        Soul::reset(self);
    }
}

/// Uniformly distributed direction on the unit sphere.
fn random_unit(rng: &mut impl Rng) -> Vec3 {
    let y: f64 = rng.gen_range(-1.0..1.0);
    let theta = rng.gen::<f64>() * TAU;
    let r = (1.0 - y * y).sqrt();
    Vec3::new(r * theta.cos(), y, r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skull_shared::vec3::vec3;
    use std::f64::consts::PI;

    fn active_soul(seed: u64, base: Vec3) -> Soul {
        let mut soul = Soul::new(seed);
        soul.activate(1, base, SoulBounds::default());
        soul
    }

    fn float_only(speed: f64, range: f64) -> SoulMotion {
        SoulMotion {
            float_speed: speed,
            float_range: range,
            ..SoulMotion::still()
        }
    }

    #[test]
    fn new_soul_is_free_and_collidable() {
        let soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        assert_eq!(soul.state(), SoulState::Free);
        assert!(soul.is_collidable());
        assert!(!soul.is_removable());
        assert_eq!(soul.collection_progress(), 0.0);
        assert_eq!(soul.collision_radius(), SOUL_COLLISION_RADIUS);
    }

    #[test]
    fn half_float_period_returns_to_base_height() {
        let mut soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        soul.set_motion(float_only(2.0, 0.5));

        // Quarter period: top of the wave
        soul.update(PI / 4.0);
        assert!((soul.position().y - 2.5).abs() < 1e-9);

        // Second quarter: back on the anchor
        soul.update(PI / 4.0);
        assert!((soul.position().y - 2.0).abs() < 1e-9);
        assert!(soul.position().x.abs() < 1e-12 && soul.position().z.abs() < 1e-12);
    }

    #[test]
    fn still_soul_sits_on_anchor() {
        let mut soul = active_soul(3, vec3(4.0, 1.0, -2.0));
        soul.set_motion(SoulMotion::still());
        for _ in 0..100 {
            soul.update(1.0 / 60.0);
        }
        assert_eq!(soul.position(), vec3(4.0, 1.0, -2.0));
    }

    #[test]
    fn start_collection_is_idempotent() {
        let mut soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        assert!(soul.start_collection());
        soul.update(0.1);
        let progress = soul.collection_progress();
        assert!(!soul.start_collection());
        assert_eq!(soul.collection_progress(), progress);
        assert!(!soul.is_collidable());
    }

    #[test]
    fn collection_progress_decays_monotonically_to_exact_zero() {
        let mut soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        soul.start_collection();
        assert_eq!(soul.collection_progress(), 1.0);

        let dt = 1.0 / 60.0;
        let mut last = soul.collection_progress();
        let mut frames = 0;
        while !soul.is_removable() {
            soul.update(dt);
            let p = soul.collection_progress();
            assert!(p <= last);
            assert!((0.0..=1.0).contains(&p));
            last = p;
            frames += 1;
            assert!(frames <= 16, "collection did not finish in time");
        }
        assert_eq!(soul.collection_progress(), 0.0);
        assert_eq!(soul.state(), SoulState::Removable);
    }

    #[test]
    fn zero_dt_does_not_advance_collection() {
        let mut soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        soul.start_collection();
        soul.update(0.0);
        soul.update(-1.0);
        assert_eq!(soul.collection_progress(), 1.0);
    }

    #[test]
    fn collecting_soul_stops_moving() {
        let mut soul = active_soul(5, vec3(1.0, 2.0, 1.0));
        soul.update(0.3);
        soul.start_collection();
        let pos = soul.position();
        soul.update(0.1);
        assert_eq!(soul.position(), pos);
    }

    #[test]
    fn visual_is_function_of_progress() {
        let mut soul = active_soul(1, vec3(0.0, 2.0, 0.0));
        assert_eq!(soul.collection_visual().scale, 1.0);
        soul.start_collection();
        soul.update(COLLECTION_DURATION / 2.0);
        let v = soul.collection_visual();
        assert!((v.scale - 0.5).abs() < 1e-9);
        assert!((v.opacity - 0.5).abs() < 1e-9);
        assert!((v.lift - COLLECTION_LIFT / 2.0).abs() < 1e-9);
    }

    #[test]
    fn position_stays_bounded_for_long_runs() {
        let bounds = SoulBounds {
            max_radius: 3.0,
            min_y: 0.5,
            max_y: 2.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for seed in 0..20 {
            let mut soul = Soul::new(seed);
            // Anchors at and beyond the edge
            soul.activate(1, vec3(3.0, 2.0, 0.5), bounds);
            for _ in 0..3000 {
                let dt = rng.gen_range(0.0..0.05);
                soul.update(dt);
                assert!(
                    bounds.contains(soul.position()),
                    "soul escaped to {:?}",
                    soul.position()
                );
            }
        }
    }

    #[test]
    fn reset_restores_free_state_and_rerolls_motion() {
        let mut soul = active_soul(11, vec3(0.0, 2.0, 0.0));
        let before = soul.motion();
        soul.start_collection();
        soul.update(1.0);
        assert!(soul.is_removable());

        soul.reset();
        assert_eq!(soul.state(), SoulState::Free);
        assert_eq!(soul.collection_progress(), 0.0);
        assert_eq!(soul.id(), 0);
        assert_ne!(soul.motion(), before);
    }

    #[test]
    fn activation_clamps_anchor_into_bounds() {
        let mut soul = Soul::new(1);
        soul.activate(4, vec3(100.0, 50.0, 0.0), SoulBounds::default());
        assert_eq!(soul.id(), 4);
        assert!(SoulBounds::default().contains(soul.base_position()));
        assert!(SoulBounds::default().contains(soul.position()));
    }

    #[test]
    fn random_unit_is_unit_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            assert!((length(random_unit(&mut rng)) - 1.0).abs() < 1e-9);
        }
    }
}
