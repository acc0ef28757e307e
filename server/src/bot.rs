//! Autopilot that plays the skull the way a person might.
//!
//! The autopilot is a small state machine that:
//! - Picks the nearest free soul as its target
//! - Keeps chasing it until it is gone or a reaction delay runs out
//! - Returns stick deflections via `steer()`, with personality-driven wobble

use crate::input::InputVector;
use crate::soul::SoulId;
use crate::soul_manager::SoulManager;
use rand::Rng;
use skull_shared::vec3::Vec3;

/// Closer than this to the target counts as "on it"
const ARRIVE_DISTANCE: f64 = 0.05;

/// Personality affects reaction time, throttle and steering noise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotPersonality {
    /// Re-evaluates targets quickly (0.1-0.3s), full throttle
    Eager,
    /// Sticks with a target for a while (0.6-1.5s), eases off the stick
    Relaxed,
    /// Unpredictable timing (0.05-2.0s) and heavy wobble
    Chaotic,
}

impl BotPersonality {
    /// Retarget delay range (min, max) in seconds
    fn reaction_range(&self) -> (f64, f64) {
        match self {
            BotPersonality::Eager => (0.1, 0.3),
            BotPersonality::Relaxed => (0.6, 1.5),
            BotPersonality::Chaotic => (0.05, 2.0),
        }
    }

    fn random_reaction(&self, rng: &mut impl Rng) -> f64 {
        let (min, max) = self.reaction_range();
        min + rng.gen::<f64>() * (max - min)
    }

    fn throttle(&self, rng: &mut impl Rng) -> f64 {
        match self {
            BotPersonality::Eager => 1.0,
            BotPersonality::Relaxed => 0.6 + rng.gen::<f64>() * 0.3, // 0.6-0.9
            BotPersonality::Chaotic => 0.5 + rng.gen::<f64>() * 0.5, // 0.5-1.0
        }
    }

    /// Peak steering error in radians
    fn wobble(&self) -> f64 {
        match self {
            BotPersonality::Eager => 0.05,
            BotPersonality::Relaxed => 0.2,
            BotPersonality::Chaotic => 0.7,
        }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        match rng.gen_range(0..3) {
            0 => BotPersonality::Eager,
            1 => BotPersonality::Relaxed,
            _ => BotPersonality::Chaotic,
        }
    }
}

#[derive(Debug)]
pub struct Autopilot {
    pub personality: BotPersonality,
    target: Option<SoulId>,
    /// Time until the target is re-evaluated
    retarget_in: f64,
    throttle: f64,
    wobble_phase: f64,
}

impl Autopilot {
    pub fn new(personality: BotPersonality, rng: &mut impl Rng) -> Self {
        Self {
            personality,
            target: None,
            retarget_in: 0.0,
            throttle: personality.throttle(rng),
            wobble_phase: rng.gen::<f64>() * std::f64::consts::TAU,
        }
    }

    /// Stick deflection for this frame.
    pub fn steer(
        &mut self,
        dt: f64,
        avatar: Vec3,
        registry: &SoulManager,
        rng: &mut impl Rng,
    ) -> InputVector {
        let dt = dt.max(0.0);
        self.retarget_in -= dt;
        self.wobble_phase += dt * 3.0;

        let target_alive = self
            .target
            .and_then(|id| registry.soul(id))
            .map_or(false, |soul| soul.is_collidable());
        if !target_alive || self.retarget_in <= 0.0 {
            self.target = nearest_free_soul(avatar, registry);
            self.retarget_in = self.personality.random_reaction(rng);
            self.throttle = self.personality.throttle(rng);
        }

        let Some(soul) = self.target.and_then(|id| registry.soul(id)) else {
            return InputVector::ZERO;
        };

        let dx = soul.position().x - avatar.x;
        let dz = soul.position().z - avatar.z;
        let len = (dx * dx + dz * dz).sqrt();
        if len < ARRIVE_DISTANCE {
            return InputVector::ZERO;
        }

        let angle = dx.atan2(dz) + self.personality.wobble() * self.wobble_phase.sin();
        // Ease off when close so the skull does not overshoot every frame
        let throttle = self.throttle * (len / 0.5).min(1.0);
        InputVector::new(angle.sin() * throttle, angle.cos() * throttle)
    }

    pub fn target(&self) -> Option<SoulId> {
        self.target
    }

    /// Forget the current target (new round).
    pub fn reset(&mut self) {
        self.target = None;
        self.retarget_in = 0.0;
    }
}

fn nearest_free_soul(avatar: Vec3, registry: &SoulManager) -> Option<SoulId> {
    registry
        .collidable_souls()
        .map(|soul| {
            let dx = soul.position().x - avatar.x;
            let dz = soul.position().z - avatar.z;
            (soul.id(), dx * dx + dz * dz)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
