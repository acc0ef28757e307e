//! Round life cycle: Menu -> Playing -> GameOver, the countdown, the score,
//! and the per-frame wiring of avatar, registry and collision resolver.

use crate::avatar::{Avatar, SkullAvatar};
use crate::collision::CollisionResolver;
use crate::input::{InputSource, InputState};
use crate::soul::{Soul, SoulId};
use crate::soul_manager::SoulManager;
use crate::ui::{GameUi, RecordingUi};
use skull_shared::config::GameConfig;
use skull_shared::protocol::{round4, round4_array, FrameMsg, PhaseWire, SoulWire};
use skull_shared::vec3::Vec3;

/// Longest step a single frame may simulate (seconds)
pub const MAX_FRAME_DT: f64 = 1.0 / 30.0;

/// Remaining time below this counts as expired
const TIMER_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Menu,
    Playing,
    GameOver,
}

impl From<GamePhase> for PhaseWire {
    fn from(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Menu => PhaseWire::Menu,
            GamePhase::Playing => PhaseWire::Playing,
            GamePhase::GameOver => PhaseWire::GameOver,
        }
    }
}

/// End-of-round summary handed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GameStats {
    pub score: u32,
    pub souls_collected: u32,
    pub souls_spawned: u32,
    /// Seconds actually played
    pub duration: f64,
}

pub struct GameStateMachine<A: Avatar, I: InputSource, U: GameUi> {
    phase: GamePhase,
    score: u32,
    time_remaining: f64,
    duration: f64,
    elapsed: f64,
    score_per_soul: u32,
    spawn_rate: f64,
    avatar: A,
    input: I,
    ui: Option<U>,
    registry: SoulManager,
    collisions: CollisionResolver,
    collected_buffer: Vec<SoulId>,
    last_stats: Option<GameStats>,
    rounds_played: u32,
}

/// Server-side composition: skull avatar, host-written input, queued UI
/// events.
pub type HeadlessGame = GameStateMachine<SkullAvatar, InputState, RecordingUi>;

impl HeadlessGame {
    pub fn headless(config: &GameConfig, rng_seed: u64) -> Self {
        GameStateMachine::new(
            config,
            rng_seed,
            SkullAvatar::new(config),
            InputState::new(),
            Some(RecordingUi::new()),
        )
    }
}

impl<A: Avatar, I: InputSource, U: GameUi> GameStateMachine<A, I, U> {
    pub fn new(config: &GameConfig, rng_seed: u64, avatar: A, input: I, ui: Option<U>) -> Self {
        let config = config.sanitized();
        Self {
            phase: GamePhase::Menu,
            score: 0,
            time_remaining: config.duration,
            duration: config.duration,
            elapsed: 0.0,
            score_per_soul: config.score_per_soul,
            spawn_rate: config.spawn_rate,
            avatar,
            input,
            ui,
            registry: SoulManager::new(&config, rng_seed),
            collisions: CollisionResolver::from_config(&config),
            collected_buffer: Vec::with_capacity(config.max_souls as usize),
            last_stats: None,
            rounds_played: 0,
        }
    }

    /// Menu -> Playing. Returns false from any other phase.
    pub fn start_game(&mut self) -> bool {
        if self.phase != GamePhase::Menu {
            tracing::debug!("Ignoring start in {:?}", self.phase);
            return false;
        }
        self.begin_round();
        true
    }

    /// GameOver -> Playing with a fresh round. Returns false from any other
    /// phase.
    pub fn restart_game(&mut self) -> bool {
        if self.phase != GamePhase::GameOver {
            tracing::debug!("Ignoring restart in {:?}", self.phase);
            return false;
        }
        self.begin_round();
        true
    }

    /// GameOver -> Menu. Leftover souls keep animating.
    pub fn return_to_menu(&mut self) -> bool {
        if self.phase != GamePhase::GameOver {
            return false;
        }
        self.set_phase(GamePhase::Menu);
        true
    }

    fn begin_round(&mut self) {
        self.score = 0;
        self.elapsed = 0.0;
        self.time_remaining = self.duration;
        self.last_stats = None;
        self.rounds_played += 1;

        self.registry.clear_all_souls();
        self.registry.reset_counters();
        self.registry.resume_spawning(Some(self.spawn_rate));
        self.avatar.reset();

        tracing::info!(
            "Round {} started ({:.0}s, {} souls max)",
            self.rounds_played,
            self.duration,
            self.registry.max_souls()
        );

        self.set_phase(GamePhase::Playing);
        let (score, time) = (self.score, self.time_remaining);
        self.notify(|ui| {
            ui.on_score_changed(score);
            ui.on_timer_changed(time);
        });
    }

    /// Advance one frame. `dt` is clamped to [0, MAX_FRAME_DT].
    pub fn update(&mut self, dt: f64) {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, MAX_FRAME_DT)
        } else {
            0.0
        };

        match self.phase {
            GamePhase::Playing => self.update_playing(dt),
            GamePhase::Menu | GamePhase::GameOver => self.registry.update(dt),
        }
    }

    fn update_playing(&mut self, dt: f64) {
        self.elapsed += dt;
        let remaining = (self.duration - self.elapsed).max(0.0);
        if remaining <= TIMER_EPSILON {
            self.end_game();
            return;
        }
        self.time_remaining = remaining;
        self.notify(|ui| ui.on_timer_changed(remaining));

        let input = self.input.input_vector();
        self.avatar.move_by(input.x, input.z, dt);

        // Souls spawned by this update can be collected in this same frame
        self.registry.update(dt);

        let mut collected = std::mem::take(&mut self.collected_buffer);
        collected.clear();
        self.collisions
            .resolve_into(self.avatar.position(), &mut self.registry, &mut collected);

        if !collected.is_empty() {
            let gained = (collected.len() as u32).saturating_mul(self.score_per_soul);
            self.score = self.score.saturating_add(gained);
            let score = self.score;
            self.notify(|ui| ui.on_score_changed(score));
        }
        self.collected_buffer = collected;
    }

    /// Playing -> GameOver: stop spawning, freeze the timer at zero and hand
    /// the final result to the UI. Returns false outside Playing.
    pub fn end_game(&mut self) -> bool {
        if self.phase != GamePhase::Playing {
            return false;
        }
        self.registry.pause_spawning();
        self.time_remaining = 0.0;

        let stats = GameStats {
            score: self.score,
            souls_collected: self.registry.total_collected(),
            souls_spawned: self.registry.total_spawned(),
            duration: self.elapsed.min(self.duration),
        };
        self.last_stats = Some(stats);

        tracing::info!(
            "Game over: score {} ({} of {} souls)",
            stats.score,
            stats.souls_collected,
            stats.souls_spawned
        );

        self.set_phase(GamePhase::GameOver);
        self.notify(|ui| {
            ui.on_timer_changed(0.0);
            ui.on_game_ended(stats.score, &stats);
        });
        true
    }

    fn set_phase(&mut self, phase: GamePhase) {
        if self.phase == phase {
            return;
        }
        tracing::debug!("Phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.notify(|ui| ui.on_phase_changed(phase));
    }

    fn notify(&mut self, f: impl FnOnce(&mut U)) {
        if let Some(ui) = self.ui.as_mut() {
            f(ui);
        }
    }

    /// Renderer snapshot of the current frame.
    pub fn snapshot(&self, tick: u32) -> FrameMsg {
        FrameMsg {
            tick,
            phase: self.phase.into(),
            score: self.score,
            time_remaining: round4(self.time_remaining),
            avatar: round4_array(self.avatar.position().to_array()),
            souls: self.registry.souls().map(soul_wire).collect(),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn time_remaining(&self) -> f64 {
        self.time_remaining
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn score_per_soul(&self) -> u32 {
        self.score_per_soul
    }

    pub fn last_stats(&self) -> Option<GameStats> {
        self.last_stats
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    pub fn avatar(&self) -> &A {
        &self.avatar
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn registry(&self) -> &SoulManager {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut SoulManager {
        &mut self.registry
    }

    pub fn collisions_mut(&mut self) -> &mut CollisionResolver {
        &mut self.collisions
    }

    pub fn ui(&self) -> Option<&U> {
        self.ui.as_ref()
    }

    pub fn ui_mut(&mut self) -> Option<&mut U> {
        self.ui.as_mut()
    }
}

fn soul_wire(soul: &Soul) -> SoulWire {
    let visual = soul.collection_visual();
    let p = soul.position();
    SoulWire {
        id: soul.id(),
        pos: round4_array(Vec3::new(p.x, p.y + visual.lift, p.z).to_array()),
        progress: round4(soul.collection_progress()),
        scale: round4(visual.scale),
        opacity: round4(visual.opacity),
    }
}
