use crate::state::{GamePhase, GameStats};

/// Presentation hooks driven by the state machine.
pub trait GameUi {
    fn on_score_changed(&mut self, score: u32);
    fn on_timer_changed(&mut self, time_remaining: f64);
    fn on_phase_changed(&mut self, phase: GamePhase);
    fn on_game_ended(&mut self, final_score: u32, stats: &GameStats);
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ScoreChanged(u32),
    PhaseChanged(GamePhase),
    GameEnded { final_score: u32, stats: GameStats },
}

/// Queues notifications for a host to drain. Timer ticks arrive every frame
/// and only the latest value is kept.
#[derive(Debug, Clone, Default)]
pub struct RecordingUi {
    events: Vec<UiEvent>,
    last_timer: Option<f64>,
    timer_updates: u64,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[UiEvent] {
        &self.events
    }

    /// Hand over queued events, leaving the queue empty.
    pub fn take_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn last_timer(&self) -> Option<f64> {
        self.last_timer
    }

    pub fn timer_updates(&self) -> u64 {
        self.timer_updates
    }

    pub fn count_phase(&self, phase: GamePhase) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, UiEvent::PhaseChanged(p) if *p == phase))
            .count()
    }
}

impl GameUi for RecordingUi {
    fn on_score_changed(&mut self, score: u32) {
        self.events.push(UiEvent::ScoreChanged(score));
    }

    fn on_timer_changed(&mut self, time_remaining: f64) {
        self.last_timer = Some(time_remaining);
        self.timer_updates += 1;
    }

    fn on_phase_changed(&mut self, phase: GamePhase) {
        self.events.push(UiEvent::PhaseChanged(phase));
    }

    fn on_game_ended(&mut self, final_score: u32, stats: &GameStats) {
        self.events.push(UiEvent::GameEnded {
            final_score,
            stats: *stats,
        });
    }
}
