use crate::avatar::Avatar;
use crate::bot::{Autopilot, BotPersonality};
use crate::collision::CollisionEvent;
use crate::config::SessionConfig;
use crate::leaderboard::{validate_name, LeaderboardClient};
use crate::state::{GamePhase, GameStats, HeadlessGame};
use crate::ui::{RecordingUi, UiEvent};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use skull_shared::protocol::{
    FrameMsg, GameEndedMsg, LeaderboardMsg, PhaseMsg, ScoreMsg, ServerMsg,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// With autopilot on, a finished round restarts after this long (seconds)
const AUTOPILOT_RESTART_DELAY: f64 = 3.0;

/// Commands from renderer connections to the game loop
#[derive(Debug, Clone)]
pub enum GameCommand {
    Start,
    Restart,
    ReturnToMenu,
    SetInput { x: f64, z: f64 },
    SetAutopilot(bool),
    SetPlayerName(String),
}

/// Broadcasts from the game loop to every connection
#[derive(Debug, Clone)]
pub enum GameBroadcast {
    Frame(FrameMsg),
    Phase(PhaseMsg),
    Score(ScoreMsg),
    GameEnded(GameEndedMsg),
    Leaderboard(LeaderboardMsg),
}

impl From<GameBroadcast> for ServerMsg {
    fn from(broadcast: GameBroadcast) -> Self {
        match broadcast {
            GameBroadcast::Frame(msg) => ServerMsg::Frame(msg),
            GameBroadcast::Phase(msg) => ServerMsg::Phase(msg),
            GameBroadcast::Score(msg) => ServerMsg::Score(msg),
            GameBroadcast::GameEnded(msg) => ServerMsg::GameEnded(msg),
            GameBroadcast::Leaderboard(msg) => ServerMsg::Leaderboard(msg),
        }
    }
}

/// Everything the loop task owns besides the simulation itself.
struct Session {
    autopilot: Option<Autopilot>,
    bot_rng: ChaCha8Rng,
    player_name: Option<String>,
    leaderboard: Option<LeaderboardClient>,
    leaderboard_top: u32,
    game_over_for: f64,
}

impl Session {
    fn new(config: &SessionConfig) -> Self {
        let mut bot_rng = ChaCha8Rng::seed_from_u64(config.rng_seed.wrapping_add(1));
        let autopilot = if config.autopilot {
            Some(new_autopilot(&mut bot_rng))
        } else {
            None
        };

        let leaderboard = config.leaderboard_url.as_deref().and_then(|url| {
            match LeaderboardClient::new(url, config.retry) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::error!("Leaderboard disabled: {}", e);
                    None
                }
            }
        });

        Self {
            autopilot,
            bot_rng,
            player_name: config.player_name.clone(),
            leaderboard,
            leaderboard_top: config.leaderboard_top,
            game_over_for: 0.0,
        }
    }
}

fn new_autopilot(rng: &mut ChaCha8Rng) -> Autopilot {
    let personality = BotPersonality::random(rng);
    tracing::info!("Autopilot engaged with {:?} personality", personality);
    Autopilot::new(personality, rng)
}

/// Run the main game loop. Owns the state machine.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    config: SessionConfig,
) {
    let mut game = HeadlessGame::headless(&config.game, config.rng_seed);
    let mut session = Session::new(&config);

    game.collisions_mut()
        .add_collision_callback(Box::new(|event: &CollisionEvent| {
            tracing::debug!(
                "Collected soul {} at distance {:.2}",
                event.soul_id,
                event.distance
            );
            Ok(())
        }));

    let dt = config.tick_dt();
    let broadcast_every = config.broadcast_every() as u64;
    let mut tick_count: u64 = 0;

    let mut tick_interval = tokio::time::interval(Duration::from_secs_f64(dt));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Game loop running at {} Hz (broadcast every {} ticks)",
        config.tick_rate_hz,
        broadcast_every
    );

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                tick(&mut game, &mut session, dt);

                let events = game.ui_mut().map(RecordingUi::take_events).unwrap_or_default();
                for event in events {
                    forward_ui_event(event, &session, &broadcast_tx);
                }

                tick_count += 1;
                if tick_count % broadcast_every == 0 {
                    let frame = game.snapshot(tick_count as u32);
                    let _ = broadcast_tx.send(GameBroadcast::Frame(frame));
                }
            }

            Some(cmd) = cmd_rx.recv() => {
                handle_command(cmd, &mut game, &mut session);
            }

            else => break,
        }
    }

    tracing::info!("Game loop ended");
}

fn tick(game: &mut HeadlessGame, session: &mut Session, dt: f64) {
    if let Some(bot) = session.autopilot.as_mut() {
        match game.phase() {
            GamePhase::Menu => {
                game.start_game();
            }
            GamePhase::Playing => {
                let steer = bot.steer(
                    dt,
                    game.avatar().position(),
                    game.registry(),
                    &mut session.bot_rng,
                );
                game.input_mut().set_vector(steer);
            }
            GamePhase::GameOver => {
                session.game_over_for += dt;
                if session.game_over_for >= AUTOPILOT_RESTART_DELAY {
                    bot.reset();
                    game.restart_game();
                }
            }
        }
    }
    if game.phase() != GamePhase::GameOver {
        session.game_over_for = 0.0;
    }

    game.update(dt);
}

fn handle_command(cmd: GameCommand, game: &mut HeadlessGame, session: &mut Session) {
    match cmd {
        // Phase rules live in the state machine; invalid requests are no-ops
        GameCommand::Start => {
            game.start_game();
        }
        GameCommand::Restart => {
            game.restart_game();
        }
        GameCommand::ReturnToMenu => {
            game.return_to_menu();
        }
        GameCommand::SetInput { x, z } => {
            // The autopilot owns the stick while engaged
            if session.autopilot.is_none() {
                game.input_mut().set(x, z);
            }
        }
        GameCommand::SetAutopilot(enabled) => {
            if enabled && session.autopilot.is_none() {
                session.autopilot = Some(new_autopilot(&mut session.bot_rng));
            } else if !enabled && session.autopilot.take().is_some() {
                game.input_mut().clear();
                tracing::info!("Autopilot disengaged");
            }
        }
        GameCommand::SetPlayerName(name) => match validate_name(&name) {
            Ok(name) => {
                tracing::info!("Player name set to {:?}", name);
                session.player_name = Some(name);
            }
            Err(e) => tracing::warn!("Rejected player name: {}", e),
        },
    }
}

fn forward_ui_event(
    event: UiEvent,
    session: &Session,
    broadcast_tx: &broadcast::Sender<GameBroadcast>,
) {
    match event {
        UiEvent::ScoreChanged(score) => {
            let _ = broadcast_tx.send(GameBroadcast::Score(ScoreMsg { score }));
        }
        UiEvent::PhaseChanged(phase) => {
            let _ = broadcast_tx.send(GameBroadcast::Phase(PhaseMsg {
                phase: phase.into(),
            }));
        }
        UiEvent::GameEnded { final_score, stats } => {
            let _ = broadcast_tx.send(GameBroadcast::GameEnded(game_ended_msg(
                final_score,
                &stats,
            )));
            submit_in_background(session, final_score, broadcast_tx.clone());
        }
    }
}

fn game_ended_msg(final_score: u32, stats: &GameStats) -> GameEndedMsg {
    GameEndedMsg {
        final_score,
        souls_collected: stats.souls_collected,
        souls_spawned: stats.souls_spawned,
        duration: stats.duration,
    }
}

/// Submit off the frame path; the outcome is broadcast when it arrives.
fn submit_in_background(
    session: &Session,
    score: u32,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
) {
    let Some(client) = session.leaderboard.clone() else {
        return;
    };
    let Some(name) = session.player_name.clone() else {
        tracing::info!("No player name set, skipping score submission");
        return;
    };
    let top = session.leaderboard_top;

    tokio::spawn(async move {
        let msg = match client.submit_score(&name, score).await {
            Ok(accepted) => {
                tracing::info!(
                    "Submitted score {} for {:?} (rank {:?})",
                    score,
                    name,
                    accepted.rank
                );
                let top = client.top_scores(top).await.unwrap_or_else(|e| {
                    tracing::warn!("Could not fetch leaderboard: {}", e);
                    Vec::new()
                });
                LeaderboardMsg {
                    submitted: true,
                    rank: accepted.rank,
                    error: None,
                    top,
                }
            }
            Err(e) => LeaderboardMsg {
                submitted: false,
                rank: None,
                error: Some(e.to_string()),
                top: Vec::new(),
            },
        };
        let _ = broadcast_tx.send(GameBroadcast::Leaderboard(msg));
    });
}
