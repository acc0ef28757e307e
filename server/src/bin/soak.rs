//! Soak test for the skull simulation.
//!
//! Runs many headless sessions in parallel, each one played by the autopilot
//! for a number of rounds, and checks the round invariants as it goes:
//! - score equals souls collected times points per soul
//! - the live soul count never exceeds the cap
//! - the timer ends at exactly zero
//! - every round reaches game over exactly once
//!
//! Usage: cargo run --bin soak -- [OPTIONS]
//!
//! Options:
//!   --sessions N       Parallel sessions (default: 32)
//!   --rounds N         Rounds per session (default: 5)
//!   --duration S       Round length in seconds (default: 20)
//!   --seed N           Base RNG seed (default: 1)
//!   --leaderboard URL  Submit every final score to this service
//!   --name NAME        Player name for submissions (default: soak)

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use skull_server::avatar::Avatar;
use skull_server::bot::{Autopilot, BotPersonality};
use skull_server::collision::CollisionEvent;
use skull_server::leaderboard::{LeaderboardClient, RetryPolicy};
use skull_server::state::{GamePhase, HeadlessGame};
use skull_server::ui::UiEvent;
use skull_shared::config::GameConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME_DT: f64 = 1.0 / 60.0;

// === Metrics ===

struct Metrics {
    rounds: AtomicU64,
    frames: AtomicU64,
    collisions: AtomicU64,
    souls_collected: AtomicU64,
    souls_spawned: AtomicU64,
    total_score: AtomicU64,
    best_score: AtomicU64,
    violations: AtomicU64,
    submissions_ok: AtomicU64,
    submissions_failed: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            rounds: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            souls_collected: AtomicU64::new(0),
            souls_spawned: AtomicU64::new(0),
            total_score: AtomicU64::new(0),
            best_score: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            submissions_ok: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
        }
    }

    fn violation(&self, session_id: u32, what: String) {
        if self.violations.fetch_add(1, Ordering::Relaxed) < 10 {
            eprintln!("Session {} violated: {}", session_id, what);
        }
    }
}

// === Session task ===

struct SessionPlan {
    rounds: u32,
    seed: u64,
    game: GameConfig,
    leaderboard: Option<LeaderboardClient>,
    name: String,
}

/// Play one round to game over. Returns the final score.
fn play_round(
    session_id: u32,
    game: &mut HeadlessGame,
    bot: &mut Autopilot,
    rng: &mut ChaCha8Rng,
    metrics: &Metrics,
) -> Option<u32> {
    let cap = game.registry().max_souls();
    // Generous bound so a stuck timer shows up as a violation, not a hang
    let max_frames = (game.duration() / FRAME_DT) as u64 * 2 + 10;
    let mut frames = 0u64;

    while game.phase() == GamePhase::Playing {
        if frames >= max_frames {
            metrics.violation(session_id, format!("round still running after {} frames", frames));
            return None;
        }
        let steer = bot.steer(FRAME_DT, game.avatar().position(), game.registry(), rng);
        game.input_mut().set_vector(steer);
        game.update(FRAME_DT);
        frames += 1;

        if game.registry().active_count() > cap {
            metrics.violation(
                session_id,
                format!("{} live souls with cap {}", game.registry().active_count(), cap),
            );
        }
    }
    metrics.frames.fetch_add(frames, Ordering::Relaxed);

    let events = game.ui_mut().map(|ui| ui.take_events()).unwrap_or_default();
    let game_overs = events
        .iter()
        .filter(|e| matches!(e, UiEvent::PhaseChanged(GamePhase::GameOver)))
        .count();
    if game_overs != 1 {
        metrics.violation(session_id, format!("game over signalled {} times", game_overs));
    }
    if game.time_remaining() != 0.0 {
        metrics.violation(
            session_id,
            format!("timer ended at {} instead of 0", game.time_remaining()),
        );
    }

    let Some(stats) = game.last_stats() else {
        metrics.violation(session_id, "no stats after game over".to_string());
        return None;
    };
    let per_soul = game.score_per_soul();
    if stats.score != stats.souls_collected.saturating_mul(per_soul) {
        metrics.violation(
            session_id,
            format!(
                "score {} for {} souls at {} each",
                stats.score, stats.souls_collected, per_soul
            ),
        );
    }

    metrics.rounds.fetch_add(1, Ordering::Relaxed);
    metrics
        .souls_collected
        .fetch_add(stats.souls_collected as u64, Ordering::Relaxed);
    metrics
        .souls_spawned
        .fetch_add(stats.souls_spawned as u64, Ordering::Relaxed);
    metrics
        .total_score
        .fetch_add(stats.score as u64, Ordering::Relaxed);
    metrics
        .best_score
        .fetch_max(stats.score as u64, Ordering::Relaxed);
    Some(stats.score)
}

async fn run_session(session_id: u32, plan: Arc<SessionPlan>, metrics: Arc<Metrics>) {
    let seed = plan.seed.wrapping_add(session_id as u64);
    let mut game = HeadlessGame::headless(&plan.game, seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
    let mut bot = Autopilot::new(BotPersonality::random(&mut rng), &mut rng);

    let collisions = Arc::clone(&metrics);
    game.collisions_mut()
        .add_collision_callback(Box::new(move |_: &CollisionEvent| {
            collisions.collisions.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }));

    for round in 0..plan.rounds {
        let started = if round == 0 {
            game.start_game()
        } else {
            game.restart_game()
        };
        if !started {
            metrics.violation(session_id, format!("round {} did not start", round));
            return;
        }
        bot.reset();

        let Some(score) = play_round(session_id, &mut game, &mut bot, &mut rng, &metrics) else {
            return;
        };

        if let Some(client) = &plan.leaderboard {
            match client.submit_score(&plan.name, score).await {
                Ok(_) => metrics.submissions_ok.fetch_add(1, Ordering::Relaxed),
                Err(_) => metrics.submissions_failed.fetch_add(1, Ordering::Relaxed),
            };
        }

        // Let the other sessions run between rounds
        tokio::task::yield_now().await;
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut num_sessions: u32 = 32;
    let mut rounds: u32 = 5;
    let mut duration_secs: f64 = 20.0;
    let mut seed: u64 = 1;
    let mut leaderboard_url: Option<String> = None;
    let mut name = "soak".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--sessions" => {
                i += 1;
                num_sessions = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(32);
            }
            "--rounds" => {
                i += 1;
                rounds = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(5);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(1);
            }
            "--leaderboard" => {
                i += 1;
                leaderboard_url = args.get(i).cloned();
            }
            "--name" => {
                i += 1;
                name = args.get(i).cloned().unwrap_or(name);
            }
            _ => {}
        }
        i += 1;
    }

    let game = GameConfig {
        duration: duration_secs,
        ..Default::default()
    };
    if let Err(e) = game.validate() {
        eprintln!("Invalid game configuration: {}", e);
        std::process::exit(1);
    }

    let leaderboard = match leaderboard_url.as_deref() {
        Some(url) => match LeaderboardClient::new(url, RetryPolicy::default()) {
            Ok(client) => Some(client),
            Err(e) => {
                eprintln!("Invalid leaderboard URL {}: {}", url, e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    println!("=== Skull Soak Test ===");
    println!("Sessions: {}", num_sessions);
    println!("Rounds per session: {}", rounds);
    println!("Round length: {}s", duration_secs);
    println!("Seed: {}", seed);
    if let Some(url) = &leaderboard_url {
        println!("Leaderboard: {} as {:?}", url, name);
    }
    println!();

    let plan = Arc::new(SessionPlan {
        rounds,
        seed,
        game,
        leaderboard,
        name,
    });
    let metrics = Arc::new(Metrics::new());

    let start = Instant::now();
    let mut handles = Vec::with_capacity(num_sessions as usize);
    for session_id in 0..num_sessions {
        let plan = Arc::clone(&plan);
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_session(session_id, plan, metrics).await;
        }));
    }

    // Print progress periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        interval.tick().await;
        loop {
            interval.tick().await;
            println!(
                "[{:5.1}s] rounds={}, frames={}, collisions={}, violations={}",
                start.elapsed().as_secs_f64(),
                metrics_clone.rounds.load(Ordering::Relaxed),
                metrics_clone.frames.load(Ordering::Relaxed),
                metrics_clone.collisions.load(Ordering::Relaxed),
                metrics_clone.violations.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        if let Err(e) = handle.await {
            eprintln!("Session task failed: {}", e);
            metrics.violations.fetch_add(1, Ordering::Relaxed);
        }
    }
    stats_handle.abort();
    let elapsed = start.elapsed();

    // Final stats
    let rounds_done = metrics.rounds.load(Ordering::Relaxed);
    let frames = metrics.frames.load(Ordering::Relaxed);
    let collected = metrics.souls_collected.load(Ordering::Relaxed);
    let spawned = metrics.souls_spawned.load(Ordering::Relaxed);
    let collisions = metrics.collisions.load(Ordering::Relaxed);
    let total_score = metrics.total_score.load(Ordering::Relaxed);
    let violations = metrics.violations.load(Ordering::Relaxed);

    println!();
    println!("=== Final Results ===");
    println!("Rounds played: {}", rounds_done);
    println!("Frames simulated: {}", frames);
    println!(
        "Simulation speed: {:.0} frames/s ({:.1}x realtime per session)",
        frames as f64 / elapsed.as_secs_f64().max(1e-9),
        frames as f64 * FRAME_DT / elapsed.as_secs_f64().max(1e-9) / num_sessions.max(1) as f64
    );
    println!("Souls spawned: {}", spawned);
    println!("Souls collected: {}", collected);
    println!("Collision callbacks: {}", collisions);
    if rounds_done > 0 {
        println!("Average score: {:.1}", total_score as f64 / rounds_done as f64);
    }
    println!("Best score: {}", metrics.best_score.load(Ordering::Relaxed));
    if plan.leaderboard.is_some() {
        println!(
            "Submissions: {} ok, {} failed",
            metrics.submissions_ok.load(Ordering::Relaxed),
            metrics.submissions_failed.load(Ordering::Relaxed)
        );
    }
    if collisions != collected {
        eprintln!(
            "Collision callbacks ({}) do not match collected souls ({})",
            collisions, collected
        );
    }
    println!("Invariant violations: {}", violations);

    if violations > 0 || collisions != collected {
        std::process::exit(1);
    }
    println!("PASSED");
}
