use crate::leaderboard::{validate_name, RetryPolicy};
use skull_shared::config::GameConfig;
use std::str::FromStr;

/// Slowest tick rate whose step fits the simulation's per-frame dt cap.
/// Anything slower would make the countdown lag wall-clock time.
pub const MIN_TICK_RATE_HZ: u32 = 30;

/// Host configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub listen_addr: String,
    pub tick_rate_hz: u32,
    pub broadcast_rate_hz: u32,
    pub rng_seed: u64,
    /// Score service base URL; no submissions when unset
    pub leaderboard_url: Option<String>,
    pub player_name: Option<String>,
    /// Let the bot steer instead of the connected renderer
    pub autopilot: bool,
    /// Rows fetched after a submission
    pub leaderboard_top: u32,
    pub retry: RetryPolicy,
    pub game: GameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9002".to_string(),
            tick_rate_hz: 60,
            broadcast_rate_hz: 30,
            rng_seed: 42,
            leaderboard_url: None,
            player_name: None,
            autopilot: false,
            leaderboard_top: 10,
            retry: RetryPolicy::default(),
            game: GameConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `SKULL_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(addr) = non_empty(lookup("SKULL_LISTEN_ADDR")) {
            config.listen_addr = addr;
        }
        if let Some(hz) = parse_var(&lookup, "SKULL_TICK_RATE_HZ")? {
            config.tick_rate_hz = hz;
        }
        if let Some(hz) = parse_var(&lookup, "SKULL_BROADCAST_RATE_HZ")? {
            config.broadcast_rate_hz = hz;
        }
        if let Some(seed) = parse_var(&lookup, "SKULL_RNG_SEED")? {
            config.rng_seed = seed;
        }
        config.leaderboard_url = non_empty(lookup("SKULL_LEADERBOARD_URL"));
        config.player_name = non_empty(lookup("SKULL_PLAYER_NAME"));
        if let Some(raw) = non_empty(lookup("SKULL_AUTOPILOT")) {
            config.autopilot = parse_flag(&raw)
                .ok_or_else(|| format!("SKULL_AUTOPILOT: expected a boolean, got {:?}", raw))?;
        }
        if let Some(duration) = parse_var(&lookup, "SKULL_GAME_DURATION")? {
            config.game.duration = duration;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz < MIN_TICK_RATE_HZ {
            return Err(format!(
                "tick_rate_hz must be >= {}, got {}",
                MIN_TICK_RATE_HZ, self.tick_rate_hz
            ));
        }
        if self.broadcast_rate_hz == 0 {
            return Err("broadcast_rate_hz must be > 0".to_string());
        }
        if self.broadcast_rate_hz > self.tick_rate_hz {
            return Err(format!(
                "broadcast_rate_hz ({}) must be <= tick_rate_hz ({})",
                self.broadcast_rate_hz, self.tick_rate_hz
            ));
        }
        if let Some(url) = &self.leaderboard_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("leaderboard_url must be http(s), got {:?}", url));
            }
        }
        if let Some(name) = &self.player_name {
            validate_name(name).map_err(|e| e.to_string())?;
        }
        if self.leaderboard_top == 0 {
            return Err("leaderboard_top must be > 0".to_string());
        }
        self.retry.validate()?;
        self.game.validate()?;
        Ok(())
    }

    /// Fixed simulation step (seconds)
    pub fn tick_dt(&self) -> f64 {
        1.0 / self.tick_rate_hz.max(1) as f64
    }

    /// Ticks between two frame broadcasts
    pub fn broadcast_every(&self) -> u32 {
        (self.tick_rate_hz / self.broadcast_rate_hz.max(1)).max(1)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, String> {
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{}: cannot parse {:?}", key, raw)),
        None => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{GamePhase, HeadlessGame, MAX_FRAME_DT};
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast_every(), 2);
        assert!((config.tick_dt() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn env_overrides_apply() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("SKULL_LISTEN_ADDR", "127.0.0.1:7000"),
            ("SKULL_TICK_RATE_HZ", "120"),
            ("SKULL_RNG_SEED", "7"),
            ("SKULL_LEADERBOARD_URL", "http://scores.local"),
            ("SKULL_PLAYER_NAME", "Bones"),
            ("SKULL_AUTOPILOT", "yes"),
            ("SKULL_GAME_DURATION", "45"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.tick_rate_hz, 120);
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.leaderboard_url.as_deref(), Some("http://scores.local"));
        assert_eq!(config.player_name.as_deref(), Some("Bones"));
        assert!(config.autopilot);
        assert_eq!(config.game.duration, 45.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("SKULL_LEADERBOARD_URL", "   "),
            ("SKULL_TICK_RATE_HZ", ""),
        ]))
        .unwrap();
        assert_eq!(config.leaderboard_url, None);
        assert_eq!(config.tick_rate_hz, 60);
    }

    #[test]
    fn unparsable_values_are_errors() {
        assert!(SessionConfig::from_lookup(lookup_from(&[("SKULL_TICK_RATE_HZ", "fast")])).is_err());
        assert!(SessionConfig::from_lookup(lookup_from(&[("SKULL_AUTOPILOT", "maybe")])).is_err());
    }

    #[test]
    fn slow_tick_rates_are_rejected() {
        let slow = SessionConfig {
            tick_rate_hz: 20,
            broadcast_rate_hz: 10,
            ..Default::default()
        };
        assert!(slow.validate().is_err());

        let slowest = SessionConfig {
            tick_rate_hz: MIN_TICK_RATE_HZ,
            broadcast_rate_hz: 10,
            ..Default::default()
        };
        assert!(slowest.validate().is_ok());
        assert!(slowest.tick_dt() <= MAX_FRAME_DT + 1e-12);
    }

    #[test]
    fn round_keeps_wall_clock_pace_at_slowest_tick_rate() {
        let mut config = SessionConfig {
            tick_rate_hz: MIN_TICK_RATE_HZ,
            broadcast_rate_hz: 10,
            ..Default::default()
        };
        config.game.duration = 10.0;
        let mut game = HeadlessGame::headless(&config.game, config.rng_seed);
        game.start_game();

        // Ten wall-clock seconds of ticks, plus one for rounding
        let ticks = config.game.duration as u32 * config.tick_rate_hz + 1;
        for _ in 0..ticks {
            game.update(config.tick_dt());
        }
        assert_eq!(game.phase(), GamePhase::GameOver);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_rate = SessionConfig {
            broadcast_rate_hz: 120,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        let bad_url = SessionConfig {
            leaderboard_url: Some("ftp://x".to_string()),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let bad_name = SessionConfig {
            player_name: Some("a".repeat(40)),
            ..Default::default()
        };
        assert!(bad_name.validate().is_err());

        let mut bad_game = SessionConfig::default();
        bad_game.game.duration = -1.0;
        assert!(bad_game.validate().is_err());
    }
}
