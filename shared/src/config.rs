/// Lowest spawn rate a registry accepts (souls per second).
pub const MIN_SPAWN_RATE: f64 = 0.1;
/// Smallest field half-extent (world units).
pub const MIN_FIELD_SIZE: f64 = 1.0;
/// Shortest round length (seconds).
pub const MIN_DURATION: f64 = 1.0;
/// Smallest avatar collision radius.
pub const MIN_AVATAR_RADIUS: f64 = 0.05;

/// Gameplay knobs consumed by the simulation at construction.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Round length (seconds)
    pub duration: f64,
    /// Field half-extent along X
    pub field_half_x: f64,
    /// Field half-extent along Z
    pub field_half_z: f64,
    /// Souls never leave this radius around the field center
    pub soul_boundary_radius: f64,
    /// Vertical band souls are clamped to
    pub soul_min_height: f64,
    pub soul_max_height: f64,
    /// Height band new souls are spawned in
    pub spawn_height_min: f64,
    pub spawn_height_max: f64,
    pub max_souls: u32,
    /// Souls per second
    pub spawn_rate: f64,
    pub avatar_radius: f64,
    /// Avatar speed at full input deflection (units/second)
    pub avatar_speed: f64,
    pub avatar_start: [f64; 3],
    /// Broad-phase pre-filter radius around the avatar
    pub broad_phase_radius: f64,
    pub score_per_soul: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            duration: 60.0,
            field_half_x: 15.0,
            field_half_z: 15.0,
            soul_boundary_radius: 14.0,
            soul_min_height: 0.5,
            soul_max_height: 2.8,
            spawn_height_min: 1.0,
            spawn_height_max: 2.0,
            max_souls: 20,
            spawn_rate: 1.5,
            avatar_radius: 1.0,
            avatar_speed: 8.0,
            avatar_start: [0.0, 1.5, 0.0],
            broad_phase_radius: 5.0,
            score_per_soul: 1,
        }
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl GameConfig {
    /// Clamp every knob into its usable domain. Non-finite values fall back
    /// to the default for that knob.
    pub fn sanitized(self) -> Self {
        let d = GameConfig::default();

        let field_half_x = finite_or(self.field_half_x, d.field_half_x).max(MIN_FIELD_SIZE);
        let field_half_z = finite_or(self.field_half_z, d.field_half_z).max(MIN_FIELD_SIZE);
        // Inside the narrower axis, so souls stay within the avatar's reach
        let soul_boundary_radius = finite_or(self.soul_boundary_radius, d.soul_boundary_radius)
            .clamp(MIN_FIELD_SIZE, field_half_x.min(field_half_z));

        let (soul_min_height, soul_max_height) = ordered(
            finite_or(self.soul_min_height, d.soul_min_height),
            finite_or(self.soul_max_height, d.soul_max_height),
        );
        let (spawn_min, spawn_max) = ordered(
            finite_or(self.spawn_height_min, d.spawn_height_min),
            finite_or(self.spawn_height_max, d.spawn_height_max),
        );

        let avatar_radius = finite_or(self.avatar_radius, d.avatar_radius).max(MIN_AVATAR_RADIUS);

        let avatar_start = if self.avatar_start.iter().all(|c| c.is_finite()) {
            self.avatar_start
        } else {
            d.avatar_start
        };

        Self {
            duration: finite_or(self.duration, d.duration).max(MIN_DURATION),
            field_half_x,
            field_half_z,
            soul_boundary_radius,
            soul_min_height,
            soul_max_height,
            spawn_height_min: spawn_min.clamp(soul_min_height, soul_max_height),
            spawn_height_max: spawn_max.clamp(soul_min_height, soul_max_height),
            max_souls: self.max_souls.max(1),
            spawn_rate: finite_or(self.spawn_rate, d.spawn_rate).max(MIN_SPAWN_RATE),
            avatar_radius,
            avatar_speed: finite_or(self.avatar_speed, d.avatar_speed).max(0.0),
            avatar_start,
            broad_phase_radius: finite_or(self.broad_phase_radius, d.broad_phase_radius)
                .max(0.1),
            score_per_soul: self.score_per_soul,
        }
    }

    /// Report knobs that are structurally wrong. The simulation itself never
    /// rejects a config, it runs on `sanitized()`; this is for diagnostics.
    pub fn validate(&self) -> Result<(), String> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err("duration must be finite and > 0".to_string());
        }
        if !self.field_half_x.is_finite() || self.field_half_x < MIN_FIELD_SIZE {
            return Err(format!("field_half_x must be >= {}", MIN_FIELD_SIZE));
        }
        if !self.field_half_z.is_finite() || self.field_half_z < MIN_FIELD_SIZE {
            return Err(format!("field_half_z must be >= {}", MIN_FIELD_SIZE));
        }
        if self.soul_min_height > self.soul_max_height {
            return Err("soul_min_height must be <= soul_max_height".to_string());
        }
        if self.spawn_height_min > self.spawn_height_max {
            return Err("spawn_height_min must be <= spawn_height_max".to_string());
        }
        if self.max_souls == 0 {
            return Err("max_souls must be > 0".to_string());
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate < MIN_SPAWN_RATE {
            return Err(format!("spawn_rate must be >= {}", MIN_SPAWN_RATE));
        }
        if !self.avatar_radius.is_finite() || self.avatar_radius <= 0.0 {
            return Err("avatar_radius must be finite and > 0".to_string());
        }
        Ok(())
    }
}
