use skull_shared::config::GameConfig;
use skull_shared::vec3::Vec3;

/// The player's body as seen by the state machine.
pub trait Avatar {
    fn position(&self) -> Vec3;

    /// Move by an input deflection (each axis in [-1, 1]) over `dt` seconds.
    fn move_by(&mut self, dx: f64, dz: f64, dt: f64);

    /// Back to the start position.
    fn reset(&mut self);
}

/// The skull: glides in the XZ plane at a fixed hover height, never
/// leaving the field rectangle.
#[derive(Debug, Clone)]
pub struct SkullAvatar {
    position: Vec3,
    start: Vec3,
    speed: f64,
    half_x: f64,
    half_z: f64,
    /// Yaw in radians, follows the last non-zero movement direction
    heading: f64,
}

impl SkullAvatar {
    pub fn new(config: &GameConfig) -> Self {
        let config = config.sanitized();
        let [x, y, z] = config.avatar_start;
        let start = Vec3::new(
            x.clamp(-config.field_half_x, config.field_half_x),
            y,
            z.clamp(-config.field_half_z, config.field_half_z),
        );
        Self {
            position: start,
            start,
            speed: config.avatar_speed,
            half_x: config.field_half_x,
            half_z: config.field_half_z,
            heading: 0.0,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }
}

impl Avatar for SkullAvatar {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn move_by(&mut self, dx: f64, dz: f64, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let dx = if dx.is_finite() { dx.clamp(-1.0, 1.0) } else { 0.0 };
        let dz = if dz.is_finite() { dz.clamp(-1.0, 1.0) } else { 0.0 };
        if dx == 0.0 && dz == 0.0 {
            return;
        }

        let step = self.speed * dt;
        self.position.x = (self.position.x + dx * step).clamp(-self.half_x, self.half_x);
        self.position.z = (self.position.z + dz * step).clamp(-self.half_z, self.half_z);
        self.heading = dx.atan2(dz);
    }

    fn reset(&mut self) {
        self.position = self.start;
        self.heading = 0.0;
    }
}
