/// Steering deflection, each axis in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputVector {
    pub x: f64,
    pub z: f64,
}

impl InputVector {
    pub const ZERO: InputVector = InputVector { x: 0.0, z: 0.0 };

    /// Clamp both axes; non-finite values read as centered.
    pub fn new(x: f64, z: f64) -> Self {
        Self {
            x: clamp_axis(x),
            z: clamp_axis(z),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.x == 0.0 && self.z == 0.0
    }
}

fn clamp_axis(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Read once per Playing frame.
pub trait InputSource {
    fn input_vector(&self) -> InputVector;
}

/// Latest steering written by whoever owns the device (the WebSocket
/// bridge, the autopilot, a test).
#[derive(Debug, Clone, Default)]
pub struct InputState {
    current: InputVector,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, x: f64, z: f64) {
        self.current = InputVector::new(x, z);
    }

    pub fn set_vector(&mut self, v: InputVector) {
        self.current = InputVector::new(v.x, v.z);
    }

    pub fn clear(&mut self) {
        self.current = InputVector::ZERO;
    }
}

impl InputSource for InputState {
    fn input_vector(&self) -> InputVector {
        self.current
    }
}
