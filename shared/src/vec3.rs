/// 3D vector utilities for the soul field.
/// Y is up; the playing field lies in the XZ-plane.

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Wire representation used in snapshots.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Shorthand constructor
pub fn vec3(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Dot product
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Vector length
pub fn length(v: Vec3) -> f64 {
    length_squared(v).sqrt()
}

/// Squared length, for comparisons that don't need the root
pub fn length_squared(v: Vec3) -> f64 {
    dot(v, v)
}

/// Scale vector by scalar
pub fn scale(v: Vec3, s: f64) -> Vec3 {
    Vec3::new(v.x * s, v.y * s, v.z * s)
}

/// Add two vectors
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

/// Euclidean distance between two points
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    length(sub(a, b))
}

/// Squared distance between two points
pub fn distance_squared(a: Vec3, b: Vec3) -> f64 {
    length_squared(sub(a, b))
}

/// Distance from the vertical axis through the origin.
pub fn horizontal_length(v: Vec3) -> f64 {
    (v.x * v.x + v.z * v.z).sqrt()
}

/// Pull a point back inside a vertical cylinder of `max_radius` around the
/// origin. The Y component is left untouched.
pub fn clamp_horizontal(v: Vec3, max_radius: f64) -> Vec3 {
    let r = horizontal_length(v);
    if r <= max_radius || r < 1e-10 {
        return v;
    }
    let k = max_radius / r;
    Vec3::new(v.x * k, v.y, v.z * k)
}
