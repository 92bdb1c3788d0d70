use serde::{Deserialize, Serialize};

use super::value::{LeBytes, RemoteValue};

/// Engine `Vector` (three packed floats)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vector3f) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance ignoring the vertical axis
    pub fn distance_xy(&self, other: &Vector3f) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Exact equality of the raw float bits.
    ///
    /// Unlike `==` this distinguishes `0.0` from `-0.0` and matches NaN payloads,
    /// which is what placement-exact props need.
    pub fn bit_equals(&self, other: &Vector3f) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.z.to_bits() == other.z.to_bits()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

impl RemoteValue for Vector3f {
    const SIZE: usize = 12;

    fn decode(bytes: &[u8]) -> Self {
        let mut cursor = LeBytes::new(bytes);
        Self {
            x: cursor.f32(),
            y: cursor.f32(),
            z: cursor.f32(),
        }
    }
}

impl std::fmt::Display for Vector3f {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {:.2} {:.2}", self.x, self.y, self.z)
    }
}
