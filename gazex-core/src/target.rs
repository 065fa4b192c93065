use serde::{Deserialize, Serialize};

/// Screen-space vector in pixels, origin bottom-left.
pub type Vec2 = nalgebra::Vector2<f32>;

/// Per-axis marker for an off-screen or invalid gaze coordinate.
pub const INVALID_PIXEL: f32 = -1.0;

pub fn invalid_pixel() -> Vec2 {
    Vec2::new(INVALID_PIXEL, INVALID_PIXEL)
}

/// True when either axis carries the invalid marker or is not a number.
pub fn is_invalid_pixel(p: &Vec2) -> bool {
    p.x == INVALID_PIXEL || p.y == INVALID_PIXEL || p.x.is_nan() || p.y.is_nan()
}

/// Compact identifier of a named scene object, allocated by the object registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Fixation,
    Cue,
    Target,
    Distractor,
}

/// A circular gaze window around an on-screen object.
///
/// `size` is the object's full on-screen extent in pixels and `window_fraction` scales
/// it into a radius, so a fraction of 0.5 gives a window that covers exactly the
/// object and larger fractions add tolerance around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWindow {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Vec2,
    pub size: f32,
    pub window_fraction: f32,
}

impl TargetWindow {
    pub fn new(id: ObjectId, kind: ObjectKind, position: Vec2, size: f32, window_fraction: f32) -> Self {
        Self {
            id,
            kind,
            position,
            size,
            window_fraction,
        }
    }

    pub fn radius(&self) -> f32 {
        self.size * self.window_fraction
    }

    /// Euclidean containment test against an explicit radius, boundary inclusive.
    pub fn contains(&self, pixel: &Vec2, radius: f32) -> bool {
        (pixel - self.position).norm() <= radius
    }
}
