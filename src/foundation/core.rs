use crate::foundation::error::{MorphError, MorphResult};

pub use kurbo::Point;

/// Identity of one rendered frame: which transition of the cycle, and which timestep inside it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex {
    /// 0-based transition index (`k` morphs picture `k` into picture `k + 1`, cycle-closed).
    pub transition: u32,
    /// 0-based timestep inside the transition.
    pub time: u32,
}

/// Shape of the global frame sequence: `transitions * frames_per_transition` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameLayout {
    /// Number of transitions in the cycle (equal to the number of pictures).
    pub transitions: u32,
    /// Frames rendered for every transition.
    pub frames_per_transition: u32,
}

impl FrameLayout {
    /// Create a validated layout with non-zero dimensions.
    pub fn new(transitions: u32, frames_per_transition: u32) -> MorphResult<Self> {
        if transitions == 0 {
            return Err(MorphError::validation("frame layout needs at least one transition"));
        }
        if frames_per_transition == 0 {
            return Err(MorphError::validation(
                "frame layout needs at least one frame per transition",
            ));
        }
        Ok(Self {
            transitions,
            frames_per_transition,
        })
    }

    /// Total number of rendered frames.
    pub fn total_frames(self) -> u64 {
        u64::from(self.transitions) * u64::from(self.frames_per_transition)
    }

    /// Global index of `idx`: `transition * frames_per_transition + time`.
    pub fn global(self, idx: FrameIndex) -> u64 {
        u64::from(idx.transition) * u64::from(self.frames_per_transition) + u64::from(idx.time)
    }

    /// Inverse of [`FrameLayout::global`]. Returns `None` outside `[0, total_frames)`.
    pub fn locate(self, global: u64) -> Option<FrameIndex> {
        if global >= self.total_frames() {
            return None;
        }
        let f = u64::from(self.frames_per_transition);
        Some(FrameIndex {
            transition: (global / f) as u32,
            time: (global % f) as u32,
        })
    }

    /// Return `true` for the first frame of a transition (where the loop pauses).
    pub fn is_transition_start(self, global: u64) -> bool {
        global.is_multiple_of(u64::from(self.frames_per_transition))
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> MorphResult<Self> {
        if den == 0 {
            return Err(MorphError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(MorphError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in milliseconds, as a `(numerator, denominator)` pair.
    pub fn frame_delay_ms(self) -> (u32, u32) {
        (self.den.saturating_mul(1000), self.num)
    }

    /// Convert seconds to a frame count, rounding to the nearest frame.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

/// Pixel dimensions, used both for the output canvas and for the density field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create validated, non-empty dimensions.
    pub fn new(width: u32, height: u32) -> MorphResult<Self> {
        if width == 0 || height == 0 {
            return Err(MorphError::validation(format!(
                "canvas must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Number of pixels.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
