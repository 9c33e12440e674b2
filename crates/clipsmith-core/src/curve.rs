//! Keyframe response curves used to shape fade ramps.
//!
//! A curve maps normalized time `t` in `[0, 1]` to an amplitude multiplier.
//! Segments between keys are cubic Hermite splines built from each key's
//! tangents; outside the key range the curve holds the first/last value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

impl Keyframe {
    #[must_use]
    pub fn new(time: f32, value: f32, in_tangent: f32, out_tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FadeCurve {
    pub keyframes: Vec<Keyframe>,
}

impl Default for FadeCurve {
    fn default() -> Self {
        Self::linear()
    }
}

impl FadeCurve {
    /// Builds a curve from keys in any order; keys are sorted by time.
    #[must_use]
    pub fn new(mut keyframes: Vec<Keyframe>) -> Self {
        keyframes.sort_by(|left, right| left.time.total_cmp(&right.time));
        Self { keyframes }
    }

    /// Straight ramp from `(0, 0)` to `(1, 1)`.
    #[must_use]
    pub fn linear() -> Self {
        Self {
            keyframes: vec![
                Keyframe::new(0.0, 0.0, 1.0, 1.0),
                Keyframe::new(1.0, 1.0, 1.0, 1.0),
            ],
        }
    }

    /// Quarter-sine ramp, louder early than [`FadeCurve::linear`].
    #[must_use]
    pub fn ease_out() -> Self {
        let slope = std::f32::consts::FRAC_PI_2;
        Self {
            keyframes: vec![
                Keyframe::new(0.0, 0.0, slope, slope),
                Keyframe::new(1.0, 1.0, 0.0, 0.0),
            ],
        }
    }

    #[must_use]
    pub fn is_linear(&self) -> bool {
        *self == Self::linear()
    }

    #[must_use]
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keyframes.first(), self.keyframes.last()) else {
            return 1.0;
        };

        if t.is_nan() || t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        let segment = self
            .keyframes
            .windows(2)
            .find(|pair| t >= pair[0].time && t <= pair[1].time);
        match segment {
            Some(pair) => hermite(&pair[0], &pair[1], t),
            None => last.value,
        }
    }

    pub fn to_blob(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_blob(blob: &str) -> serde_json::Result<Self> {
        let curve: Self = serde_json::from_str(blob)?;
        Ok(Self::new(curve.keyframes))
    }
}

fn hermite(start: &Keyframe, end: &Keyframe, t: f32) -> f32 {
    let span = end.time - start.time;
    if span <= 0.0 {
        return end.value;
    }

    let out_slope = start.out_tangent * span;
    let in_slope = end.in_tangent * span;
    // Infinite tangents encode a stepped key.
    if !out_slope.is_finite() || !in_slope.is_finite() {
        return start.value;
    }

    let s = (t - start.time) / span;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    h00 * start.value + h10 * out_slope + h01 * end.value + h11 * in_slope
}
