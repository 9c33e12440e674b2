#[must_use]
pub fn seconds_to_frames(seconds: f32, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    let frames = (f64::from(seconds) * f64::from(sample_rate)).floor();
    if frames >= usize::MAX as f64 {
        usize::MAX
    } else {
        frames as usize
    }
}

#[must_use]
pub fn frames_to_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 / f64::from(sample_rate)
}

/// Maps a `[0, 1]` fraction of a clip onto a frame index using `floor`,
/// clamped to `[0, frames]`.
#[must_use]
pub fn fraction_to_frame(fraction: f32, frames: usize) -> usize {
    if !fraction.is_finite() || fraction <= 0.0 {
        return 0;
    }

    let index = (f64::from(fraction) * frames as f64).floor();
    if index >= frames as f64 {
        frames
    } else {
        index as usize
    }
}

/// Smallest fraction that [`fraction_to_frame`] maps back to at least
/// `frame`; exactly `frame` whenever `f32` can resolve it.
#[must_use]
pub fn frame_to_fraction(frame: usize, frames: usize) -> f32 {
    if frames == 0 {
        return 0.0;
    }

    let frame = frame.min(frames);
    let mut fraction = (frame as f64 / frames as f64) as f32;
    // Rounding to f32 may land just below the frame boundary.
    while fraction < 1.0 && fraction_to_frame(fraction, frames) < frame {
        fraction = f32::from_bits(fraction.to_bits() + 1);
    }
    fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_floor_to_whole_frames() {
        assert_eq!(seconds_to_frames(1.0, 44_100), 44_100);
        assert_eq!(seconds_to_frames(0.5, 3), 1);
        assert_eq!(seconds_to_frames(0.0, 48_000), 0);
        assert_eq!(seconds_to_frames(-2.0, 48_000), 0);
        assert_eq!(seconds_to_frames(f32::NAN, 48_000), 0);
    }

    #[test]
    fn fractions_floor_and_clamp() {
        assert_eq!(fraction_to_frame(0.25, 4), 1);
        assert_eq!(fraction_to_frame(0.75, 4), 3);
        assert_eq!(fraction_to_frame(1.0, 4), 4);
        assert_eq!(fraction_to_frame(3.0, 4), 4);
        assert_eq!(fraction_to_frame(-0.5, 4), 0);
    }

    #[test]
    fn every_frame_boundary_maps_back_exactly() {
        for frames in [1, 3, 7, 1_000, 44_100, 48_000] {
            for frame in 0..=frames {
                let fraction = frame_to_fraction(frame, frames);
                assert_eq!(
                    fraction_to_frame(fraction, frames),
                    frame,
                    "frame {frame} of {frames} via {fraction}"
                );
            }
        }

        for frames in [96_000, 1_234_567] {
            for frame in (0..=frames).step_by(97) {
                assert_eq!(fraction_to_frame(frame_to_fraction(frame, frames), frames), frame);
            }
        }
        assert_eq!(fraction_to_frame(frame_to_fraction(44_098, 44_100), 44_100), 44_098);
    }

    #[test]
    fn frame_fraction_round_trip_is_stable() {
        let frames = 48_000;
        let fraction = frame_to_fraction(12_000, frames);
        assert_eq!(fraction_to_frame(fraction, frames), 12_000);
        assert!((frames_to_seconds(frames, 48_000) - 1.0).abs() < f64::EPSILON);
    }
}
