use super::{jitter, jitter_vec2, jitter_vec4};
use anyhow::{anyhow, Result};
use glam::{Vec2, Vec4};
use rand::Rng;
use std::sync::Arc;

/// Snapshot of a particle's appearance at normalized lifetime `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub size: Vec2,
    pub color: Vec4,
    pub rotation_speed: f32,
    pub size_variation: Vec2,
    pub color_variation: Vec4,
    pub rotation_speed_variation: f32,
    pub time: f32,
}

impl Keyframe {
    pub fn new(time: f32, size: Vec2, color: Vec4) -> Self {
        Self {
            size,
            color,
            rotation_speed: 0.0,
            size_variation: Vec2::ZERO,
            color_variation: Vec4::ZERO,
            rotation_speed_variation: 0.0,
            time,
        }
    }

    pub fn with_rotation_speed(mut self, speed: f32, variation: f32) -> Self {
        self.rotation_speed = speed;
        self.rotation_speed_variation = variation;
        self
    }

    pub fn with_variation(mut self, size: Vec2, color: Vec4) -> Self {
        self.size_variation = size;
        self.color_variation = color;
        self
    }

    fn roll_variation<R: Rng + ?Sized>(&self, rng: &mut R) -> KeyframeVariation {
        KeyframeVariation {
            size: jitter_vec2(rng, self.size_variation),
            color: jitter_vec4(rng, self.color_variation),
            rotation_speed: jitter(rng, self.rotation_speed_variation),
        }
    }

    fn sample(&self, variation: &KeyframeVariation) -> KeyframeSample {
        KeyframeSample {
            size: self.size + variation.size,
            color: self.color + variation.color,
            rotation_speed: self.rotation_speed + variation.rotation_speed,
        }
    }
}

/// Per-particle random offsets applied on top of a keyframe's values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeyframeVariation {
    pub size: Vec2,
    pub color: Vec4,
    pub rotation_speed: f32,
}

/// Displayed properties produced by interpolating a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeSample {
    pub size: Vec2,
    pub color: Vec4,
    pub rotation_speed: f32,
}

impl KeyframeSample {
    fn lerp(&self, other: &KeyframeSample, alpha: f32) -> KeyframeSample {
        KeyframeSample {
            size: self.size.lerp(other.size, alpha),
            color: self.color.lerp(other.color, alpha),
            rotation_speed: self.rotation_speed + (other.rotation_speed - self.rotation_speed) * alpha,
        }
    }
}

/// Immutable, non-empty sequence of keyframes ordered by time.
#[derive(Debug, Clone)]
pub struct KeyframeTrack {
    frames: Arc<[Keyframe]>,
}

impl KeyframeTrack {
    pub fn new(frames: Vec<Keyframe>) -> Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("Keyframe track must contain at least one keyframe"));
        }
        let mut previous = f32::NEG_INFINITY;
        for (index, frame) in frames.iter().enumerate() {
            if !frame.time.is_finite() || !(0.0..=1.0).contains(&frame.time) {
                return Err(anyhow!("Keyframe {index} time {} must lie in [0, 1]", frame.time));
            }
            if frame.time < previous {
                return Err(anyhow!("Keyframe {index} time {} is earlier than the previous keyframe", frame.time));
            }
            if !frame.size.is_finite() || !frame.color.is_finite() || !frame.rotation_speed.is_finite() {
                return Err(anyhow!("Keyframe {index} contains non-finite values"));
            }
            previous = frame.time;
        }
        Ok(Self { frames: Arc::from(frames.into_boxed_slice()) })
    }

    /// Single keyframe at `t = 0`: properties stay constant for the whole lifetime.
    pub fn constant(size: Vec2, color: Vec4) -> Self {
        Self { frames: Arc::from(vec![Keyframe::new(0.0, size, color)].into_boxed_slice()) }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Keyframe] {
        &self.frames
    }

    /// Index of the first keyframe strictly after `scaled_time`.
    pub fn find_next(&self, scaled_time: f32) -> Option<usize> {
        self.frames.iter().position(|frame| frame.time > scaled_time)
    }

    pub fn uses_rotation(&self) -> bool {
        self.frames.iter().any(|frame| frame.rotation_speed != 0.0 || frame.rotation_speed_variation != 0.0)
    }
}

/// Weak cursor into a [`KeyframeTrack`]: indices plus the rolled variations
/// for the current and next keyframe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeyframeCursor {
    pub current: usize,
    pub next: Option<usize>,
    pub current_variation: KeyframeVariation,
    pub next_variation: KeyframeVariation,
}

impl KeyframeCursor {
    /// Resets to the start of `track` and returns the spawn-time sample.
    pub fn start<R: Rng + ?Sized>(&mut self, track: &KeyframeTrack, rng: &mut R) -> KeyframeSample {
        self.current = 0;
        self.next = if track.len() > 1 { Some(1) } else { None };
        self.current_variation = track.frames[0].roll_variation(rng);
        self.next_variation = match self.next {
            Some(index) => track.frames[index].roll_variation(rng),
            None => KeyframeVariation::default(),
        };
        track.frames[0].sample(&self.current_variation)
    }

    /// Advances to `scaled_time` (particle age over lifetime) and samples the track.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        track: &KeyframeTrack,
        scaled_time: f32,
        rng: &mut R,
    ) -> KeyframeSample {
        let frames = track.frames();
        if let Some(next) = self.next {
            if scaled_time >= frames[next].time {
                match track.find_next(scaled_time) {
                    Some(found) => {
                        let new_current = found.saturating_sub(1);
                        if new_current == next {
                            self.current_variation = self.next_variation;
                        } else {
                            self.current_variation = frames[new_current].roll_variation(rng);
                        }
                        self.next_variation = frames[found].roll_variation(rng);
                        self.current = new_current;
                        self.next = Some(found);
                    }
                    None => {
                        let last = frames.len() - 1;
                        if last == next {
                            self.current_variation = self.next_variation;
                        } else {
                            self.current_variation = frames[last].roll_variation(rng);
                        }
                        self.current = last;
                        self.next = None;
                    }
                }
            }
        }

        let current = &frames[self.current];
        let Some(next_index) = self.next else {
            return current.sample(&self.current_variation);
        };
        let next = &frames[next_index];
        let span = next.time - current.time;
        let alpha = if span > 0.0 { ((scaled_time - current.time) / span).clamp(0.0, 1.0) } else { 1.0 };
        current.sample(&self.current_variation).lerp(&next.sample(&self.next_variation), alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn three_step_track() -> KeyframeTrack {
        KeyframeTrack::new(vec![
            Keyframe::new(0.0, Vec2::splat(1.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            Keyframe::new(0.5, Vec2::splat(2.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
            Keyframe::new(1.0, Vec2::splat(4.0), Vec4::new(0.0, 0.0, 1.0, 0.0)),
        ])
        .expect("valid track")
    }

    #[test]
    fn rejects_empty_and_unordered_tracks() {
        assert!(KeyframeTrack::new(Vec::new()).is_err());
        let unordered = vec![
            Keyframe::new(0.6, Vec2::ONE, Vec4::ONE),
            Keyframe::new(0.2, Vec2::ONE, Vec4::ONE),
        ];
        assert!(KeyframeTrack::new(unordered).is_err());
        assert!(KeyframeTrack::new(vec![Keyframe::new(1.5, Vec2::ONE, Vec4::ONE)]).is_err());
    }

    #[test]
    fn interpolates_between_neighbours() {
        let track = three_step_track();
        let mut rng = StdRng::seed_from_u64(1);
        let mut cursor = KeyframeCursor::default();
        cursor.start(&track, &mut rng);
        let sample = cursor.advance(&track, 0.25, &mut rng);
        assert!((sample.size.x - 1.5).abs() < 1e-5);
        assert!((sample.color.x - 0.5).abs() < 1e-5);
        assert_eq!(cursor.current, 0);
        assert_eq!(cursor.next, Some(1));

        let sample = cursor.advance(&track, 0.75, &mut rng);
        assert_eq!(cursor.current, 1);
        assert_eq!(cursor.next, Some(2));
        assert!((sample.size.x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn skipping_keyframes_lands_on_the_right_segment() {
        let track = three_step_track();
        let mut rng = StdRng::seed_from_u64(2);
        let mut cursor = KeyframeCursor::default();
        cursor.start(&track, &mut rng);
        cursor.advance(&track, 0.9, &mut rng);
        assert_eq!(cursor.current, 1);
        assert_eq!(cursor.next, Some(2));
    }

    #[test]
    fn pins_to_last_keyframe_after_track_end() {
        let track = three_step_track();
        let mut rng = StdRng::seed_from_u64(3);
        let mut cursor = KeyframeCursor::default();
        cursor.start(&track, &mut rng);
        let sample = cursor.advance(&track, 1.0, &mut rng);
        assert_eq!(cursor.next, None);
        assert_eq!(cursor.current, 2);
        assert!((sample.size.x - 4.0).abs() < 1e-5);
        let later = cursor.advance(&track, 3.0, &mut rng);
        assert_eq!(sample, later);
    }

    #[test]
    fn single_step_advance_reuses_rolled_variation() {
        let frames = vec![
            Keyframe::new(0.0, Vec2::ONE, Vec4::ONE).with_variation(Vec2::splat(0.5), Vec4::ZERO),
            Keyframe::new(0.5, Vec2::ONE, Vec4::ONE).with_variation(Vec2::splat(0.5), Vec4::ZERO),
            Keyframe::new(1.0, Vec2::ONE, Vec4::ONE).with_variation(Vec2::splat(0.5), Vec4::ZERO),
        ];
        let track = KeyframeTrack::new(frames).expect("valid track");
        let mut rng = StdRng::seed_from_u64(4);
        let mut cursor = KeyframeCursor::default();
        cursor.start(&track, &mut rng);
        let rolled_next = cursor.next_variation;
        let at_boundary = cursor.advance(&track, 0.5, &mut rng);
        assert_eq!(cursor.current_variation, rolled_next);
        assert!((at_boundary.size.x - (1.0 + rolled_next.size.x)).abs() < 1e-5);
    }

    #[test]
    fn constant_track_never_drifts() {
        let track = KeyframeTrack::constant(Vec2::splat(0.5), Vec4::ONE);
        let mut rng = StdRng::seed_from_u64(5);
        let mut cursor = KeyframeCursor::default();
        let spawn = cursor.start(&track, &mut rng);
        for step in 1..=10 {
            let sample = cursor.advance(&track, step as f32 * 0.1, &mut rng);
            assert_eq!(sample, spawn);
        }
    }
}
