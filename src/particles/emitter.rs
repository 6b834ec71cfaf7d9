use super::jitter;
use glam::Vec2;
use rand::Rng;
use serde::Deserialize;
use std::f32::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum EmitterShape {
    #[default]
    #[serde(rename = "point")]
    Point,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "circle outline", alias = "ellipse outline")]
    CircleOutline,
    #[serde(rename = "circle")]
    FilledCircle,
    #[serde(rename = "rectangle")]
    FilledRectangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum EmitterMode {
    #[default]
    #[serde(rename = "looping")]
    Looping,
    #[serde(rename = "one shot")]
    OneShot,
    #[serde(rename = "burst")]
    Burst,
    #[serde(rename = "always")]
    Always,
}

impl EmitterMode {
    pub fn is_rate_based(self) -> bool {
        matches!(self, EmitterMode::Looping | EmitterMode::OneShot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum EmitterSpin {
    #[default]
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "counterclockwise")]
    Counterclockwise,
    #[serde(rename = "clockwise")]
    Clockwise,
}

impl EmitterSpin {
    pub fn direction<R: Rng + ?Sized>(self, rng: &mut R) -> f32 {
        match self {
            EmitterSpin::Clockwise => 1.0,
            EmitterSpin::Counterclockwise => -1.0,
            EmitterSpin::Random => {
                if rng.gen_bool(0.5) {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Spawn geometry and initial velocity for new particles, in effect-local space.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitter {
    /// Point position, line start, or rectangle corner.
    pub start: Vec2,
    /// Line end or opposite rectangle corner.
    pub end: Vec2,
    pub center: Vec2,
    pub position_variation: Vec2,
    pub radius: f32,
    pub shape: EmitterShape,
    pub omnidirectional: bool,
    pub orientation: f32,
    /// Reserved: read from descriptions, not consulted when aiming.
    pub outer_cone: f32,
    /// Reserved: read from descriptions, not consulted when aiming.
    pub inner_cone: f32,
    pub initial_speed: f32,
    pub initial_speed_variation: f32,
    pub emission_rate: f32,
    pub start_time: f32,
    pub mode: EmitterMode,
    pub spin: EmitterSpin,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            start: Vec2::ZERO,
            end: Vec2::ZERO,
            center: Vec2::ZERO,
            position_variation: Vec2::ZERO,
            radius: 0.0,
            shape: EmitterShape::Point,
            omnidirectional: true,
            orientation: 0.0,
            outer_cone: 0.0,
            inner_cone: 0.0,
            initial_speed: 0.0,
            initial_speed_variation: 0.0,
            emission_rate: 0.0,
            start_time: 0.0,
            mode: EmitterMode::Looping,
            spin: EmitterSpin::Random,
        }
    }
}

impl Emitter {
    pub fn point(position: Vec2, mode: EmitterMode, emission_rate: f32) -> Self {
        Self { start: position, center: position, mode, emission_rate, ..Default::default() }
    }

    /// Samples the emitter shape and applies the positional jitter. The result
    /// is not yet rotated by the effect orientation.
    pub fn sample_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let base = match self.shape {
            EmitterShape::Point => self.start,
            EmitterShape::Line => {
                let t: f32 = rng.gen_range(0.0..=1.0);
                self.start.lerp(self.end, t)
            }
            EmitterShape::CircleOutline => {
                let angle = rng.gen_range(0.0..TAU);
                self.center + Vec2::from_angle(angle) * self.radius
            }
            EmitterShape::FilledCircle => self.center + sample_disk(rng, self.radius),
            EmitterShape::FilledRectangle => {
                let t = Vec2::new(rng.gen_range(0.0..=1.0), rng.gen_range(0.0..=1.0));
                self.start + (self.end - self.start) * t
            }
        };
        base + Vec2::new(jitter(rng, self.position_variation.x), jitter(rng, self.position_variation.y))
    }

    /// Unit vector for a new particle's initial velocity.
    pub fn sample_direction<R: Rng + ?Sized>(&self, effect_orientation: f32, rng: &mut R) -> Vec2 {
        if self.omnidirectional {
            Vec2::from_angle(rng.gen_range(0.0..TAU))
        } else {
            Vec2::from_angle(self.orientation + effect_orientation)
        }
    }

    pub fn sample_speed<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.initial_speed + jitter(rng, self.initial_speed_variation)
    }
}

/// Rejection-sampled point inside a disk of `radius` at the origin.
fn sample_disk<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec2 {
    let radius = radius.abs();
    if radius == 0.0 {
        return Vec2::ZERO;
    }
    loop {
        let candidate = Vec2::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
        if candidate.length_squared() <= 1.0 {
            return candidate * radius;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parses_description_strings() {
        let shape: EmitterShape = serde_json::from_str("\"ellipse outline\"").expect("shape");
        assert_eq!(shape, EmitterShape::CircleOutline);
        let shape: EmitterShape = serde_json::from_str("\"circle\"").expect("shape");
        assert_eq!(shape, EmitterShape::FilledCircle);
        let mode: EmitterMode = serde_json::from_str("\"one shot\"").expect("mode");
        assert_eq!(mode, EmitterMode::OneShot);
        assert!(mode.is_rate_based() && EmitterMode::Looping.is_rate_based());
        assert!(!EmitterMode::Burst.is_rate_based() && !EmitterMode::Always.is_rate_based());
        assert!(serde_json::from_str::<EmitterSpin>("\"sideways\"").is_err());
    }

    #[test]
    fn filled_circle_samples_stay_inside_radius() {
        let emitter = Emitter {
            shape: EmitterShape::FilledCircle,
            center: Vec2::new(10.0, -4.0),
            radius: 3.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let p = emitter.sample_position(&mut rng);
            assert!(p.distance(emitter.center) <= 3.0 + 1e-4);
        }
    }

    #[test]
    fn circle_outline_samples_sit_on_radius() {
        let emitter = Emitter { shape: EmitterShape::CircleOutline, radius: 2.0, ..Default::default() };
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let p = emitter.sample_position(&mut rng);
            assert!((p.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn rectangle_and_line_samples_stay_in_bounds() {
        let mut emitter = Emitter {
            shape: EmitterShape::FilledRectangle,
            start: Vec2::new(-1.0, 2.0),
            end: Vec2::new(3.0, 5.0),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let p = emitter.sample_position(&mut rng);
            assert!((-1.0..=3.0).contains(&p.x) && (2.0..=5.0).contains(&p.y));
        }
        emitter.shape = EmitterShape::Line;
        emitter.end = Vec2::new(3.0, 2.0);
        for _ in 0..50 {
            let p = emitter.sample_position(&mut rng);
            assert!((p.y - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn directed_emitter_adds_effect_orientation() {
        let emitter = Emitter { omnidirectional: false, orientation: 0.5, ..Default::default() };
        let mut rng = StdRng::seed_from_u64(14);
        let dir = emitter.sample_direction(0.25, &mut rng);
        assert!(dir.abs_diff_eq(Vec2::from_angle(0.75), 1e-6));
    }

    #[test]
    fn spin_direction_is_fixed_unless_random() {
        let mut rng = StdRng::seed_from_u64(15);
        assert_eq!(EmitterSpin::Clockwise.direction(&mut rng), 1.0);
        assert_eq!(EmitterSpin::Counterclockwise.direction(&mut rng), -1.0);
        let value = EmitterSpin::Random.direction(&mut rng);
        assert!(value == 1.0 || value == -1.0);
    }
}
