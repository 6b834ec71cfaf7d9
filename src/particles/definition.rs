use super::emitter::Emitter;
use super::keyframe::KeyframeTrack;
use super::render::{BlendMode, StencilMode};
use super::{jitter, jitter_vec2};
use anyhow::{anyhow, Result};
use glam::Vec2;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;

/// A base value plus the half-width of its uniform random spread.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Varied<T> {
    pub base: T,
    pub variation: T,
}

impl<T> Varied<T> {
    pub const fn new(base: T, variation: T) -> Self {
        Self { base, variation }
    }
}

impl Varied<f32> {
    pub const fn fixed(base: f32) -> Self {
        Self { base, variation: 0.0 }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.base + jitter(rng, self.variation)
    }

    pub fn is_zero(&self) -> bool {
        self.base == 0.0 && self.variation == 0.0
    }
}

impl Varied<Vec2> {
    pub const fn fixed(base: Vec2) -> Self {
        Self { base, variation: Vec2::ZERO }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        self.base + jitter_vec2(rng, self.variation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveMotion {
    pub length: Varied<f32>,
    pub amplitude: Varied<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedScale {
    pub scale: f32,
    pub min: f32,
    pub max: f32,
}

impl SpeedScale {
    pub fn factor(&self, speed: f32) -> f32 {
        let min = self.min.min(self.max);
        (speed * self.scale).clamp(min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotateToVelocity {
    pub speed_scale: Option<SpeedScale>,
}

/// One frame of a system's texture animation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u32,
}

impl AnimationFrame {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, duration_ms: u32) -> Self {
        Self { path: path.into(), width, height, duration_ms }
    }

    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Immutable description of one particle stream.
#[derive(Debug, Clone)]
pub struct SystemDefinition {
    pub enabled: bool,
    pub emitter: Emitter,
    pub keyframes: KeyframeTrack,
    pub animation: Vec<AnimationFrame>,
    pub blend_mode: BlendMode,
    pub stencil: StencilMode,
    /// Only consulted in one-shot mode.
    pub system_lifetime: f32,
    pub particle_lifetime: Varied<f32>,
    pub max_particles: usize,
    /// Per-second velocity retention; 1.0 disables damping.
    pub damping: Varied<f32>,
    pub acceleration: Varied<Vec2>,
    pub wind_velocity: Varied<Vec2>,
    pub wave_motion: Option<WaveMotion>,
    pub tangential_acceleration: Varied<f32>,
    pub radial_acceleration: Varied<f32>,
    pub user_defined_attractor: bool,
    pub attractor_falloff: f32,
    pub rotate_to_velocity: Option<RotateToVelocity>,
    pub smooth_animation: bool,
    pub random_initial_angle: bool,
}

impl SystemDefinition {
    pub fn new(emitter: Emitter, keyframes: KeyframeTrack, animation: Vec<AnimationFrame>) -> Self {
        Self {
            enabled: true,
            emitter,
            keyframes,
            animation,
            blend_mode: BlendMode::Alpha,
            stencil: StencilMode::Disabled,
            system_lifetime: 0.0,
            particle_lifetime: Varied::<f32>::fixed(1.0),
            max_particles: 64,
            damping: Varied::<f32>::fixed(1.0),
            acceleration: Varied::<Vec2>::fixed(Vec2::ZERO),
            wind_velocity: Varied::<Vec2>::fixed(Vec2::ZERO),
            wave_motion: None,
            tangential_acceleration: Varied::<f32>::fixed(0.0),
            radial_acceleration: Varied::<f32>::fixed(0.0),
            user_defined_attractor: false,
            attractor_falloff: 0.0,
            rotate_to_velocity: None,
            smooth_animation: false,
            random_initial_angle: false,
        }
    }

    /// Whether quads need per-particle rotation when drawn.
    pub fn uses_rotation(&self) -> bool {
        self.random_initial_angle || self.rotate_to_velocity.is_some() || self.keyframes.uses_rotation()
    }

    /// Checks the invariants a system instance relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_particles == 0 {
            return Err(anyhow!("max_particles must be greater than zero"));
        }
        if self.animation.is_empty() {
            return Err(anyhow!("system requires at least one animation frame"));
        }
        if !self.particle_lifetime.base.is_finite() || !self.particle_lifetime.variation.is_finite() {
            return Err(anyhow!("particle lifetime must be finite"));
        }
        if !self.emitter.emission_rate.is_finite() || self.emitter.emission_rate < 0.0 {
            return Err(anyhow!("emission_rate must be a non-negative finite number"));
        }
        Ok(())
    }
}

/// Ordered list of system definitions forming one visual effect.
#[derive(Debug, Clone, Default)]
pub struct EffectDefinition {
    pub systems: Vec<Arc<SystemDefinition>>,
    /// Zero means the collision rectangle is unused.
    pub effect_width: f32,
    pub effect_height: f32,
    pub source: Option<PathBuf>,
}

impl EffectDefinition {
    pub fn new(systems: Vec<SystemDefinition>) -> Self {
        Self { systems: systems.into_iter().map(Arc::new).collect(), ..Default::default() }
    }

    pub fn with_collision(mut self, width: f32, height: f32) -> Self {
        self.effect_width = width;
        self.effect_height = height;
        self
    }

    pub fn enabled_systems(&self) -> impl Iterator<Item = &Arc<SystemDefinition>> {
        self.systems.iter().filter(|system| system.enabled)
    }
}
