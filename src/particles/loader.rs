//! JSON effect descriptions.
//!
//! Loading is all-or-nothing: every system is built into a local list and the
//! [`EffectDefinition`] is only returned once each system, keyframe and
//! animation frame has been validated.

use super::definition::{
    AnimationFrame, EffectDefinition, RotateToVelocity, SpeedScale, SystemDefinition, Varied, WaveMotion,
};
use super::emitter::{Emitter, EmitterMode, EmitterShape, EmitterSpin};
use super::keyframe::{Keyframe, KeyframeTrack};
use super::render::{BlendMode, StencilMode, StencilOp};
use crate::config::FxConfig;
use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec2, Vec4};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct EffectFile {
    #[serde(default)]
    map_effect_collision: Option<CollisionFile>,
    systems: Vec<SystemFile>,
}

#[derive(Debug, Deserialize)]
struct CollisionFile {
    effect_collision_width: f32,
    effect_collision_height: f32,
}

#[derive(Debug, Deserialize)]
struct EmitterFile {
    x: f32,
    y: f32,
    x2: f32,
    y2: f32,
    center_x: f32,
    center_y: f32,
    x_variation: f32,
    y_variation: f32,
    radius: f32,
    shape: EmitterShape,
    omnidirectional: bool,
    orientation: f32,
    #[serde(default)]
    outer_cone: f32,
    #[serde(default)]
    inner_cone: f32,
    initial_speed: f32,
    initial_speed_variation: f32,
    emission_rate: f32,
    start_time: f32,
    emitter_mode: EmitterMode,
    spin: EmitterSpin,
}

#[derive(Debug, Deserialize)]
struct KeyframeFile {
    size_x: f32,
    size_y: f32,
    rotation_speed: f32,
    color: [f32; 4],
    size_variation_x: f32,
    size_variation_y: f32,
    rotation_speed_variation: f32,
    color_variation: [f32; 4],
    time: f32,
}

#[derive(Debug, Deserialize)]
struct WaveMotionFile {
    wave_length: f32,
    wave_length_variation: f32,
    wave_amplitude: f32,
    wave_amplitude_variation: f32,
}

#[derive(Debug, Deserialize)]
struct RotationFile {
    #[serde(default)]
    rotate_to_velocity: Option<RotateToVelocityFile>,
}

#[derive(Debug, Deserialize)]
struct RotateToVelocityFile {
    #[serde(default)]
    speed_scale: Option<f32>,
    #[serde(default)]
    min_speed_scale: Option<f32>,
    #[serde(default)]
    max_speed_scale: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SystemFile {
    emitter: EmitterFile,
    keyframes: Vec<KeyframeFile>,
    animation_frames: Vec<String>,
    animation_frame_times: Vec<u32>,
    enabled: bool,
    blend_mode: i64,
    system_lifetime: f32,
    particle_lifetime: f32,
    particle_lifetime_variation: f32,
    max_particles: u32,
    damping: f32,
    damping_variation: f32,
    acceleration_x: f32,
    acceleration_y: f32,
    acceleration_variation_x: f32,
    acceleration_variation_y: f32,
    wind_velocity_x: f32,
    wind_velocity_y: f32,
    wind_velocity_variation_x: f32,
    wind_velocity_variation_y: f32,
    #[serde(default)]
    wave_motion: Option<WaveMotionFile>,
    tangential_acceleration: f32,
    tangential_acceleration_variation: f32,
    radial_acceleration: f32,
    radial_acceleration_variation: f32,
    user_defined_attractor: bool,
    attractor_falloff: f32,
    #[serde(default)]
    rotation: Option<RotationFile>,
    smooth_animation: bool,
    modify_stencil: bool,
    #[serde(default)]
    stencil_op: StencilOp,
    use_stencil: bool,
    random_initial_angle: bool,
}

impl EffectDefinition {
    /// Loads a description with default [`FxConfig`] settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, &FxConfig::default())
    }

    pub fn load_with(path: impl AsRef<Path>, config: &FxConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read effect {}", path.display()))?;
        let base_dir = config.frame_base_dir(path);
        let mut definition = Self::from_json_slice(&bytes, &base_dir, config)
            .with_context(|| format!("Failed to load effect {}", path.display()))?;
        definition.source = Some(path.to_path_buf());
        log::debug!("Loaded effect {} ({} systems)", path.display(), definition.systems.len());
        Ok(definition)
    }

    /// Parses a description; relative animation frame paths are joined onto `base_dir`.
    pub fn from_json_slice(bytes: &[u8], base_dir: &Path, config: &FxConfig) -> Result<Self> {
        let file: EffectFile = serde_json::from_slice(bytes).context("Malformed effect description")?;
        if file.systems.is_empty() {
            bail!("Effect description must contain at least one system");
        }
        let mut systems = Vec::with_capacity(file.systems.len());
        for (index, raw) in file.systems.into_iter().enumerate() {
            let system = build_system(raw, base_dir, config).with_context(|| format!("systems[{index}]"))?;
            systems.push(Arc::new(system));
        }
        let (effect_width, effect_height) = match file.map_effect_collision {
            Some(rect) => (rect.effect_collision_width.max(0.0), rect.effect_collision_height.max(0.0)),
            None => (0.0, 0.0),
        };
        Ok(Self { systems, effect_width, effect_height, source: None })
    }
}

fn build_system(raw: SystemFile, base_dir: &Path, config: &FxConfig) -> Result<SystemDefinition> {
    let emitter = build_emitter(raw.emitter)?;
    let keyframes = build_keyframes(raw.keyframes).context("keyframes")?;
    let animation = build_animation(&raw.animation_frames, &raw.animation_frame_times, base_dir)
        .context("animation_frames")?;
    let blend_mode =
        BlendMode::from_index(raw.blend_mode).ok_or_else(|| anyhow!("Unknown blend_mode {}", raw.blend_mode))?;

    if raw.max_particles == 0 {
        bail!("max_particles must be greater than zero");
    }
    let mut max_particles = raw.max_particles;
    if config.max_particles_per_system > 0 && max_particles > config.max_particles_per_system {
        log::warn!(
            "Clamping max_particles {} to configured limit {}",
            max_particles,
            config.max_particles_per_system
        );
        max_particles = config.max_particles_per_system;
    }

    let wave_motion = raw.wave_motion.map(|wave| WaveMotion {
        length: Varied::new(wave.wave_length, wave.wave_length_variation),
        amplitude: Varied::new(wave.wave_amplitude, wave.wave_amplitude_variation),
    });
    let rotate_to_velocity = match raw.rotation.and_then(|rotation| rotation.rotate_to_velocity) {
        Some(rotate) => Some(build_rotate_to_velocity(rotate)?),
        None => None,
    };

    let definition = SystemDefinition {
        enabled: raw.enabled,
        emitter,
        keyframes,
        animation,
        blend_mode,
        stencil: StencilMode::from_flags(raw.modify_stencil, raw.stencil_op, raw.use_stencil),
        system_lifetime: raw.system_lifetime,
        particle_lifetime: Varied::new(raw.particle_lifetime, raw.particle_lifetime_variation),
        max_particles: max_particles as usize,
        damping: Varied::new(raw.damping, raw.damping_variation),
        acceleration: Varied::new(
            Vec2::new(raw.acceleration_x, raw.acceleration_y),
            Vec2::new(raw.acceleration_variation_x, raw.acceleration_variation_y),
        ),
        wind_velocity: Varied::new(
            Vec2::new(raw.wind_velocity_x, raw.wind_velocity_y),
            Vec2::new(raw.wind_velocity_variation_x, raw.wind_velocity_variation_y),
        ),
        wave_motion,
        tangential_acceleration: Varied::new(raw.tangential_acceleration, raw.tangential_acceleration_variation),
        radial_acceleration: Varied::new(raw.radial_acceleration, raw.radial_acceleration_variation),
        user_defined_attractor: raw.user_defined_attractor,
        attractor_falloff: raw.attractor_falloff,
        rotate_to_velocity,
        smooth_animation: raw.smooth_animation,
        random_initial_angle: raw.random_initial_angle,
    };
    definition.validate()?;
    Ok(definition)
}

fn build_emitter(raw: EmitterFile) -> Result<Emitter> {
    if !raw.start_time.is_finite() || raw.start_time < 0.0 {
        bail!("emitter.start_time must be a non-negative finite number");
    }
    if !raw.emission_rate.is_finite() || raw.emission_rate < 0.0 {
        bail!("emitter.emission_rate must be a non-negative finite number");
    }
    Ok(Emitter {
        start: Vec2::new(raw.x, raw.y),
        end: Vec2::new(raw.x2, raw.y2),
        center: Vec2::new(raw.center_x, raw.center_y),
        position_variation: Vec2::new(raw.x_variation, raw.y_variation),
        radius: raw.radius,
        shape: raw.shape,
        omnidirectional: raw.omnidirectional,
        orientation: raw.orientation,
        outer_cone: raw.outer_cone,
        inner_cone: raw.inner_cone,
        initial_speed: raw.initial_speed,
        initial_speed_variation: raw.initial_speed_variation,
        emission_rate: raw.emission_rate,
        start_time: raw.start_time,
        mode: raw.emitter_mode,
        spin: raw.spin,
    })
}

fn build_keyframes(raw: Vec<KeyframeFile>) -> Result<KeyframeTrack> {
    let frames = raw
        .into_iter()
        .map(|kf| Keyframe {
            size: Vec2::new(kf.size_x, kf.size_y),
            color: Vec4::from_array(kf.color),
            rotation_speed: kf.rotation_speed,
            size_variation: Vec2::new(kf.size_variation_x, kf.size_variation_y),
            color_variation: Vec4::from_array(kf.color_variation),
            rotation_speed_variation: kf.rotation_speed_variation,
            time: kf.time,
        })
        .collect();
    KeyframeTrack::new(frames)
}

fn build_animation(frames: &[String], times: &[u32], base_dir: &Path) -> Result<Vec<AnimationFrame>> {
    if frames.is_empty() {
        bail!("At least one animation frame is required");
    }
    let Some(&last_time) = times.last() else {
        bail!("At least one animation frame time is required");
    };
    let mut animation = Vec::with_capacity(frames.len());
    for (index, raw_path) in frames.iter().enumerate() {
        let path = resolve_frame_path(raw_path, base_dir);
        if !path.is_file() {
            bail!("Animation frame {} not found at {}", raw_path, path.display());
        }
        let (width, height) = image::image_dimensions(&path)
            .with_context(|| format!("Failed to read animation frame {}", path.display()))?;
        let duration_ms = times.get(index).copied().unwrap_or(last_time);
        animation.push(AnimationFrame { path, width, height, duration_ms });
    }
    Ok(animation)
}

fn build_rotate_to_velocity(raw: RotateToVelocityFile) -> Result<RotateToVelocity> {
    let speed_scale = match raw.speed_scale {
        Some(scale) => {
            let min = raw.min_speed_scale.unwrap_or(0.0);
            let max = raw.max_speed_scale.unwrap_or(f32::INFINITY);
            if !scale.is_finite() || !min.is_finite() || max.is_nan() || min > max {
                bail!("rotate_to_velocity speed scale bounds are invalid");
            }
            Some(SpeedScale { scale, min, max })
        }
        None => None,
    };
    Ok(RotateToVelocity { speed_scale })
}

fn resolve_frame_path(raw: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
