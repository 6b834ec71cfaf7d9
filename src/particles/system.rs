use super::definition::{AnimationFrame, SystemDefinition};
use super::emitter::EmitterMode;
use super::particle::{ForceField, Particle};
use super::render::{ParticleDrawBatch, ParticleRenderer, ParticleVertex, QUAD_TEX_COORDS, VERTICES_PER_QUAD};
use crate::rotate_vec2;
use anyhow::{Context, Result};
use glam::{Vec2, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

/// Transform shared by every system of one effect for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectParameters {
    pub orientation: f32,
    /// Attractor point in effect-local space.
    pub attractor: Vec2,
}

#[derive(Debug, Clone, Copy, Default)]
struct AnimationCursor {
    frame: usize,
    elapsed_ms: f32,
}

impl AnimationCursor {
    fn frame_duration(frames: &[AnimationFrame], index: usize) -> f32 {
        frames[index].duration_ms.max(1) as f32
    }

    fn update(&mut self, dt: f32, frames: &[AnimationFrame]) {
        if frames.len() < 2 {
            return;
        }
        self.elapsed_ms += dt * 1000.0;
        let cycle: f32 = (0..frames.len()).map(|index| Self::frame_duration(frames, index)).sum();
        if self.elapsed_ms >= cycle {
            self.elapsed_ms %= cycle;
        }
        for _ in 0..frames.len() {
            let duration = Self::frame_duration(frames, self.frame);
            if self.elapsed_ms < duration {
                break;
            }
            self.elapsed_ms -= duration;
            self.frame = (self.frame + 1) % frames.len();
        }
    }

    fn progress(&self, frames: &[AnimationFrame]) -> f32 {
        (self.elapsed_ms / Self::frame_duration(frames, self.frame)).clamp(0.0, 1.0)
    }

    fn next_frame(&self, frames: &[AnimationFrame]) -> usize {
        (self.frame + 1) % frames.len()
    }
}

/// Fixed-capacity particle pool bound to one [`SystemDefinition`].
///
/// Live particles occupy `particles[..num_particles]`. Expired slots are either
/// respawned in place (while emission quota remains this frame) or filled with
/// the last live particle, so steady-state emission never shifts the pool.
pub struct ParticleSystem {
    definition: Arc<SystemDefinition>,
    particles: Vec<Particle>,
    num_particles: usize,
    age: f32,
    last_update_age: f32,
    stopped: bool,
    alive: bool,
    emitted_total: u64,
    animation: AnimationCursor,
    rng: StdRng,
    vertices: Vec<ParticleVertex>,
    cross_fade_vertices: Vec<ParticleVertex>,
}

impl ParticleSystem {
    pub fn new(definition: Arc<SystemDefinition>) -> Result<Self> {
        Self::with_rng(definition, StdRng::from_entropy())
    }

    /// Deterministic variant for tools and tests.
    pub fn with_seed(definition: Arc<SystemDefinition>, seed: u64) -> Result<Self> {
        Self::with_rng(definition, StdRng::seed_from_u64(seed))
    }

    fn with_rng(definition: Arc<SystemDefinition>, rng: StdRng) -> Result<Self> {
        definition.validate().context("Invalid particle system definition")?;
        let capacity = definition.max_particles;
        Ok(Self {
            particles: vec![Particle::default(); capacity],
            num_particles: 0,
            age: 0.0,
            last_update_age: 0.0,
            stopped: false,
            alive: true,
            emitted_total: 0,
            animation: AnimationCursor::default(),
            rng,
            vertices: Vec::with_capacity(capacity * VERTICES_PER_QUAD),
            cross_fade_vertices: Vec::new(),
            definition,
        })
    }

    pub fn definition(&self) -> &Arc<SystemDefinition> {
        &self.definition
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    /// Live particles, in pool order.
    pub fn particles(&self) -> &[Particle] {
        &self.particles[..self.num_particles]
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Particles spawned since creation, respawns included.
    pub fn total_emitted(&self) -> u64 {
        self.emitted_total
    }

    pub fn animation_frame(&self) -> usize {
        self.animation.frame
    }

    /// Vertices produced by the latest `draw`.
    pub fn vertices(&self) -> &[ParticleVertex] {
        &self.vertices
    }

    /// Soft stop: no new emission, live particles finish their lives.
    pub fn stop(&mut self) {
        self.stopped = true;
        if self.num_particles == 0 {
            self.alive = false;
        }
    }

    /// Re-arms emission and restarts the start delay and one-shot clock.
    pub fn start(&mut self) {
        self.stopped = false;
        self.alive = true;
        self.age = 0.0;
        self.last_update_age = 0.0;
    }

    /// Hard stop: empties the pool now.
    pub fn clear(&mut self) {
        self.num_particles = 0;
        self.stopped = true;
        self.alive = false;
        self.vertices.clear();
    }

    /// Steps the simulation by `dt` seconds. Returns `false` for an unusable step.
    pub fn update(&mut self, dt: f32, params: &EffectParameters) -> bool {
        if !dt.is_finite() || dt < 0.0 {
            return false;
        }
        if !self.alive {
            return true;
        }
        self.age += dt;
        if self.age < self.definition.emitter.start_time {
            self.last_update_age = self.age;
            return true;
        }

        self.animation.update(dt, &self.definition.animation);
        let expired = self.integrate(dt, params);
        let mut quota = self.emission_quota(expired);
        self.kill_expired(&mut quota, params);
        self.emit(quota, params);
        self.last_update_age = self.age;

        match self.definition.emitter.mode {
            EmitterMode::Burst => self.stopped = true,
            EmitterMode::OneShot if self.age > self.definition.system_lifetime => self.stopped = true,
            _ => {}
        }
        if self.stopped && self.num_particles == 0 {
            self.alive = false;
        }
        true
    }

    /// Integrates every live particle and returns how many have expired.
    fn integrate(&mut self, dt: f32, params: &EffectParameters) -> usize {
        let definition = &*self.definition;
        let forces = ForceField {
            attractor: if definition.user_defined_attractor {
                params.attractor
            } else {
                definition.emitter.center
            },
            falloff: (definition.attractor_falloff != 0.0).then_some(definition.attractor_falloff),
            wave_enabled: definition.wave_motion.is_some(),
        };
        let mut expired = 0;
        for particle in &mut self.particles[..self.num_particles] {
            particle.integrate(dt, &definition.keyframes, &forces, &mut self.rng);
            if particle.is_expired() {
                expired += 1;
            }
        }
        expired
    }

    /// Number of particles to spawn this frame, counting slots freed by `expired`.
    fn emission_quota(&self, expired: usize) -> usize {
        if self.stopped {
            return 0;
        }
        let available = self.capacity() - self.num_particles + expired;
        let emitter = &self.definition.emitter;
        if !emitter.mode.is_rate_based() {
            return available;
        }
        let emitted_before = (self.last_update_age * emitter.emission_rate).floor();
        let emitted_now = (self.age * emitter.emission_rate).floor();
        let due = (emitted_now - emitted_before).max(0.0) as usize;
        due.min(available)
    }

    fn kill_expired(&mut self, quota: &mut usize, params: &EffectParameters) {
        let mut index = 0;
        while index < self.num_particles {
            if !self.particles[index].is_expired() {
                index += 1;
                continue;
            }
            if *quota > 0 {
                self.respawn(index, params);
                *quota -= 1;
                index += 1;
            } else {
                self.num_particles -= 1;
                self.particles.swap(index, self.num_particles);
            }
        }
    }

    fn emit(&mut self, quota: usize, params: &EffectParameters) {
        let count = quota.min(self.capacity() - self.num_particles);
        for _ in 0..count {
            let index = self.num_particles;
            self.respawn(index, params);
            self.num_particles += 1;
        }
    }

    fn respawn(&mut self, index: usize, params: &EffectParameters) {
        let definition = &*self.definition;
        let emitter = &definition.emitter;
        let rng = &mut self.rng;
        let particle = &mut self.particles[index];

        particle.position = rotate_vec2(emitter.sample_position(rng), params.orientation);
        let direction = emitter.sample_direction(params.orientation, rng);
        particle.velocity = direction * emitter.sample_speed(rng);
        particle.rotation_direction = emitter.spin.direction(rng);
        particle.rotation_angle = if definition.random_initial_angle { rng.gen_range(0.0..TAU) } else { 0.0 };
        particle.time = 0.0;
        particle.lifetime = definition.particle_lifetime.sample(rng).max(0.0);

        particle.damping = definition.damping.sample(rng);
        particle.acceleration = definition.acceleration.sample(rng);
        particle.wind_velocity = definition.wind_velocity.sample(rng);
        particle.tangential_acceleration = definition.tangential_acceleration.sample(rng);
        particle.radial_acceleration = definition.radial_acceleration.sample(rng);
        match definition.wave_motion {
            Some(wave) => {
                let length = wave.length.sample(rng);
                particle.wave_length_coefficient = if length != 0.0 { TAU / length } else { 0.0 };
                particle.wave_half_amplitude = wave.amplitude.sample(rng) * 0.5;
            }
            None => {
                particle.wave_length_coefficient = 0.0;
                particle.wave_half_amplitude = 0.0;
            }
        }
        particle.combined_velocity = particle.velocity + particle.wind_velocity;

        let sample = particle.keyframes.start(&definition.keyframes, rng);
        particle.size = sample.size;
        particle.color = sample.color;
        particle.rotation_speed = sample.rotation_speed;
        self.emitted_total += 1;
    }

    /// Builds the quad stream at `origin` and submits it, plus a cross-fade
    /// batch against the next frame when smooth animation is enabled.
    pub fn draw<R: ParticleRenderer + ?Sized>(&mut self, origin: Vec2, renderer: &mut R) -> Result<()> {
        self.vertices.clear();
        if !self.alive || self.num_particles == 0 {
            return Ok(());
        }
        let definition = &*self.definition;
        let frames = &definition.animation;
        let frame = &frames[self.animation.frame];
        let live = &self.particles[..self.num_particles];
        let cross_fade = definition.smooth_animation && frames.len() > 1;
        let progress = if cross_fade { self.animation.progress(frames) } else { 0.0 };

        fill_quads(&mut self.vertices, live, definition, origin, frame, 1.0 - progress);
        renderer.draw_quads(&ParticleDrawBatch {
            vertices: &self.vertices,
            frame,
            blend_mode: definition.blend_mode,
            stencil: definition.stencil,
        })?;

        if cross_fade {
            let next = &frames[self.animation.next_frame(frames)];
            fill_quads(&mut self.cross_fade_vertices, live, definition, origin, next, progress);
            renderer.draw_quads(&ParticleDrawBatch {
                vertices: &self.cross_fade_vertices,
                frame: next,
                blend_mode: definition.blend_mode,
                stencil: definition.stencil,
            })?;
        }
        Ok(())
    }
}

fn fill_quads(
    out: &mut Vec<ParticleVertex>,
    particles: &[Particle],
    definition: &SystemDefinition,
    origin: Vec2,
    frame: &AnimationFrame,
    alpha_scale: f32,
) {
    out.clear();
    out.reserve(particles.len() * VERTICES_PER_QUAD);
    let dimensions = frame.dimensions();
    let rotated = definition.uses_rotation();
    for particle in particles {
        let mut half = particle.size * dimensions * 0.5;
        let mut angle = particle.rotation_angle;
        if let Some(rotate) = &definition.rotate_to_velocity {
            let velocity = particle.combined_velocity;
            angle = velocity.y.atan2(velocity.x) - FRAC_PI_2;
            if let Some(scale) = &rotate.speed_scale {
                half.y *= scale.factor(velocity.length());
            }
        }
        let corners = [
            Vec2::new(-half.x, half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(-half.x, -half.y),
        ];
        let center = origin + particle.position;
        let color = particle.color.clamp(Vec4::ZERO, Vec4::ONE);
        let color = [color.x, color.y, color.z, color.w * alpha_scale];
        for (corner, tex_coord) in corners.iter().zip(QUAD_TEX_COORDS) {
            let offset = if rotated { rotate_vec2(*corner, angle) } else { *corner };
            let position = center + offset;
            out.push(ParticleVertex { position: [position.x, position.y, 0.0], color, tex_coord });
        }
    }
}
