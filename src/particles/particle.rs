use super::keyframe::{KeyframeCursor, KeyframeTrack};
use glam::{Vec2, Vec4};
use rand::Rng;

/// One pooled particle. Slots are interchangeable; only the pool index
/// identifies a particle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Particle {
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
    /// Velocity plus wind and wave motion for the latest step.
    pub combined_velocity: Vec2,
    pub rotation_angle: f32,
    pub rotation_speed: f32,
    /// +1 clockwise, -1 counterclockwise; fixed at spawn.
    pub rotation_direction: f32,
    pub color: Vec4,
    pub time: f32,
    pub lifetime: f32,
    pub damping: f32,
    pub acceleration: Vec2,
    pub tangential_acceleration: f32,
    pub radial_acceleration: f32,
    pub wind_velocity: Vec2,
    pub wave_length_coefficient: f32,
    pub wave_half_amplitude: f32,
    pub keyframes: KeyframeCursor,
}

/// Attractor settings resolved once per system step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ForceField {
    /// Effect-local attractor position.
    pub attractor: Vec2,
    /// Linear falloff per unit distance, applied to the radial term.
    pub falloff: Option<f32>,
    pub wave_enabled: bool,
}

impl Particle {
    pub fn is_expired(&self) -> bool {
        self.time > self.lifetime
    }

    /// Normalized age used to index the keyframe track.
    pub fn scaled_time(&self) -> f32 {
        if self.lifetime > 0.0 {
            self.time / self.lifetime
        } else {
            1.0
        }
    }

    /// Advances the particle by `dt` seconds.
    pub(crate) fn integrate<R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        track: &KeyframeTrack,
        forces: &ForceField,
        rng: &mut R,
    ) {
        let sample = self.keyframes.advance(track, self.scaled_time(), rng);
        self.size = sample.size;
        self.color = sample.color;
        self.rotation_speed = sample.rotation_speed;

        self.rotation_angle += self.rotation_speed * self.rotation_direction * dt;

        self.combined_velocity = self.velocity + self.wind_velocity;
        if forces.wave_enabled && self.wave_half_amplitude != 0.0 {
            let wave_speed = self.wave_half_amplitude * (self.wave_length_coefficient * self.time).sin();
            let tangent = self.combined_velocity.perp().normalize_or_zero();
            self.combined_velocity += tangent * wave_speed;
        }

        self.position += self.combined_velocity * dt;
        self.velocity += self.acceleration * dt;

        if self.radial_acceleration != 0.0 || self.tangential_acceleration != 0.0 {
            let offset = self.position - forces.attractor;
            let distance = offset.length();
            let radial = if distance > 0.0 { offset / distance } else { Vec2::ZERO };
            let attraction = match forces.falloff {
                Some(falloff) => (1.0 - falloff * distance).max(0.0),
                None => 1.0,
            };
            self.velocity += radial * (self.radial_acceleration * dt * attraction);
            self.velocity += radial.perp() * (self.tangential_acceleration * dt);
        }

        if self.damping != 1.0 {
            self.velocity *= self.damping.max(0.0).powf(dt);
        }

        self.time += dt;
    }
}
