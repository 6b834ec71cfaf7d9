//! GPU backends for the particle render stream.

mod particle_pass;

pub use particle_pass::ParticlePass;
