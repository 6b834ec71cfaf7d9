//! Pooled, data-driven particle effects.
//!
//! Definitions ([`EffectDefinition`], [`SystemDefinition`]) are loaded once and
//! shared through `Arc`; instances ([`ParticleEffect`], [`ParticleSystem`]) hold
//! only the mutable simulation state. The [`ParticleManager`] owns every live
//! effect and drives `update`/`draw` once per frame.

pub mod definition;
pub mod effect;
pub mod emitter;
pub mod keyframe;
pub mod loader;
pub mod manager;
pub mod particle;
pub mod render;
pub mod system;

pub use definition::{
    AnimationFrame, EffectDefinition, RotateToVelocity, SpeedScale, SystemDefinition, Varied, WaveMotion,
};
pub use effect::ParticleEffect;
pub use emitter::{Emitter, EmitterMode, EmitterShape, EmitterSpin};
pub use keyframe::{Keyframe, KeyframeCursor, KeyframeSample, KeyframeTrack, KeyframeVariation};
pub use manager::{EffectId, ParticleManager};
pub use particle::Particle;
pub use render::{
    BlendMode, ParticleDrawBatch, ParticleRenderer, ParticleVertex, RecordedBatch, RecordingRenderer,
    StencilMode, StencilOp,
};
pub use system::{EffectParameters, ParticleSystem};

use glam::{Vec2, Vec4};
use rand::Rng;

/// Largest spread handed to the uniform sampler; wider ranges overflow its scale.
const MAX_JITTER: f32 = f32::MAX / 4.0;

/// Uniform sample in `[-bound, bound]`. A zero bound never touches the rng.
pub(crate) fn jitter<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    let bound = bound.abs();
    if bound == 0.0 || !bound.is_finite() {
        return 0.0;
    }
    let bound = bound.min(MAX_JITTER);
    rng.gen_range(-bound..=bound)
}

pub(crate) fn jitter_vec2<R: Rng + ?Sized>(rng: &mut R, bound: Vec2) -> Vec2 {
    Vec2::new(jitter(rng, bound.x), jitter(rng, bound.y))
}

pub(crate) fn jitter_vec4<R: Rng + ?Sized>(rng: &mut R, bound: Vec4) -> Vec4 {
    Vec4::new(jitter(rng, bound.x), jitter(rng, bound.y), jitter(rng, bound.z), jitter(rng, bound.w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn jitter_respects_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..256 {
            let value = jitter(&mut rng, -0.5);
            assert!((-0.5..=0.5).contains(&value));
        }
        assert_eq!(jitter(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn jitter_survives_huge_bounds() {
        let mut rng = StdRng::seed_from_u64(8);
        for bound in [3.0e38, f32::MAX, -f32::MAX] {
            let value = jitter(&mut rng, bound);
            assert!(value.is_finite() && value.abs() <= MAX_JITTER);
        }
    }
}
