pub mod config;
pub mod particles;
pub mod renderer;

pub use config::FxConfig;
pub use particles::{ParticleEffect, ParticleManager};

pub(crate) fn wrap_angle(mut radians: f32) -> f32 {
    if !radians.is_finite() {
        return 0.0;
    }
    let two_pi = 2.0 * std::f32::consts::PI;
    while radians > std::f32::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f32::consts::PI {
        radians += two_pi;
    }
    radians
}

pub(crate) fn rotate_vec2(value: glam::Vec2, radians: f32) -> glam::Vec2 {
    if radians == 0.0 {
        return value;
    }
    glam::Vec2::from_angle(radians).rotate(value)
}
