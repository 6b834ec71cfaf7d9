use super::definition::EffectDefinition;
use super::render::ParticleRenderer;
use super::system::{EffectParameters, ParticleSystem};
use crate::config::FxConfig;
use crate::wrap_angle;
use anyhow::{Context, Result};
use glam::Vec2;
use std::path::Path;
use std::sync::Arc;

/// A running instance of an [`EffectDefinition`]: one particle system per
/// enabled system definition, sharing a position, orientation and attractor.
#[derive(Default)]
pub struct ParticleEffect {
    definition: Option<Arc<EffectDefinition>>,
    systems: Vec<ParticleSystem>,
    position: Vec2,
    orientation: f32,
    attractor: Vec2,
    age: f32,
    alive: bool,
    num_particles: usize,
}

impl ParticleEffect {
    /// An empty, unloaded effect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates every enabled system of `definition`.
    pub fn from_definition(definition: Arc<EffectDefinition>) -> Result<Self> {
        Self::instantiate(definition, None)
    }

    /// Like [`ParticleEffect::from_definition`] with per-system seeds derived from `seed`.
    pub fn from_definition_seeded(definition: Arc<EffectDefinition>, seed: u64) -> Result<Self> {
        Self::instantiate(definition, Some(seed))
    }

    fn instantiate(definition: Arc<EffectDefinition>, seed: Option<u64>) -> Result<Self> {
        let mut systems = Vec::with_capacity(definition.systems.len());
        for (index, system_def) in definition.systems.iter().enumerate() {
            if !system_def.enabled {
                continue;
            }
            let system = match seed {
                Some(seed) => ParticleSystem::with_seed(Arc::clone(system_def), seed.wrapping_add(index as u64)),
                None => ParticleSystem::new(Arc::clone(system_def)),
            }
            .with_context(|| format!("Failed to create particle system {index}"))?;
            systems.push(system);
        }
        let alive = !systems.is_empty();
        Ok(Self { definition: Some(definition), systems, alive, ..Default::default() })
    }

    /// Loads a description from disk and instantiates it. On failure the
    /// effect is left unloaded with no systems.
    pub fn load_effect(&mut self, path: impl AsRef<Path>, config: &FxConfig) -> Result<()> {
        let path = path.as_ref();
        let loaded = EffectDefinition::load_with(path, config)
            .and_then(|definition| Self::from_definition(Arc::new(definition)));
        match loaded {
            Ok(effect) => {
                let (position, orientation, attractor) = (self.position, self.orientation, self.attractor);
                *self = effect;
                self.position = position;
                self.orientation = orientation;
                self.attractor = attractor;
                Ok(())
            }
            Err(err) => {
                self.destroy();
                Err(err)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.definition.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn definition(&self) -> Option<&Arc<EffectDefinition>> {
        self.definition.as_ref()
    }

    pub fn systems(&self) -> &[ParticleSystem] {
        &self.systems
    }

    pub fn num_systems(&self) -> usize {
        self.systems.len()
    }

    /// Live particles counted during the last update.
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn orientation(&self) -> f32 {
        self.orientation
    }

    pub fn attractor_point(&self) -> Vec2 {
        self.attractor
    }

    /// Collision rectangle width; zero when the definition does not use one.
    pub fn effect_width(&self) -> f32 {
        self.definition.as_ref().map_or(0.0, |definition| definition.effect_width)
    }

    pub fn effect_height(&self) -> f32 {
        self.definition.as_ref().map_or(0.0, |definition| definition.effect_height)
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    pub fn move_relative(&mut self, dx: f32, dy: f32) {
        self.position += Vec2::new(dx, dy);
    }

    pub fn set_orientation(&mut self, radians: f32) {
        self.orientation = wrap_angle(radians);
    }

    /// Sets the world-space attractor used by systems with a user-defined attractor.
    pub fn set_attractor_point(&mut self, x: f32, y: f32) {
        self.attractor = Vec2::new(x, y);
    }

    /// Restarts emission on every remaining system.
    pub fn start(&mut self) {
        if !self.is_loaded() || self.systems.is_empty() {
            return;
        }
        for system in &mut self.systems {
            system.start();
        }
        self.alive = true;
    }

    /// Stops emission. `kill_immediate` drops every particle this frame.
    pub fn stop(&mut self, kill_immediate: bool) {
        if kill_immediate {
            self.systems.clear();
            self.alive = false;
            self.num_particles = 0;
        } else {
            for system in &mut self.systems {
                system.stop();
            }
        }
    }

    fn parameters(&self) -> EffectParameters {
        EffectParameters { orientation: self.orientation, attractor: self.attractor - self.position }
    }

    pub fn update(&mut self, dt: f32) {
        if !self.is_loaded() || !self.alive {
            return;
        }
        self.age += dt;
        let params = self.parameters();
        for (index, system) in self.systems.iter_mut().enumerate() {
            if !system.update(dt, &params) {
                log::warn!("Particle system {index} rejected a step of {dt}s");
            }
        }
        self.systems.retain(ParticleSystem::is_alive);
        self.num_particles = self.systems.iter().map(ParticleSystem::num_particles).sum();
        if self.systems.is_empty() {
            self.alive = false;
        }
    }

    pub fn draw<R: ParticleRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        if !self.is_loaded() || !self.alive {
            return Ok(());
        }
        let origin = self.position;
        for system in &mut self.systems {
            system.draw(origin, renderer)?;
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.definition = None;
        self.systems.clear();
        self.alive = false;
        self.age = 0.0;
        self.num_particles = 0;
    }
}
