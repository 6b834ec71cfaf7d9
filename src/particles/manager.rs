use super::definition::EffectDefinition;
use super::effect::ParticleEffect;
use super::render::ParticleRenderer;
use crate::config::FxConfig;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

struct ManagedEffect {
    id: EffectId,
    effect: ParticleEffect,
    active: bool,
}

/// Owns every instantiated effect and drives them once per frame.
///
/// Effects that report not-alive leave the active set during `update` and are
/// destroyed at the start of the following `update`.
pub struct ParticleManager {
    config: FxConfig,
    effects: Vec<ManagedEffect>,
    definitions: HashMap<PathBuf, Arc<EffectDefinition>>,
    next_id: u64,
    num_particles: usize,
}

impl Default for ParticleManager {
    fn default() -> Self {
        Self::new(FxConfig::default())
    }
}

impl ParticleManager {
    pub fn new(config: FxConfig) -> Self {
        Self { config, effects: Vec::new(), definitions: HashMap::new(), next_id: 1, num_particles: 0 }
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    /// Loads (or reuses) the definition at `path` and starts an instance at `(x, y)`.
    pub fn add_particle_effect(&mut self, path: impl AsRef<Path>, x: f32, y: f32) -> Result<EffectId> {
        let path = path.as_ref();
        let definition = match self.definition_for(path) {
            Ok(definition) => definition,
            Err(err) => {
                log::warn!("Rejected particle effect {}: {err:#}", path.display());
                return Err(err);
            }
        };
        self.add_effect_from_definition(definition, x, y)
            .with_context(|| format!("Failed to instantiate particle effect {}", path.display()))
    }

    pub fn add_effect_from_definition(
        &mut self,
        definition: Arc<EffectDefinition>,
        x: f32,
        y: f32,
    ) -> Result<EffectId> {
        let mut effect = ParticleEffect::from_definition(definition)?;
        effect.move_to(x, y);
        Ok(self.register(effect))
    }

    /// Takes ownership of an already-built effect.
    pub fn register(&mut self, effect: ParticleEffect) -> EffectId {
        let id = EffectId(self.next_id);
        self.next_id += 1;
        self.effects.push(ManagedEffect { id, effect, active: true });
        id
    }

    fn definition_for(&mut self, path: &Path) -> Result<Arc<EffectDefinition>> {
        if !self.config.cache_definitions {
            return Ok(Arc::new(EffectDefinition::load_with(path, &self.config)?));
        }
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(definition) = self.definitions.get(&key) {
            return Ok(Arc::clone(definition));
        }
        let definition = Arc::new(EffectDefinition::load_with(path, &self.config)?);
        self.definitions.insert(key, Arc::clone(&definition));
        Ok(definition)
    }

    pub fn effect(&self, id: EffectId) -> Option<&ParticleEffect> {
        self.effects.iter().find(|entry| entry.id == id).map(|entry| &entry.effect)
    }

    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut ParticleEffect> {
        self.effects.iter_mut().find(|entry| entry.id == id).map(|entry| &mut entry.effect)
    }

    pub fn is_active(&self, id: EffectId) -> bool {
        self.effects.iter().any(|entry| entry.id == id && entry.active)
    }

    pub fn active_effects(&self) -> impl Iterator<Item = (EffectId, &ParticleEffect)> {
        self.effects.iter().filter(|entry| entry.active).map(|entry| (entry.id, &entry.effect))
    }

    pub fn num_active_effects(&self) -> usize {
        self.effects.iter().filter(|entry| entry.active).count()
    }

    /// Effects still owned, including ones awaiting destruction.
    pub fn num_owned_effects(&self) -> usize {
        self.effects.len()
    }

    pub fn num_cached_definitions(&self) -> usize {
        self.definitions.len()
    }

    /// Live particles summed over active effects during the last update.
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn update(&mut self, dt: f32) {
        self.effects.retain(|entry| entry.active);
        let dt = self.config.clamp_step(dt);
        let mut total = 0;
        for entry in &mut self.effects {
            entry.effect.update(dt);
            if !entry.effect.is_alive() {
                log::debug!("{} finished", entry.id);
                entry.active = false;
                continue;
            }
            total += entry.effect.num_particles();
        }
        self.num_particles = total;
        log::trace!("{} particles across {} effects", total, self.num_active_effects());
    }

    /// Draws active effects in registration order.
    pub fn draw<R: ParticleRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        for entry in self.effects.iter_mut().filter(|entry| entry.active) {
            entry.effect.draw(renderer).with_context(|| format!("Failed to draw {}", entry.id))?;
        }
        Ok(())
    }

    pub fn stop_all(&mut self, kill_immediate: bool) {
        for entry in self.effects.iter_mut().filter(|entry| entry.active) {
            entry.effect.stop(kill_immediate);
        }
    }

    /// Destroys every effect immediately.
    pub fn clear(&mut self) {
        self.effects.clear();
        self.num_particles = 0;
    }

    pub fn clear_definition_cache(&mut self) {
        self.definitions.clear();
    }
}
