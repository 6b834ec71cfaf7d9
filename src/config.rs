use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Engine-level settings shared by every effect the manager loads.
#[derive(Debug, Clone, Deserialize)]
pub struct FxConfig {
    /// Base directory for relative animation frame paths. Frames resolve
    /// against the effect file's own directory when unset.
    #[serde(default)]
    pub asset_root: Option<PathBuf>,
    #[serde(default = "FxConfig::default_max_particles_per_system")]
    pub max_particles_per_system: u32,
    #[serde(default = "FxConfig::default_max_frame_step")]
    pub max_frame_step: f32,
    #[serde(default = "FxConfig::default_cache_definitions")]
    pub cache_definitions: bool,
}

impl FxConfig {
    const fn default_max_particles_per_system() -> u32 {
        10_000
    }

    const fn default_max_frame_step() -> f32 {
        0.25
    }

    const fn default_cache_definitions() -> bool {
        true
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read fx config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse fx config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Fx config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    /// Directory relative frame paths are joined onto for an effect loaded from `effect_path`.
    pub fn frame_base_dir(&self, effect_path: &Path) -> PathBuf {
        match &self.asset_root {
            Some(root) => root.clone(),
            None => effect_path.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    /// Clamps a requested frame step into `[0, max_frame_step]`; non-finite steps become zero.
    pub fn clamp_step(&self, dt: f32) -> f32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0.0;
        }
        if self.max_frame_step > 0.0 {
            dt.min(self.max_frame_step)
        } else {
            dt
        }
    }
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            asset_root: None,
            max_particles_per_system: Self::default_max_particles_per_system(),
            max_frame_step: Self::default_max_frame_step(),
            cache_definitions: Self::default_cache_definitions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: FxConfig = serde_json::from_str("{}").expect("parse empty config");
        assert!(cfg.asset_root.is_none());
        assert_eq!(cfg.max_particles_per_system, 10_000);
        assert!(cfg.cache_definitions);
    }

    #[test]
    fn load_reads_overrides_from_disk() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "asset_root": "data/fx", "max_frame_step": 0.1 }}"#).expect("write config");
        let cfg = FxConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.asset_root.as_deref(), Some(Path::new("data/fx")));
        assert!((cfg.max_frame_step - 0.1).abs() < f32::EPSILON);
        assert_eq!(cfg.frame_base_dir(Path::new("effects/boom.json")), PathBuf::from("data/fx"));
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let cfg = FxConfig::load_or_default("does/not/exist.json");
        assert_eq!(cfg.max_particles_per_system, FxConfig::default().max_particles_per_system);
    }

    #[test]
    fn clamp_step_rejects_bad_values() {
        let cfg = FxConfig::default();
        assert_eq!(cfg.clamp_step(f32::NAN), 0.0);
        assert_eq!(cfg.clamp_step(-1.0), 0.0);
        assert_eq!(cfg.clamp_step(5.0), 0.25);
        assert_eq!(cfg.clamp_step(0.01), 0.01);
    }
}
