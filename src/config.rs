//! Translator configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default cap on time samples read per primvar or transform.
pub const MAX_PRIMVAR_SAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Frames per second, used to turn per-second velocities into
    /// per-frame offsets.
    pub fps: f32,
    /// Shutter interval in frames relative to the current frame.
    pub shutter: [f32; 2],
    pub max_primvar_samples: usize,
    /// Motion keys synthesized from velocities when the host does not say.
    pub default_deform_keys: usize,
    pub fallback_surface_shader: String,
    pub fallback_volume_shader: String,
    pub render_tags: Vec<String>,
    pub record_diagnostics: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            fps: 24.0,
            shutter: [0.0, 0.0],
            max_primvar_samples: MAX_PRIMVAR_SAMPLES,
            default_deform_keys: 3,
            fallback_surface_shader: "standard_surface".to_string(),
            fallback_volume_shader: "standard_volume".to_string(),
            render_tags: vec!["geometry".to_string(), "render".to_string()],
            record_diagnostics: true,
        }
    }
}

impl TranslatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TranslatorConfig =
            serde_json::from_str(json).context("failed to parse translator config JSON")?;
        Ok(config.sanitized())
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read translator config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("invalid translator config {}", path.display()))
    }

    /// Clamps values the engine cannot work with.
    fn sanitized(mut self) -> Self {
        if !(self.fps > 0.0) {
            self.fps = 24.0;
        }
        if self.shutter[0] > self.shutter[1] {
            self.shutter.swap(0, 1);
        }
        self.max_primvar_samples = self.max_primvar_samples.max(1);
        self.default_deform_keys = self.default_deform_keys.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let cfg = TranslatorConfig::from_json_str(r#"{ "fps": 30.0 }"#).unwrap();
        assert_eq!(cfg.fps, 30.0);
        assert_eq!(cfg.max_primvar_samples, MAX_PRIMVAR_SAMPLES);
        assert_eq!(cfg.fallback_surface_shader, "standard_surface");
    }

    #[test]
    fn test_sanitizes_bad_values() {
        let cfg = TranslatorConfig::from_json_str(
            r#"{ "fps": 0.0, "shutter": [0.25, -0.25], "max_primvar_samples": 0 }"#,
        )
        .unwrap();
        assert_eq!(cfg.fps, 24.0);
        assert_eq!(cfg.shutter, [-0.25, 0.25]);
        assert_eq!(cfg.max_primvar_samples, 1);
    }

    #[test]
    fn test_invalid_json_reports_context() {
        let err = TranslatorConfig::from_json_str("{ fps: }").unwrap_err();
        assert!(err.to_string().contains("translator config"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = TranslatorConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
