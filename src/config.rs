use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "StreamConfig::default_capacity_bytes")]
    pub capacity_bytes: usize,
    #[serde(default = "StreamConfig::default_alignment")]
    pub alignment: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "PlaybackConfig::default_speed")]
    pub default_speed: f32,
    #[serde(default = "PlaybackConfig::default_looping")]
    pub default_looping: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub capacity_bytes: Option<usize>,
    pub speed: Option<f32>,
    pub looping: Option<bool>,
}

impl StreamConfig {
    const fn default_capacity_bytes() -> usize {
        512 * 1024
    }

    const fn default_alignment() -> usize {
        256
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.alignment.is_power_of_two(),
            "stream.alignment must be a power of two (got {})",
            self.alignment
        );
        ensure!(self.capacity_bytes > 0, "stream.capacity_bytes must be greater than zero");
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { capacity_bytes: Self::default_capacity_bytes(), alignment: Self::default_alignment() }
    }
}

impl PlaybackConfig {
    fn default_speed() -> f32 {
        1.0
    }

    const fn default_looping() -> bool {
        true
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { default_speed: Self::default_speed(), default_looping: Self::default_looping() }
    }
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: RuntimeConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        cfg.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        ensure!(
            self.playback.default_speed.is_finite(),
            "playback.default_speed must be finite (got {})",
            self.playback.default_speed
        );
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(capacity) = overrides.capacity_bytes {
            self.stream.capacity_bytes = capacity;
        }
        if let Some(speed) = overrides.speed {
            self.playback.default_speed = speed;
        }
        if let Some(looping) = overrides.looping {
            self.playback.default_looping = looping;
        }
    }
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.capacity_bytes.is_none() && self.speed.is_none() && self.looping.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.capacity_bytes.is_some() {
            fields.push("capacity_bytes");
        }
        if self.speed.is_some() {
            fields.push("speed");
        }
        if self.looping.is_some() {
            fields.push("looping");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.stream.capacity_bytes, 512 * 1024);
        assert_eq!(cfg.stream.alignment, 256);
        assert!((cfg.playback.default_speed - 1.0).abs() < f32::EPSILON);
        assert!(cfg.playback.default_looping);
    }

    #[test]
    fn loads_partial_file_and_applies_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "stream": {{ "capacity_bytes": 8192 }}, "playback": {{ "default_speed": -0.5 }} }}"#)
            .expect("write config");
        let mut cfg = RuntimeConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.stream.capacity_bytes, 8192);
        assert_eq!(cfg.stream.alignment, 256);
        assert!((cfg.playback.default_speed + 0.5).abs() < f32::EPSILON);

        let overrides = RuntimeOverrides { capacity_bytes: None, speed: Some(2.0), looping: Some(false) };
        assert_eq!(overrides.applied_fields(), vec!["speed", "looping"]);
        cfg.apply_overrides(&overrides);
        assert!((cfg.playback.default_speed - 2.0).abs() < f32::EPSILON);
        assert!(!cfg.playback.default_looping);
        assert_eq!(cfg.stream.capacity_bytes, 8192);
    }

    #[test]
    fn rejects_bad_alignment_and_falls_back() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "stream": {{ "alignment": 300 }} }}"#).expect("write config");
        let err = RuntimeConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:?}").contains("power of two"));
        let cfg = RuntimeConfig::load_or_default(file.path());
        assert_eq!(cfg.stream.alignment, 256);
        assert!(RuntimeOverrides::default().is_empty());
    }
}
