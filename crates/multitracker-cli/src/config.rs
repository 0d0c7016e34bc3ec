use std::path::PathBuf;

use multitracker_core::EngineConfig;

#[derive(serde::Serialize, serde::Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Capture device name, or empty for the host default
    #[serde(default)]
    pub input_device: String,
}

impl AppConfig {
    pub fn input_device(&self) -> &str {
        if self.input_device.is_empty() { "default" } else { &self.input_device }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("multitracker")
        .join("config.toml")
}

pub fn load_config() -> AppConfig {
    let path = config_path();
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn save_config(config: &AppConfig) -> anyhow::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str("input_device = \"USB Mic\"\n[engine]\nsample_rate = 48000\n").unwrap();
        assert_eq!(config.input_device(), "USB Mic");
        assert_eq!(config.engine.sample_rate, 48000);
        assert_eq!(config.engine.tap_size, EngineConfig::default().tap_size);
    }

    #[test]
    fn test_empty_device_means_default() {
        let config = AppConfig::default();
        assert_eq!(config.input_device(), "default");
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[engine]"));
    }
}
