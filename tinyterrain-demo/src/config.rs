use serde::Deserialize;
use std::path::Path;

/// TOML-loadable configuration for the demo binary. `tinyterrain` itself
/// never reads this — the library's constructors always take explicit
/// arguments; this only exists to keep example/integration binaries out of
/// the business of parsing their own ad-hoc flags.
#[derive(Debug, Deserialize)]
pub struct TerrainConfig {
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct StoreSection {
    pub width: u32,
    pub height: u32,
    pub path: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_radius")]
    pub default_radius: u8,
}

fn default_cache_capacity() -> usize {
    64
}

fn default_radius() -> u8 {
    8
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TerrainConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_with_defaults() {
        let toml_str = r#"
            [store]
            width = 4
            height = 4
            path = "demo.terrain"
        "#;
        let config: TerrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.width, 4);
        assert_eq!(config.store.cache_capacity, 64);
        assert_eq!(config.store.default_radius, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_config_with_overrides() {
        let toml_str = r#"
            [store]
            width = 8
            height = 8
            path = "demo.terrain"
            cache_capacity = 16
            default_radius = 4

            [logging]
            level = "debug"
        "#;
        let config: TerrainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.cache_capacity, 16);
        assert_eq!(config.store.default_radius, 4);
        assert_eq!(config.logging.level, "debug");
    }
}
