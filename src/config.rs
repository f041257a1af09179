use eyre::{Context, Result};
use reloadr::MountConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub display_name: String,
    pub mount: MountConfig,
    pub demo: DemoConfig,
}

/// Simulated source used by the demo command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Pages requested, one options change each
    pub pages: u32,
    /// Latency of the last page; earlier pages take proportionally longer
    pub latency_ms: u64,
    /// Pause between options changes
    pub change_interval_ms: u64,
    /// Page whose load fails
    pub fail_page: Option<u32>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pages: 5,
            latency_ms: 80,
            change_interval_ms: 20,
            fail_page: None,
        }
    }
}

impl DemoConfig {
    /// Earlier pages are slower, so superseded loads settle after newer ones
    pub fn latency_for(&self, page: u32) -> Duration {
        let remaining = u64::from(self.pages.saturating_sub(page).max(1));
        Duration::from_millis(self.latency_ms * remaining)
    }

    pub fn change_interval(&self) -> Duration {
        Duration::from_millis(self.change_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            display_name: "Pages".to_string(),
            mount: MountConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.mount.validate().context("Invalid mount settings")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolved configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.display_name, "Pages");
        assert_eq!(config.mount, MountConfig::default());
        assert_eq!(config.demo.pages, 5);
        assert!(config.demo.fail_page.is_none());
    }

    #[test]
    fn test_load_explicit_path() {
        let file = write_config(
            r#"
display_name: Users
mount:
  lazy_reload_on_mount: true
  empty_on_unmount: true
  teardown_delay_ms: 250
demo:
  pages: 3
  fail_page: 2
"#,
        );
        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.display_name, "Users");
        assert!(config.mount.lazy_reload_on_mount);
        assert!(config.mount.empty_on_unmount);
        assert_eq!(config.mount.teardown_delay_ms, 250);
        assert_eq!(config.demo.pages, 3);
        assert_eq!(config.demo.fail_page, Some(2));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let file = write_config("mount:\n  empty_on_unmount: true\n");
        let config = Config::load_from_file(file.path()).unwrap();
        assert!(config.mount.empty_on_unmount);
        assert_eq!(config.mount.teardown_delay_ms, 60);
        assert_eq!(config.display_name, "Pages");
        assert_eq!(config.demo.latency_ms, 80);
    }

    #[test]
    fn test_invalid_teardown_delay_rejected() {
        let file = write_config("mount:\n  teardown_delay_ms: 999999\n");
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("teardown_delay_ms"));
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        let missing = PathBuf::from("/nonexistent/reloadr.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_malformed_yaml_errors() {
        let file = write_config("mount: [not, a, map]\n");
        assert!(Config::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_yaml_output_reloads() {
        let yaml = Config::default().to_yaml().unwrap();
        let file = write_config(&yaml);
        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.display_name, "Pages");
        assert_eq!(config.mount, MountConfig::default());
    }

    #[test]
    fn test_latency_decreases_with_page() {
        let demo = DemoConfig::default();
        assert_eq!(demo.latency_for(0), Duration::from_millis(400));
        assert_eq!(demo.latency_for(4), Duration::from_millis(80));
        // pages past the end still take one step
        assert_eq!(demo.latency_for(9), Duration::from_millis(80));
    }
}
