use crate::models::MonitorSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Default directory holding `settings.yaml`
pub const DEFAULT_CONFIG_DIR: &str = "Serial Monitor Data";

const SETTINGS_FILE: &str = "settings.yaml";

/// Configuration manager for the settings file.
///
/// Settings are read through the `config` crate so that a partial file is
/// completed with defaults, and written back with `serde_yaml_ng`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        })
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load the settings file.
    ///
    /// A missing file yields the defaults, which are also written out as a
    /// template for the user to edit.
    pub fn load_settings(&self) -> Result<MonitorSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            let defaults = MonitorSettings::default();
            self.save_settings(&defaults)?;
            return Ok(defaults);
        }

        let settings: MonitorSettings = config::Config::builder()
            .add_source(config::File::new(
                self.settings_path.as_str(),
                config::FileFormat::Yaml,
            ))
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the settings file.
    pub fn save_settings(&self, settings: &MonitorSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }
}
