use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use drift_camera::ControllerSettings;
use drift_llm::{DEFAULT_OPENAI_MODEL, ProviderConfig, RIG_OPENAI_PROVIDER_ID};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_PREAMBLE: &str =
    "You are a friendly AI assistant. Answer the user's questions helpfully and concisely.";
pub const SETTINGS_DIRECTORY_NAME: &str = "drift";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "DRIFT_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_preamble")]
    pub preamble: String,
    #[serde(default)]
    pub controls: ControllerSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: None,
            temperature: None,
            preamble: default_preamble(),
            controls: ControllerSettings::default(),
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if !self.is_valid() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
        ))
    }

    /// A credential is usable when it has any non-blank content.
    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.model = non_blank_or(self.model, default_model);
        self.preamble = non_blank_or(self.preamble, default_preamble);
        self
    }

    // Conventional OpenAI variables only fill gaps left by the file and DRIFT_ vars.
    fn with_openai_environment(mut self) -> Self {
        if self.api_key.is_empty()
            && let Some(api_key) = env_value("OPENAI_API_KEY")
        {
            self.api_key = api_key;
        }
        if self.endpoint == DEFAULT_ENDPOINT
            && let Some(endpoint) = env_value("OPENAI_BASE_URL")
        {
            self.endpoint = endpoint;
        }
        if self.model == DEFAULT_OPENAI_MODEL
            && let Some(model) = env_value("OPENAI_MODEL")
        {
            self.model = model;
        }
        self
    }
}

/// Process-wide credential and preference store backed by a JSON file.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ProviderSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".drift"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads from `config_path` only.
    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path, false);
        Self::with_settings(config_path, settings)
    }

    /// Loads from the default path, layered with environment overrides.
    pub fn load() -> Self {
        let config_path = Self::default_config_path();
        let settings = Self::load_from_disk(&config_path, true);
        Self::with_settings(config_path, settings)
    }

    fn with_settings(config_path: PathBuf, settings: ProviderSettings) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ProviderSettings> {
        self.settings.load_full()
    }

    pub fn has_valid_api_key(&self) -> bool {
        self.settings.load().is_valid()
    }

    pub fn update(&self, settings: ProviderSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    pub fn set_api_key(&self, api_key: impl Into<String>) -> Result<(), SettingsError> {
        let settings = self.settings().as_ref().clone().with_api_key(api_key);
        self.update(settings)
    }

    fn load_from_disk(path: &Path, with_environment: bool) -> ProviderSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let mut figment = Figment::from(Serialized::defaults(ProviderSettings::default()))
            .merge(Json::file(path));
        if with_environment {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        match figment.extract::<ProviderSettings>() {
            Ok(settings) if with_environment => settings.normalized().with_openai_environment(),
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                let settings = ProviderSettings::default();
                if with_environment {
                    settings.with_openai_environment()
                } else {
                    settings
                }
            }
        }
    }

    fn persist(&self, settings: &ProviderSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_blank_or(value: String, default: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default()
    } else {
        trimmed.to_string()
    }
}

fn default_provider_id() -> String {
    RIG_OPENAI_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("nested").join(SETTINGS_FILE_NAME))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(*store.settings(), ProviderSettings::default());
        assert!(!store.has_valid_api_key());
        assert!(store.settings().to_provider_config().is_none());
    }

    #[test]
    fn api_key_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set_api_key("  sk-test  ").unwrap();
        assert!(store.has_valid_api_key());

        let reopened = store_in(&dir);
        assert_eq!(reopened.settings().api_key, "sk-test");
        assert!(!reopened.config_path().with_extension("json.tmp").exists());

        let config = reopened.settings().to_provider_config().unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn blank_key_is_not_a_credential() {
        let settings = ProviderSettings::default().with_api_key("   ");
        assert!(!settings.is_valid());
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "model": " gpt-4o-mini ", "controls": { "move_speed": 4.0 } }"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.controls.move_speed, 4.0);
        assert_eq!(settings.controls.marker_distance, 3.0);
        assert_eq!(settings.preamble, DEFAULT_PREAMBLE);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(*SettingsStore::new(path).settings(), ProviderSettings::default());
    }

    #[test]
    fn normalization_restores_blank_fields() {
        let settings = ProviderSettings {
            provider_id: " ".to_string(),
            endpoint: String::new(),
            model: "  ".to_string(),
            preamble: String::new(),
            ..ProviderSettings::default()
        }
        .normalized();

        assert_eq!(settings, ProviderSettings::default());
    }
}
