//! Configuration management for inspo using the prefer crate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{ConfigSource, SessionOptions, DEFAULT_TIMEOUT};
use crate::provider::{Credential, ProviderConfig, ProviderKind};

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "inspo";

/// Id given to the model described by `INSPO_PROVIDER` / `INSPO_MODEL_ID`.
pub const ENV_MODEL_ID: &str = "env";

/// A model the user can pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Stable id used by `active_model`.
    pub id: String,
    /// Display name.
    pub name: String,
    pub provider: ProviderKind,
    /// Provider-side model identifier.
    pub model_id: String,
}

/// One value per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PerProvider<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volcengine: Option<T>,
}

impl<T> Default for PerProvider<T> {
    fn default() -> Self {
        Self {
            gemini: None,
            volcengine: None,
        }
    }
}

impl<T> PerProvider<T> {
    pub fn get(&self, kind: ProviderKind) -> Option<&T> {
        match kind {
            ProviderKind::Gemini => self.gemini.as_ref(),
            ProviderKind::Volcengine => self.volcengine.as_ref(),
        }
    }

    pub fn set(&mut self, kind: ProviderKind, value: T) {
        match kind {
            ProviderKind::Gemini => self.gemini = Some(value),
            ProviderKind::Volcengine => self.volcengine = Some(value),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the status record and gallery live. `~` is expanded and
    /// relative paths resolve against the config file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    pub models: Vec<ModelEntry>,
    /// Id of the model to use; the first model when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_model: Option<String>,
    pub api_keys: PerProvider<Credential>,
    /// Base URL overrides, mostly for proxies and tests.
    pub endpoints: PerProvider<String>,
    pub timeout_secs: u64,
    /// Short pauses between progress steps.
    pub pacing: bool,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            models: Vec::new(),
            active_model: None,
            api_keys: PerProvider::default(),
            endpoints: PerProvider::default(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            pacing: true,
            source_path: None,
        }
    }
}

impl Settings {
    /// Discover a config file with prefer, then apply environment overrides.
    pub async fn load() -> Self {
        let settings = match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        };
        settings.with_env_overrides()
    }

    /// Load settings from a specific file, by extension (TOML or JSON).
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut settings: Settings = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        settings.source_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Apply overrides from the process environment.
    ///
    /// - `GEMINI_API_KEY`: Gemini key
    /// - `VOLCENGINE_API_KEY` / `ARK_API_KEY`: Volcengine key
    /// - `INSPO_MODEL`: id of the model to activate
    /// - `INSPO_PROVIDER` + `INSPO_MODEL_ID`: ad-hoc model, activated
    /// - `INSPO_DATA_DIR`: data directory
    /// - `INSPO_TIMEOUT_SECS`: session timeout
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("GEMINI_API_KEY") {
            self.api_keys.set(ProviderKind::Gemini, Credential::new(key));
        }
        if let Some(key) = var("VOLCENGINE_API_KEY").or_else(|| var("ARK_API_KEY")) {
            self.api_keys.set(ProviderKind::Volcengine, Credential::new(key));
        }

        if let Some(id) = var("INSPO_MODEL") {
            self.active_model = Some(id);
        }

        if let Some(model_id) = var("INSPO_MODEL_ID") {
            let provider = match var("INSPO_PROVIDER") {
                Some(name) => ProviderKind::from_str(&name).unwrap_or_else(|| {
                    warn!("Unknown INSPO_PROVIDER {:?}, using gemini", name);
                    ProviderKind::Gemini
                }),
                None => ProviderKind::default(),
            };
            self.models.retain(|m| m.id != ENV_MODEL_ID);
            self.models.push(ModelEntry {
                id: ENV_MODEL_ID.to_string(),
                name: model_id.clone(),
                provider,
                model_id,
            });
            self.active_model = Some(ENV_MODEL_ID.to_string());
        }

        if let Some(dir) = var("INSPO_DATA_DIR") {
            self.data_dir = Some(dir);
        }
        if let Some(secs) = var("INSPO_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid INSPO_TIMEOUT_SECS {:?}", secs),
            }
        }
        self
    }

    /// The selected model, falling back to the first configured one.
    pub fn active_model(&self) -> Option<&ModelEntry> {
        match &self.active_model {
            Some(id) => self.models.iter().find(|m| &m.id == id),
            None => self.models.first(),
        }
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(raw) => {
                let expanded = shellexpand::tilde(raw);
                let path = Path::new(expanded.as_ref());
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.base_dir().join(path)
                }
            }
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_NAME),
        }
    }

    /// Directory of the config file, or the working directory.
    fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            pacing: self.pacing,
            ..SessionOptions::default()
        }
    }
}

impl ConfigSource for Settings {
    /// A missing key still yields a config (with a blank credential) so
    /// the session can say which provider needs one.
    fn provider_config(&self) -> Option<ProviderConfig> {
        let model = self.active_model()?;
        let credential = self
            .api_keys
            .get(model.provider)
            .cloned()
            .unwrap_or_else(|| Credential::new(""));

        let mut config = ProviderConfig::new(model.provider, model.model_id.clone(), credential)
            .with_model_name(model.name.clone());
        if let Some(endpoint) = self.endpoints.get(model.provider) {
            config = config.with_endpoint(endpoint.clone());
        }
        Some(config)
    }
}

/// Human-readable summary with credentials redacted.
impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        writeln!(f, "Config file:  {}", source)?;
        writeln!(f, "Data dir:     {}", self.data_dir().display())?;
        writeln!(f, "Timeout:      {}s", self.timeout_secs)?;
        writeln!(f, "Pacing:       {}", if self.pacing { "on" } else { "off" })?;

        for kind in [ProviderKind::Gemini, ProviderKind::Volcengine] {
            let key = self
                .api_keys
                .get(kind)
                .filter(|k| !k.is_blank())
                .map(Credential::redacted)
                .unwrap_or_else(|| "(not set)".to_string());
            writeln!(f, "{:<13} {}", format!("{} key:", kind), key)?;
        }

        let active = self.active_model().map(|m| m.id.as_str());
        if self.models.is_empty() {
            writeln!(f, "Models:       (none)")?;
        } else {
            writeln!(f, "Models:")?;
            for model in &self.models {
                let marker = if Some(model.id.as_str()) == active { "*" } else { " " };
                writeln!(
                    f,
                    "  {} {} [{}] {} ({})",
                    marker, model.id, model.provider, model.name, model.model_id
                )?;
            }
        }
        Ok(())
    }
}
