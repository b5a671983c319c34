//! Configuration management for the inference relay.
//!
//! Configuration is layered: serde defaults, then an optional config file
//! (YAML/TOML/JSON, located by `RELAY_CONFIG`), then `RELAY__*` environment
//! variables. Provider API keys are read from their conventional variables
//! (`HF_KEY`, `OPENROUTER_API_KEY`, ...). The result is immutable for the
//! lifetime of the process.

use crate::services::provider::ProviderKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Per-operation upstream timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Local directory for generated images
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Credentials, base URLs and model overrides per provider
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Fallback order per operation
    #[serde(default)]
    pub chains: ChainConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            verify_ssl: default_verify_ssl(),
            timeouts: TimeoutConfig::default(),
            artifacts: ArtifactConfig::default(),
            providers: ProvidersConfig::default(),
            chains: ChainConfig::default(),
        }
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream request timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_chat_timeout")]
    pub chat_secs: u64,

    /// Used for both image generation and image modification
    #[serde(default = "default_image_timeout")]
    pub image_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            chat_secs: default_chat_timeout(),
            image_secs: default_image_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }
}

/// Where generated images are written and how they are addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// When disabled, images are returned inline as base64
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,

    /// Path under which the directory is served by this process
    #[serde(default = "default_artifact_prefix")]
    pub url_prefix: String,

    /// Optional absolute origin prepended to returned URLs,
    /// e.g. `https://relay.example.com`
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_artifact_dir(),
            url_prefix: default_artifact_prefix(),
            public_base_url: None,
        }
    }
}

/// Settings for a single provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; a provider without one is left out of every chain
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Overrides the provider's public base URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub chat_model: Option<String>,

    #[serde(default)]
    pub image_model: Option<String>,

    #[serde(default)]
    pub edit_model: Option<String>,
}

impl ProviderSettings {
    /// The configured key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub huggingface: ProviderSettings,
    #[serde(default)]
    pub openrouter: ProviderSettings,
    #[serde(default)]
    pub fal: ProviderSettings,
    #[serde(default)]
    pub deepinfra: ProviderSettings,
    #[serde(default)]
    pub stability: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::HuggingFace => &self.huggingface,
            ProviderKind::OpenRouter => &self.openrouter,
            ProviderKind::Fal => &self.fal,
            ProviderKind::DeepInfra => &self.deepinfra,
            ProviderKind::Stability => &self.stability,
        }
    }

    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::HuggingFace => &mut self.huggingface,
            ProviderKind::OpenRouter => &mut self.openrouter,
            ProviderKind::Fal => &mut self.fal,
            ProviderKind::DeepInfra => &mut self.deepinfra,
            ProviderKind::Stability => &mut self.stability,
        }
    }
}

/// Provider order per operation. The first provider that succeeds wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_chat_chain")]
    pub chat: Vec<ProviderKind>,

    #[serde(default = "default_generate_chain")]
    pub generate_image: Vec<ProviderKind>,

    #[serde(default = "default_modify_chain")]
    pub modify_image: Vec<ProviderKind>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_chain(),
            generate_image: default_generate_chain(),
            modify_image: default_modify_chain(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_verify_ssl() -> bool {
    true
}

fn default_chat_timeout() -> u64 {
    60
}

fn default_image_timeout() -> u64 {
    120
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_artifact_prefix() -> String {
    "/static".to_string()
}

fn default_chat_chain() -> Vec<ProviderKind> {
    vec![
        ProviderKind::OpenRouter,
        ProviderKind::HuggingFace,
        ProviderKind::DeepInfra,
    ]
}

fn default_generate_chain() -> Vec<ProviderKind> {
    vec![
        ProviderKind::HuggingFace,
        ProviderKind::Fal,
        ProviderKind::DeepInfra,
        ProviderKind::Stability,
    ]
}

fn default_modify_chain() -> Vec<ProviderKind> {
    vec![ProviderKind::HuggingFace, ProviderKind::Fal]
}

impl AppConfig {
    /// Load configuration using `RELAY_CONFIG` (default: `relay`, any supported
    /// extension) as the optional config file.
    pub fn load() -> Result<Self> {
        let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from an optional file plus the environment.
    ///
    /// A missing file is not an error; every field has a default.
    ///
    /// ```no_run
    /// use inference_relay::core::config::AppConfig;
    ///
    /// let config = AppConfig::load_from("relay.yaml").expect("Failed to load config");
    /// ```
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("chains.chat")
                    .with_list_parse_key("chains.generate_image")
                    .with_list_parse_key("chains.modify_image"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration from {}", path))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply plain environment variables on top of the layered configuration.
    ///
    /// `HOST`, `PORT` and `VERIFY_SSL` take precedence. Provider keys are only
    /// filled from their conventional variables when not already configured.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(verify_ssl_str) = std::env::var("VERIFY_SSL") {
            self.verify_ssl = str_to_bool(&verify_ssl_str);
        }

        for kind in ProviderKind::ALL {
            let settings = self.providers.get_mut(kind);
            if settings.api_key().is_some() {
                continue;
            }
            settings.api_key = kind
                .key_env_vars()
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty());
        }
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        unsafe {
            for name in ["HOST", "PORT", "VERIFY_SSL", "RELAY__TIMEOUTS__CHAT_SECS"] {
                std::env::remove_var(name);
            }
            std::env::remove_var("RELAY__CHAINS__CHAT");
            for kind in ProviderKind::ALL {
                for name in kind.key_env_vars() {
                    std::env::remove_var(name);
                }
            }
        }
    }

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_str_to_bool() {
        assert!(str_to_bool("true"));
        assert!(str_to_bool("TRUE"));
        assert!(str_to_bool("1"));
        assert!(str_to_bool("yes"));
        assert!(str_to_bool("On"));
        assert!(!str_to_bool("false"));
        assert!(!str_to_bool("0"));
        assert!(!str_to_bool("off"));
        assert!(!str_to_bool(""));
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.timeouts.chat(), Duration::from_secs(60));
        assert_eq!(config.timeouts.image(), Duration::from_secs(120));
        assert!(!config.artifacts.enabled);
        assert_eq!(config.artifacts.url_prefix, "/static");
        assert_eq!(config.chains.chat[0], ProviderKind::OpenRouter);
        assert_eq!(config.chains.modify_image.len(), 2);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let settings = ProviderSettings {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.api_key(), None);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let config = AppConfig::load_from("definitely_missing_relay_config").unwrap();
        assert_eq!(config.server.port, 5000);
        assert!(config.verify_ssl);
        assert!(config.providers.huggingface.api_key().is_none());
    }

    #[test]
    #[serial]
    fn test_load_config_from_file() {
        clear_env();
        let file = yaml_file(
            r#"
server:
  host: 127.0.0.1
  port: 8080
verify_ssl: false
timeouts:
  chat_secs: 30
artifacts:
  enabled: true
  dir: /tmp/relay-artifacts
providers:
  fal:
    api_key: fal-secret
    image_model: fal-ai/flux/dev
chains:
  generate_image: [fal, stability]
"#,
        );

        let config = AppConfig::load_from(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(!config.verify_ssl);
        assert_eq!(config.timeouts.chat_secs, 30);
        assert_eq!(config.timeouts.image_secs, 120);
        assert!(config.artifacts.enabled);
        assert_eq!(config.artifacts.dir, PathBuf::from("/tmp/relay-artifacts"));
        assert_eq!(config.providers.fal.api_key(), Some("fal-secret"));
        assert_eq!(
            config.providers.fal.image_model.as_deref(),
            Some("fal-ai/flux/dev")
        );
        assert_eq!(
            config.chains.generate_image,
            vec![ProviderKind::Fal, ProviderKind::Stability]
        );
        assert_eq!(config.chains.chat, default_chat_chain());
    }

    #[test]
    #[serial]
    fn test_load_config_invalid_yaml() {
        clear_env();
        let file = yaml_file("server: [unclosed");
        let result = AppConfig::load_from(file.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("HOST", "192.168.1.1");
            std::env::set_var("PORT", "9999");
            std::env::set_var("VERIFY_SSL", "false");
            std::env::set_var("RELAY__TIMEOUTS__CHAT_SECS", "15");
            std::env::set_var("RELAY__CHAINS__CHAT", "huggingface,deepinfra");
        }

        let config = AppConfig::load_from("definitely_missing_relay_config").unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9999);
        assert!(!config.verify_ssl);
        assert_eq!(config.timeouts.chat_secs, 15);
        assert_eq!(
            config.chains.chat,
            vec![ProviderKind::HuggingFace, ProviderKind::DeepInfra]
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_provider_keys_from_conventional_env() {
        clear_env();
        unsafe {
            std::env::set_var("HF_TOKEN", "hf-from-token");
            std::env::set_var("OPENROUTER_API_KEY", "or-key");
            std::env::set_var("STABILITY_API_KEY", "");
        }

        let config = AppConfig::load_from("definitely_missing_relay_config").unwrap();

        assert_eq!(config.providers.huggingface.api_key(), Some("hf-from-token"));
        assert_eq!(config.providers.openrouter.api_key(), Some("or-key"));
        assert_eq!(config.providers.stability.api_key(), None);
        assert_eq!(config.providers.fal.api_key(), None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_file_key_wins_over_env() {
        clear_env();
        unsafe {
            std::env::set_var("FAL_KEY", "from-env");
        }
        let file = yaml_file("providers:\n  fal:\n    api_key: from-file\n");

        let config = AppConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.providers.fal.api_key(), Some("from-file"));

        clear_env();
    }

    #[test]
    fn test_config_serialization_hides_keys() {
        let mut config = AppConfig::default();
        config.providers.openrouter.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("openrouter"));
    }
}
