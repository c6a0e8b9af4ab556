use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostic::Locale;
use crate::engine::EngineKind;
use crate::export::ExportOptions;
use crate::repair::ProviderKind;
use crate::viewport::ViewportConfig;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings as TOML ({toml}) or YAML ({yaml})")]
    Parse { toml: String, yaml: String },
    #[error("Failed to parse AI configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn default_command() -> String {
    "mmdc".to_string()
}

fn default_cache_capacity() -> usize {
    32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub engine: EngineKind,
    /// Program used by the command engine.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub command_args: Vec<String>,
    /// Zero disables caching.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub locale: Locale,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            command: default_command(),
            command_args: Vec::new(),
            cache_capacity: default_cache_capacity(),
            locale: Locale::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub export: ExportOptions,
    #[serde(default)]
    pub ai: Option<AiConfig>,
}

impl Settings {
    /// Parse TOML, falling back to YAML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = match toml::from_str(content) {
            Ok(settings) => settings,
            Err(toml_err) => {
                serde_yaml::from_str(content).map_err(|yaml_err| ConfigError::Parse {
                    toml: toml_err.to_string(),
                    yaml: yaml_err.to_string(),
                })?
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject numeric settings the viewport and exporter cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(v: f32) -> bool {
            v.is_finite() && v > 0.0
        }
        fn non_negative(v: f32) -> bool {
            v.is_finite() && v >= 0.0
        }

        let view = &self.viewport;
        let export = &self.export;
        let checks = [
            ("viewport.min_scale", positive(view.min_scale), "must be a positive number"),
            (
                "viewport.max_scale",
                positive(view.max_scale) && view.max_scale >= view.min_scale,
                "must be a number not below min_scale",
            ),
            ("viewport.zoom_in_step", positive(view.zoom_in_step), "must be a positive number"),
            ("viewport.zoom_out_step", positive(view.zoom_out_step), "must be a positive number"),
            ("viewport.fit_margin", non_negative(view.fit_margin), "must not be negative"),
            ("export.supersample", positive(export.supersample), "must be a positive number"),
            ("export.padding", non_negative(export.padding), "must not be negative"),
            ("export.max_side", positive(export.max_side), "must be a positive number"),
            (
                "export.min_width",
                non_negative(export.min_width) && export.min_width <= export.max_side,
                "must be between 0 and max_side",
            ),
            (
                "export.min_height",
                non_negative(export.min_height) && export.min_height <= export.max_side,
                "must be between 0 and max_side",
            ),
            (
                "export.jpeg_quality",
                (1..=100).contains(&export.jpeg_quality),
                "must be between 1 and 100",
            ),
            ("export.pdf_margin", non_negative(export.pdf_margin), "must not be negative"),
        ];

        match checks.into_iter().find(|(_, ok, _)| !ok) {
            Some((field, _, reason)) => Err(ConfigError::Invalid { field, reason }),
            None => Ok(()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }
}

/// Provider configuration record, stored as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Replaces the built-in repair instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AiConfig {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            base_url: None,
            model: None,
            temperature: None,
            max_tokens: None,
            prompt: None,
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&read(path)?)
    }

    /// Full chat-completions URL.
    pub fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(self.provider.default_base_url());
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.provider.default_model())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }
}
