use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::llm::{DeploymentMap, Llm};
use crate::providers::bedrock::{runtime_endpoint, DEFAULT_REGION};

const ENV_PREFIX: &str = "DRAFTSMITH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid value for {env_var}: {message}")]
    InvalidValue { env_var: String, message: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable a dotted config key is read from
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "{}_{}",
        ENV_PREFIX,
        field_path.replace('.', "__").to_uppercase()
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BedrockSettings {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Deployment ids by model name, layered over the built-in ones
    #[serde(default)]
    pub deployments: HashMap<String, String>,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            api_key: None,
            deployments: HashMap::new(),
        }
    }
}

impl BedrockSettings {
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| runtime_endpoint(&self.region))
    }

    pub fn deployment_map(&self) -> Result<DeploymentMap, ConfigError> {
        self.deployments
            .iter()
            .try_fold(DeploymentMap::default(), |map, (name, deployment_id)| {
                let model = Llm::from_frontend(name).map_err(|e| ConfigError::InvalidValue {
                    env_var: to_env_var(&format!("bedrock.deployments.{}", name)),
                    message: e.to_string(),
                })?;
                Ok(map.with_deployment(model, deployment_id.clone()))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebugSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_debug_dir")]
    pub dir: PathBuf,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_debug_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub bedrock: BedrockSettings,
    #[serde(default)]
    pub debug: DebugSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("bedrock.region", default_region())?
            .set_default("debug.enabled", false)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = match config.try_deserialize::<Self>() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                return Err(if error_str.starts_with("missing field") {
                    // "missing field `region`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }
                } else if let config::ConfigError::NotFound(field) = &err {
                    ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }
                } else {
                    ConfigError::Other(err)
                });
            }
        };

        // surface bad model names at load time rather than on first request
        settings.bedrock.deployment_map()?;
        Ok(settings)
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("./debug")
}
