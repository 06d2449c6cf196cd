//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! configuration file, and [`SessionConfig`], the resolved settings a
//! [`ChatSession`](crate::chat::ChatSession) reads. Precedence is defaults,
//! then the YAML file, then command-line flags. The credential only ever comes
//! from the environment.

use std::path::Path;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_API_URL;
use crate::error::{Error, Result};
use crate::provider::ApiKey;
use crate::types::Model;

/// Environment variable holding the provider credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default sampling temperature: low variance for technical answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default persona of the assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é a LAVO, especialista em Reforma Tributária brasileira (IBS/CBS), \
SAP B1 e auditoria SPED. Seja claro, técnico e objetivo; cite dispositivos legais quando útil.";

/// Command-line arguments for the lavo-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-4o-mini)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML file with model, system_prompt, temperature, base_url", "FILE")]
    pub config: Option<String>,

    /// Endpoint root of an OpenAI-compatible service.
    #[arrrg(optional, "API base URL (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// File receiving one JSON line per request, chunk and error.
    #[arrrg(optional, "Append JSON-lines client logs to this file", "FILE")]
    pub log_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Settings that may be stored in a YAML configuration file.
///
/// ```yaml
/// model: gpt-4.1-mini
/// temperature: 0.3
/// system_prompt: |
///   Você é a LAVO.
/// base_url: https://api.openai.com/v1/
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,

    /// System prompt text.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Endpoint root.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ConfigFile {
    /// Parses a configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads a configuration file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::io(
                format!("failed to read config file {}", path.display()),
                err,
            )
        })?;
        Self::from_yaml(&content)
    }
}

/// Configuration for a chat session.
///
/// Owned by the surrounding application. Changing `system_prompt` here does
/// not touch the conversation; the session applies it only when asked to.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Text of the system turn.
    pub system_prompt: String,

    /// Provider credential; submissions fail with a configuration error
    /// while this is absent.
    pub api_key: Option<ApiKey>,

    /// The model to use for generating responses.
    pub model: Model,

    /// Sampling temperature.
    pub temperature: f32,

    /// Endpoint root of the provider.
    pub base_url: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl SessionConfig {
    /// Creates a new SessionConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-4o-mini
    /// - Temperature: 0.2
    /// - System prompt: the LAVO persona
    /// - Credential: none
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key: None,
            model: Model::default(),
            temperature: DEFAULT_TEMPERATURE,
            base_url: DEFAULT_API_URL.to_string(),
            use_color: true,
        }
    }

    /// Resolves configuration from command-line arguments.
    ///
    /// Loads the YAML file named by `--config` first, then applies flags on
    /// top. The credential is read from `OPENAI_API_KEY`.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => ConfigFile::from_file(path)?,
            None => ConfigFile::default(),
        };
        let mut config = Self::new().with_file(file)?;
        if let Some(model) = args.model {
            config.model = parse_model(&model);
        }
        if let Some(system) = args.system {
            config.system_prompt = system;
        }
        if let Some(base_url) = args.base_url {
            config.base_url = base_url;
        }
        config.use_color = !args.no_color;
        config.api_key = ApiKey::from_env(API_KEY_ENV);
        Ok(config)
    }

    /// Applies the values present in a configuration file.
    pub fn with_file(mut self, file: ConfigFile) -> Result<Self> {
        if let Some(model) = file.model {
            self.model = parse_model(&model);
        }
        if let Some(prompt) = file.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(temperature) = file.temperature {
            self.temperature = validate_temperature(temperature)?;
        }
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        Ok(self)
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the credential.
    pub fn with_api_key(mut self, api_key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the provider endpoint root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Returns true when a non-blank credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.is_empty())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_model(raw: &str) -> Model {
    match raw.parse::<Model>() {
        Ok(model) => model,
        Err(never) => match never {},
    }
}

/// Checks that a temperature is within the range completion endpoints accept.
pub fn validate_temperature(temperature: f32) -> Result<f32> {
    if temperature.is_finite() && (0.0..=2.0).contains(&temperature) {
        Ok(temperature)
    } else {
        Err(Error::validation(
            format!("temperature must be between 0.0 and 2.0, got {temperature}"),
            Some("temperature".to_string()),
        ))
    }
}
