use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a chat completion model identifier.
///
/// This can be a predefined model or a custom string value for models served
/// by compatible endpoints or released after this list was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Known chat completion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// GPT-4o mini, the lightweight default for continuous chat.
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,

    /// GPT-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,

    /// GPT-4.1
    #[serde(rename = "gpt-4.1")]
    Gpt41,

    /// GPT-4.1 mini
    #[serde(rename = "gpt-4.1-mini")]
    Gpt41Mini,

    /// GPT-4.1 nano
    #[serde(rename = "gpt-4.1-nano")]
    Gpt41Nano,
}

impl KnownModel {
    const ALL: [KnownModel; 5] = [
        KnownModel::Gpt4oMini,
        KnownModel::Gpt4o,
        KnownModel::Gpt41,
        KnownModel::Gpt41Mini,
        KnownModel::Gpt41Nano,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gpt4oMini => "gpt-4o-mini",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt41 => "gpt-4.1",
            KnownModel::Gpt41Mini => "gpt-4.1-mini",
            KnownModel::Gpt41Nano => "gpt-4.1-nano",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gpt4oMini)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .iter()
            .copied()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    /// Known identifiers parse to [`Model::Known`]; anything else is kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::Custom(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        Model::Custom(model.to_string())
    }
}
