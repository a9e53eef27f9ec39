use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use super::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    /// Fallback order used when the selected model has to be replaced.
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini];

    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            _ => Err(ParseError::UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentMode {
    #[default]
    VisionEnhanced,
    TextOnly,
}

impl AgentMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::VisionEnhanced => "vision-enhanced",
            Self::TextOnly => "text-only",
        }
    }

    pub fn accepts(self, model: SupportedModel) -> bool {
        match self {
            Self::VisionEnhanced => model.has_vision(),
            Self::TextOnly => true,
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgentMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "vision-enhanced" | "VisionEnhanced" => Ok(Self::VisionEnhanced),
            "text-only" | "TextOnly" => Ok(Self::TextOnly),
            _ => Err(ParseError::UnknownAgentMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedModel {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "claude-3-5-sonnet-20240620")]
    Claude35Sonnet,
    #[serde(rename = "claude-3-opus-20240229")]
    Claude3Opus,
    #[serde(rename = "claude-3-haiku-20240307")]
    Claude3Haiku,
    #[serde(rename = "gemini-1.5-pro")]
    Gemini15Pro,
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,
    #[serde(rename = "gemini-1.0-pro")]
    Gemini10Pro,
}

impl SupportedModel {
    /// Catalog order. Within a provider, earlier entries are preferred.
    pub const ALL: [SupportedModel; 10] = [
        SupportedModel::Gpt4o,
        SupportedModel::Gpt4Turbo,
        SupportedModel::Gpt4oMini,
        SupportedModel::Gpt35Turbo,
        SupportedModel::Claude35Sonnet,
        SupportedModel::Claude3Opus,
        SupportedModel::Claude3Haiku,
        SupportedModel::Gemini15Pro,
        SupportedModel::Gemini15Flash,
        SupportedModel::Gemini10Pro,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
            Self::Claude35Sonnet => "claude-3-5-sonnet-20240620",
            Self::Claude3Opus => "claude-3-opus-20240229",
            Self::Claude3Haiku => "claude-3-haiku-20240307",
            Self::Gemini15Pro => "gemini-1.5-pro",
            Self::Gemini15Flash => "gemini-1.5-flash",
            Self::Gemini10Pro => "gemini-1.0-pro",
        }
    }

    pub fn provider(self) -> Provider {
        match self {
            Self::Gpt4o | Self::Gpt4Turbo | Self::Gpt4oMini | Self::Gpt35Turbo => Provider::OpenAi,
            Self::Claude35Sonnet | Self::Claude3Opus | Self::Claude3Haiku => Provider::Anthropic,
            Self::Gemini15Pro | Self::Gemini15Flash | Self::Gemini10Pro => Provider::Gemini,
        }
    }

    pub fn has_vision(self) -> bool {
        !matches!(self, Self::Gpt35Turbo | Self::Gemini10Pro)
    }
}

impl fmt::Display for SupportedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SupportedModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|model| model.id() == wanted)
            .ok_or_else(|| ParseError::UnknownModel(s.to_string()))
    }
}

/// Re-validates a model selection against the agent mode and the keys on hand.
///
/// A usable candidate comes back unchanged. Otherwise the first usable model of
/// the candidate's own provider wins, then the first usable model over
/// [`Provider::ALL`], each in [`SupportedModel::ALL`] order. With no key at all
/// the result is `None`.
pub fn find_best_matching_model(
    candidate: Option<SupportedModel>,
    agent_mode: AgentMode,
    openai_key: &str,
    anthropic_key: &str,
    gemini_key: &str,
) -> Option<SupportedModel> {
    let has_key = |provider: Provider| match provider {
        Provider::OpenAi => !openai_key.is_empty(),
        Provider::Anthropic => !anthropic_key.is_empty(),
        Provider::Gemini => !gemini_key.is_empty(),
    };
    let usable = |model: SupportedModel| has_key(model.provider()) && agent_mode.accepts(model);

    if let Some(model) = candidate.filter(|model| usable(*model)) {
        return Some(model);
    }

    candidate
        .map(SupportedModel::provider)
        .into_iter()
        .chain(Provider::ALL)
        .flat_map(|provider| {
            SupportedModel::ALL
                .into_iter()
                .filter(move |model| model.provider() == provider)
        })
        .find(|model| usable(*model))
}
