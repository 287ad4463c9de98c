//! Provider catalog: categories, auth schemes and the built-in provider list

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generation category served by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Image,
    Video,
    Music,
    Voice,
    Prompt,
}

impl ProviderCategory {
    pub const ALL: [ProviderCategory; 5] = [
        ProviderCategory::Image,
        ProviderCategory::Video,
        ProviderCategory::Music,
        ProviderCategory::Voice,
        ProviderCategory::Prompt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Music => "music",
            Self::Voice => "voice",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "music" => Ok(Self::Music),
            "voice" => Ok(Self::Voice),
            "prompt" => Ok(Self::Prompt),
            other => Err(format!("Unknown provider category '{}'", other)),
        }
    }
}

/// How a provider expects its API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>` plus `anthropic-version`
    XApiKey,
    /// `xi-api-key: <key>`
    XiApiKey,
}

impl AuthScheme {
    /// Header name/value pairs carrying the key
    pub fn headers(self, api_key: &str) -> Vec<(&'static str, String)> {
        match self {
            Self::Bearer => vec![("Authorization", format!("Bearer {}", api_key))],
            Self::XApiKey => vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", "2023-06-01".to_string()),
            ],
            Self::XiApiKey => vec![("xi-api-key", api_key.to_string())],
        }
    }
}

/// Static description of a provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub category: ProviderCategory,
    pub base_url: &'static str,
    pub auth: AuthScheme,
}

static CATALOG: [ProviderDefinition; 11] = [
    ProviderDefinition {
        id: "openai-dalle",
        name: "OpenAI DALL-E",
        category: ProviderCategory::Image,
        base_url: "https://api.openai.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "stability-ai",
        name: "Stability AI",
        category: ProviderCategory::Image,
        base_url: "https://api.stability.ai/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "kling-video",
        name: "Kling AI",
        category: ProviderCategory::Video,
        base_url: "https://api.klingai.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "runway",
        name: "Runway Gen-3",
        category: ProviderCategory::Video,
        base_url: "https://api.runwayml.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "suno",
        name: "Suno AI",
        category: ProviderCategory::Music,
        base_url: "https://api.suno.ai/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "elevenlabs",
        name: "ElevenLabs",
        category: ProviderCategory::Voice,
        base_url: "https://api.elevenlabs.io/v1",
        auth: AuthScheme::XiApiKey,
    },
    ProviderDefinition {
        id: "openai-tts",
        name: "OpenAI TTS",
        category: ProviderCategory::Voice,
        base_url: "https://api.openai.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "openai-gpt",
        name: "OpenAI GPT-4",
        category: ProviderCategory::Prompt,
        base_url: "https://api.openai.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "anthropic-claude",
        name: "Anthropic Claude",
        category: ProviderCategory::Prompt,
        base_url: "https://api.anthropic.com/v1",
        auth: AuthScheme::XApiKey,
    },
    ProviderDefinition {
        id: "deepseek",
        name: "DeepSeek",
        category: ProviderCategory::Prompt,
        base_url: "https://api.deepseek.com/v1",
        auth: AuthScheme::Bearer,
    },
    ProviderDefinition {
        id: "moonshot",
        name: "Moonshot (Kimi)",
        category: ProviderCategory::Prompt,
        base_url: "https://api.moonshot.cn/v1",
        auth: AuthScheme::Bearer,
    },
];

/// Every built-in provider
pub fn provider_catalog() -> &'static [ProviderDefinition] {
    &CATALOG
}

pub fn find_provider(id: &str) -> Option<&'static ProviderDefinition> {
    CATALOG.iter().find(|p| p.id == id)
}
