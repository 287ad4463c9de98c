//! Stage output shapes
//!
//! A stage's output is either absent or one complete [`StageOutput`] value;
//! the variant always matches the stage that produced it.

use crate::models::StageId;
use serde::{Deserialize, Serialize};

/// Output of a single stage, tagged by stage on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Story(StoryOutline),
    Script(ScriptOutput),
    Config(ProductionConfig),
    Character(CharacterSheet),
    Storyboard(StoryboardOutput),
    Edit(EditPlan),
}

impl StageOutput {
    /// Stage this output belongs to
    pub fn stage(&self) -> StageId {
        match self {
            Self::Story(_) => StageId::Story,
            Self::Script(_) => StageId::Script,
            Self::Config(_) => StageId::Config,
            Self::Character(_) => StageId::Character,
            Self::Storyboard(_) => StageId::Storyboard,
            Self::Edit(_) => StageId::Edit,
        }
    }

    pub fn as_story(&self) -> Option<&StoryOutline> {
        match self {
            Self::Story(story) => Some(story),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&ScriptOutput> {
        match self {
            Self::Script(script) => Some(script),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&ProductionConfig> {
        match self {
            Self::Config(config) => Some(config),
            _ => None,
        }
    }

    pub fn as_character(&self) -> Option<&CharacterSheet> {
        match self {
            Self::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn as_storyboard(&self) -> Option<&StoryboardOutput> {
        match self {
            Self::Storyboard(storyboard) => Some(storyboard),
            _ => None,
        }
    }

    pub fn as_edit(&self) -> Option<&EditPlan> {
        match self {
            Self::Edit(edit) => Some(edit),
            _ => None,
        }
    }
}

/// Three-act outline expanded from the seed idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOutline {
    pub title: String,
    /// The seed idea, verbatim
    pub outline: String,
    pub acts: Vec<String>,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub setting: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutput {
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub description: String,
    pub narration: String,
    pub visual_description: String,
    pub duration_seconds: u32,
}

/// Production settings recommended for the piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionConfig {
    pub aspect_ratio: String,
    pub resolution: String,
    pub style: String,
    pub frame_rate: u32,
    pub recommended_model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSheet {
    pub reference_images: Vec<String>,
    pub views: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardOutput {
    pub generated_scenes: Vec<GeneratedScene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedScene {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub status: AssetStatus,
}

/// Generation state of a storyboard asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// Final cut suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPlan {
    pub sequence: Vec<String>,
    pub transitions: Vec<String>,
    pub music_suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_tagged_by_stage() {
        let output = StageOutput::Story(StoryOutline {
            title: "狐狸".to_string(),
            outline: "idea".to_string(),
            acts: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            characters: vec![],
            setting: String::new(),
        });
        assert_eq!(output.stage(), StageId::Story);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["stage"], "story");
        assert_eq!(json["acts"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_config_uses_camel_case() {
        let output = StageOutput::Config(ProductionConfig {
            aspect_ratio: "16:9".to_string(),
            resolution: "1080p".to_string(),
            style: "cinematic".to_string(),
            frame_rate: 24,
            recommended_model: "jimeng".to_string(),
            fallback_models: vec!["kling".to_string()],
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["aspectRatio"], "16:9");
        assert_eq!(json["frameRate"], 24);
        assert_eq!(json["recommendedModel"], "jimeng");

        let parsed: StageOutput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.as_config().map(|c| c.frame_rate), Some(24));
    }
}
