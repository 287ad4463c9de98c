//! Step pipeline data models (the `/workflow` HTTP resource)

use crate::models::ProviderCategory;
use crate::providers::ResultSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in step types with a registered executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    PromptOptimize,
    ImageGenerate,
    ImageEnhance,
    VideoGenerate,
    MusicGenerate,
    VoiceSynthesis,
    VideoMerge,
}

impl StepKind {
    pub const ALL: [StepKind; 7] = [
        StepKind::PromptOptimize,
        StepKind::ImageGenerate,
        StepKind::ImageEnhance,
        StepKind::VideoGenerate,
        StepKind::MusicGenerate,
        StepKind::VoiceSynthesis,
        StepKind::VideoMerge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromptOptimize => "prompt_optimize",
            Self::ImageGenerate => "image_generate",
            Self::ImageEnhance => "image_enhance",
            Self::VideoGenerate => "video_generate",
            Self::MusicGenerate => "music_generate",
            Self::VoiceSynthesis => "voice_synthesis",
            Self::VideoMerge => "video_merge",
        }
    }

    /// Human-readable step name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::PromptOptimize => "Optimize Prompt",
            Self::ImageGenerate => "Generate Image",
            Self::ImageEnhance => "Enhance Image",
            Self::VideoGenerate => "Generate Video",
            Self::MusicGenerate => "Generate Music",
            Self::VoiceSynthesis => "Synthesize Voice",
            Self::VideoMerge => "Merge Video & Audio",
        }
    }

    /// Provider category that serves this step
    pub fn category(self) -> ProviderCategory {
        match self {
            Self::PromptOptimize => ProviderCategory::Prompt,
            Self::ImageGenerate | Self::ImageEnhance => ProviderCategory::Image,
            Self::VideoGenerate | Self::VideoMerge => ProviderCategory::Video,
            Self::MusicGenerate => ProviderCategory::Music,
            Self::VoiceSynthesis => ProviderCategory::Voice,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown step type '{}'", s))
    }
}

/// Display name for a step type string; unknown types keep their raw name
pub fn step_display_name(step_type: &str) -> String {
    step_type
        .parse::<StepKind>()
        .map(|kind| kind.display_name().to_string())
        .unwrap_or_else(|_| step_type.to_string())
}

/// Named, ordered list of step types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step type strings, executed in order
    pub steps: Vec<String>,
}

/// Templates shipped with the hub
pub fn builtin_templates() -> Vec<PipelineTemplate> {
    let template = |id: &str, name: &str, description: &str, steps: &[StepKind]| PipelineTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        steps: steps.iter().map(|s| s.as_str().to_string()).collect(),
    };

    vec![
        template(
            "image-pipeline",
            "Image Generation Pipeline",
            "Generate an image from text prompt, then optimize and enhance it",
            &[
                StepKind::PromptOptimize,
                StepKind::ImageGenerate,
                StepKind::ImageEnhance,
            ],
        ),
        template(
            "video-creation",
            "Video Creation Pipeline",
            "Create a video from text prompt with background music",
            &[
                StepKind::PromptOptimize,
                StepKind::VideoGenerate,
                StepKind::MusicGenerate,
                StepKind::VideoMerge,
            ],
        ),
        template(
            "content-package",
            "Content Package Generator",
            "Generate complete content package: image, voice narration, and background music",
            &[
                StepKind::PromptOptimize,
                StepKind::ImageGenerate,
                StepKind::VoiceSynthesis,
                StepKind::MusicGenerate,
            ],
        ),
    ]
}

/// Pipeline-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Draft,
    Active,
    Completed,
    Failed,
}

/// Step-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One step of a pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// `step-1`, `step-2`, ...
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Whether the output came from the live provider or the fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResultSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineStep {
    pub fn new(position: usize, step_type: impl Into<String>) -> Self {
        let step_type = step_type.into();
        Self {
            id: format!("step-{}", position + 1),
            name: step_display_name(&step_type),
            step_type,
            config: serde_json::Map::new(),
            status: StepStatus::Pending,
            output: None,
            source: None,
            error: None,
        }
    }
}

/// A pipeline instance created from an optional template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<PipelineStep>,
    pub status: PipelineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Index of the step whose id or type matches `step_ref`
    pub fn find_step(&self, step_ref: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.id == step_ref || s.step_type == step_ref)
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }
}

/// Request body for `POST /workflow`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipelineRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Request body for `POST /workflow/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteStepRequest {
    pub step: String,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

/// Request body for `PUT /workflow/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunPipelineRequest {
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

/// Result of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub step: String,
    pub output: serde_json::Value,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    pub workflow_complete: bool,
}

/// Envelope returned when a whole pipeline run is started
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunTicket {
    pub task_id: String,
    pub status: String,
    pub workflow_id: String,
    pub total_steps: usize,
}
