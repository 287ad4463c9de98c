//! Simulated stage executor
//!
//! Waits a random delay within the configured range, then derives each stage
//! from the seed and the upstream outputs. Content is fixed in shape, not in
//! value.

use crate::errors::{HubError, HubResult};
use crate::models::{
    AssetStatus, CharacterSheet, EditPlan, ExecutorSettings, GeneratedScene, ProductionConfig,
    Scene, ScriptOutput, StageId, StageOutput, StoryOutline, StoryboardOutput,
};
use crate::workflow::cancellation::CancellationToken;
use crate::workflow::executor::StageExecutor;
use crate::workflow::session::UpstreamData;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

const DEFAULT_ACTS: [&str; 3] = [
    "第一幕：故事开始，主角登场，背景铺垫",
    "第二幕：冲突展开，矛盾升级，转折出现",
    "第三幕：高潮对决，问题解决，结局收尾",
];

/// Executor that fabricates stage outputs after a delay
#[derive(Debug, Clone)]
pub struct SimulatedStageExecutor {
    min_delay: Duration,
    max_delay: Duration,
}

impl SimulatedStageExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        let min = settings.min_delay_ms.min(settings.max_delay_ms);
        Self {
            min_delay: Duration::from_millis(min),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// No delay at all
    pub fn instant() -> Self {
        Self::new(&ExecutorSettings::instant())
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let ms = rand::thread_rng()
            .gen_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

impl Default for SimulatedStageExecutor {
    fn default() -> Self {
        Self::new(&ExecutorSettings::default())
    }
}

#[async_trait]
impl StageExecutor for SimulatedStageExecutor {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(
        &self,
        stage: StageId,
        input: &UpstreamData,
        token: &CancellationToken,
    ) -> HubResult<StageOutput> {
        let delay = self.pick_delay();
        tokio::select! {
            _ = token.cancelled() => {
                let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
                return Err(HubError::Cancelled(format!("stage '{}': {}", stage, reason)));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        Ok(build_output(stage, input))
    }
}

/// Derive `stage`'s output from upstream data
pub fn build_output(stage: StageId, input: &UpstreamData) -> StageOutput {
    let note = input.modification.as_deref();
    match stage {
        StageId::Story => StageOutput::Story(build_story(input, note)),
        StageId::Script => StageOutput::Script(build_script(input, note)),
        StageId::Config => StageOutput::Config(build_config(note)),
        StageId::Character => StageOutput::Character(build_characters(input)),
        StageId::Storyboard => StageOutput::Storyboard(build_storyboard(input)),
        StageId::Edit => StageOutput::Edit(build_edit(input, note)),
    }
}

fn with_note(text: &str, note: Option<&str>) -> String {
    match note {
        Some(note) => format!("{}（{}）", text, note),
        None => text.to_string(),
    }
}

fn build_story(input: &UpstreamData, note: Option<&str>) -> StoryOutline {
    let title: String = input.seed.chars().take(16).collect();
    StoryOutline {
        title,
        outline: input.seed.clone(),
        acts: DEFAULT_ACTS.iter().map(|act| with_note(act, note)).collect(),
        characters: vec!["主角".to_string(), "伙伴".to_string()],
        setting: with_note("根据故事构思设定场景", note),
    }
}

fn story_acts(input: &UpstreamData) -> Vec<String> {
    input
        .output(StageId::Story)
        .and_then(StageOutput::as_story)
        .map(|story| story.acts.clone())
        .unwrap_or_else(|| DEFAULT_ACTS.iter().map(|a| a.to_string()).collect())
}

fn build_script(input: &UpstreamData, note: Option<&str>) -> ScriptOutput {
    let scenes = story_acts(input)
        .iter()
        .enumerate()
        .map(|(i, act)| Scene {
            id: format!("scene-{}", i + 1),
            description: act.clone(),
            narration: with_note(&format!("旁白：{}", act), note),
            visual_description: format!("画面：{}", act),
            duration_seconds: 10,
        })
        .collect();
    ScriptOutput { scenes }
}

fn build_config(note: Option<&str>) -> ProductionConfig {
    ProductionConfig {
        aspect_ratio: "16:9".to_string(),
        resolution: "1080p".to_string(),
        style: with_note("cinematic", note),
        frame_rate: 24,
        recommended_model: "jimeng".to_string(),
        fallback_models: vec!["kling".to_string(), "vidu".to_string()],
    }
}

fn image_url(seed: u32, size: u32) -> String {
    format!("https://picsum.photos/seed/{}/{}/{}", seed, size, size)
}

fn build_characters(input: &UpstreamData) -> CharacterSheet {
    let count = input
        .output(StageId::Story)
        .and_then(StageOutput::as_story)
        .map(|story| story.characters.len().max(1))
        .unwrap_or(1);
    let mut rng = rand::thread_rng();
    CharacterSheet {
        reference_images: (0..count)
            .map(|_| image_url(rng.gen_range(0..1_000_000), 512))
            .collect(),
        views: vec!["front".to_string(), "side".to_string(), "back".to_string()],
    }
}

fn build_storyboard(input: &UpstreamData) -> StoryboardOutput {
    let scene_ids: Vec<String> = input
        .output(StageId::Script)
        .and_then(StageOutput::as_script)
        .map(|script| script.scenes.iter().map(|s| s.id.clone()).collect())
        .unwrap_or_else(|| (1..=3).map(|i| format!("scene-{}", i)).collect());
    let mut rng = rand::thread_rng();
    StoryboardOutput {
        generated_scenes: scene_ids
            .into_iter()
            .map(|id| GeneratedScene {
                image_url: Some(image_url(rng.gen_range(0..1_000_000), 1024)),
                video_url: Some(format!("https://example.com/{}.mp4", id)),
                id,
                status: AssetStatus::Completed,
            })
            .collect(),
    }
}

fn build_edit(input: &UpstreamData, note: Option<&str>) -> EditPlan {
    let sequence: Vec<String> = input
        .output(StageId::Storyboard)
        .and_then(StageOutput::as_storyboard)
        .map(|board| board.generated_scenes.iter().map(|s| s.id.clone()).collect())
        .unwrap_or_default();
    let transitions = (1..sequence.len())
        .map(|i| if i % 2 == 0 { "硬切" } else { "淡入淡出" }.to_string())
        .collect();
    let mut music_suggestions = vec!["轻柔钢琴".to_string(), "史诗管弦".to_string()];
    if let Some(note) = note {
        music_suggestions.push(note.to_string());
    }
    EditPlan {
        sequence,
        transitions,
        music_suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_story_keeps_seed_as_outline() {
        let executor = SimulatedStageExecutor::instant();
        let seed = "一个少年在森林中发现了一只会说话的狐狸";
        let output = executor
            .execute(StageId::Story, &UpstreamData::new(seed), &CancellationToken::new())
            .await
            .unwrap();
        let story = output.as_story().unwrap();
        assert_eq!(story.outline, seed);
        assert_eq!(story.acts.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let executor = SimulatedStageExecutor::new(&ExecutorSettings {
            min_delay_ms: 5_000,
            max_delay_ms: 5_000,
            step_delay_ms: 0,
        });
        let token = CancellationToken::new();
        token.cancel("reset");

        let err = executor
            .execute(StageId::Script, &UpstreamData::new("idea"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Cancelled);
    }

    #[test]
    fn test_downstream_stages_follow_upstream() {
        let mut input = UpstreamData::new("idea");
        input
            .outputs
            .insert(StageId::Story, build_output(StageId::Story, &input));
        let script = build_output(StageId::Script, &input);
        assert_eq!(script.as_script().unwrap().scenes.len(), 3);

        input.outputs.insert(StageId::Script, script);
        let board = build_output(StageId::Storyboard, &input);
        input.outputs.insert(StageId::Storyboard, board);

        let edit = build_output(StageId::Edit, &input);
        let plan = edit.as_edit().unwrap();
        assert_eq!(plan.sequence, vec!["scene-1", "scene-2", "scene-3"]);
        assert_eq!(plan.transitions.len(), 2);
    }

    #[test]
    fn test_modification_note_is_folded_in() {
        let mut input = UpstreamData::new("idea");
        input.modification = Some("更温馨".to_string());
        let story = build_output(StageId::Story, &input);
        assert!(story.as_story().unwrap().acts[0].contains("更温馨"));
        assert_eq!(story.as_story().unwrap().outline, "idea");
    }
}
