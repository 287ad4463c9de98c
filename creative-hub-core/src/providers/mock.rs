//! In-process mock provider (the demo backend)
//!
//! Serves both the category-level `generate` operation behind
//! `/api/v1/{category}/generate` and the per-step operations used by
//! pipelines. Results are synthetic but shaped like real provider responses.

use crate::errors::{HubError, HubResult};
use crate::models::{ProviderCategory, StepKind};
use crate::providers::{GenerationProvider, GenerationRequest};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};

const DEMO_TRACKS: [&str; 4] = [
    "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3",
    "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-2.mp3",
    "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-3.mp3",
    "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-4.mp3",
];

const VOICE_PRESETS: [(&str, &str, &str, &str); 6] = [
    ("zh-female-1", "小美", "female", "zh"),
    ("zh-female-2", "小雅", "female", "zh"),
    ("zh-male-1", "小明", "male", "zh"),
    ("zh-male-2", "大伟", "male", "zh"),
    ("en-female-1", "Sarah", "female", "en"),
    ("en-male-1", "John", "male", "en"),
];

/// Result of prompt optimization
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedPrompt {
    pub prompt: String,
    pub tags: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Expand a prompt with style and quality keywords
pub fn optimize_prompt(input: &str) -> OptimizedPrompt {
    let styles = ["cinematic", "photorealistic"];
    let qualities = ["8K", "ultra-detailed"];
    let prompt = format!(
        "{}, {}, {}, perfect composition, professional lighting, sharp focus",
        input,
        styles.join(", "),
        qualities.join(", ")
    );
    let mut tags: Vec<String> = input
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .take(3)
        .map(str::to_string)
        .collect();
    tags.extend(styles.iter().map(|s| s.to_string()));

    OptimizedPrompt {
        prompt,
        tags,
        suggestions: vec![
            "Try adding specific lighting conditions like 'golden hour' or 'studio lighting'"
                .to_string(),
            "Include camera settings for more realistic results, e.g., '85mm f/1.4'".to_string(),
            "Add style references like 'cinematic' or 'editorial photography'".to_string(),
        ],
    }
}

/// Describe an image as a prompt
pub fn image_to_prompt() -> OptimizedPrompt {
    OptimizedPrompt {
        prompt: "A stunning visual composition featuring intricate details and masterful lighting. \
                 Professional photography style with impressionist and realistic elements. \
                 8K, ultra-detailed quality, perfect composition, sharp focus, rich colors"
            .to_string(),
        tags: vec![
            "impressionist".to_string(),
            "realistic".to_string(),
            "professional".to_string(),
            "detailed".to_string(),
        ],
        suggestions: vec![
            "Consider adding more specific subject matter description".to_string(),
            "Include lighting direction and quality for better results".to_string(),
            "Add mood or atmosphere keywords for enhanced generation".to_string(),
        ],
    }
}

/// Resolve a prompt request body (`{type, prompt}`) to an optimized prompt
pub fn prompt_request(payload: &Value) -> HubResult<OptimizedPrompt> {
    match payload.get("type").and_then(Value::as_str) {
        Some("optimize") => {
            let prompt = required_str(payload, "prompt", "Prompt is required for optimization")?;
            Ok(optimize_prompt(prompt))
        }
        Some("image_to_prompt") => Ok(image_to_prompt()),
        _ => Err(HubError::validation(
            "Invalid type. Must be 'optimize' or 'image_to_prompt'",
        )),
    }
}

fn required_str<'a>(payload: &'a Value, field: &str, message: &str) -> HubResult<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HubError::validation(message))
}

fn missing(field: &str) -> String {
    format!("Missing required parameter: {}", field)
}

fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000)
}

fn task_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Utc::now().timestamp_millis())
}

fn picsum(seed: impl std::fmt::Display) -> String {
    format!("https://picsum.photos/seed/{}/1024/1024", seed)
}

/// Mock implementation of every provider category
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }

    /// Category-level generation, validating required fields
    pub fn category_generate(&self, category: ProviderCategory, payload: &Value) -> HubResult<Value> {
        match category {
            ProviderCategory::Image => {
                let prompt = required_str(payload, "prompt", &missing("prompt"))?;
                let seed = payload
                    .get("seed")
                    .and_then(Value::as_u64)
                    .unwrap_or_else(|| u64::from(random_seed()));
                let model = payload
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or("stable-diffusion-xl");
                Ok(json!({
                    "images": [{ "url": picsum(seed), "seed": seed, "model": model }],
                    "taskId": task_id("img-task"),
                    "parameters": {
                        "prompt": prompt,
                        "width": payload.get("width").and_then(Value::as_u64).unwrap_or(1024),
                        "height": payload.get("height").and_then(Value::as_u64).unwrap_or(1024),
                        "style": payload.get("style").cloned().unwrap_or(Value::Null),
                        "model": model,
                        "seed": seed,
                        "steps": payload.get("steps").and_then(Value::as_u64).unwrap_or(30),
                        "cfgScale": payload.get("cfgScale").and_then(Value::as_f64).unwrap_or(7.5),
                    }
                }))
            }
            ProviderCategory::Video => {
                required_str(payload, "prompt", &missing("prompt"))?;
                Ok(json!({
                    "videoUrl": "https://www.w3schools.com/html/mov_bbb.mp4",
                    "taskId": task_id("video-task"),
                    "duration": payload.get("duration").and_then(Value::as_u64).unwrap_or(5),
                    "model": payload.get("model").and_then(Value::as_str).unwrap_or("kling-video"),
                    "parameters": {
                        "type": payload.get("type").and_then(Value::as_str).unwrap_or("text_to_video"),
                        "fps": payload.get("fps").and_then(Value::as_u64).unwrap_or(24),
                        "width": payload.get("width").and_then(Value::as_u64).unwrap_or(1024),
                        "height": payload.get("height").and_then(Value::as_u64).unwrap_or(576),
                        "style": payload.get("style").and_then(Value::as_str).unwrap_or("cinematic"),
                    }
                }))
            }
            ProviderCategory::Music => {
                let prompt = required_str(payload, "prompt", &missing("prompt"))?;
                let track = DEMO_TRACKS[rand::thread_rng().gen_range(0..DEMO_TRACKS.len())];
                let lyrics = payload.get("lyrics").and_then(Value::as_str);
                Ok(json!({
                    "audioUrl": track,
                    "taskId": task_id("music"),
                    "duration": payload.get("duration").and_then(Value::as_u64).unwrap_or(30),
                    "style": payload.get("style").and_then(Value::as_str).unwrap_or("pop"),
                    "instrumental": payload.get("instrumental").and_then(Value::as_bool).unwrap_or(true),
                    "metadata": {
                        "hasLyrics": lyrics.is_some(),
                        "lyrics": lyrics,
                        "prompt": prompt,
                    }
                }))
            }
            ProviderCategory::Voice => {
                let text = required_str(payload, "text", &missing("text"))?;
                let speed = payload.get("speed").and_then(Value::as_f64).unwrap_or(1.0);
                let voice_id = payload.get("voiceId").and_then(Value::as_str);
                let (id, name, gender, language) = VOICE_PRESETS
                    .iter()
                    .find(|v| Some(v.0) == voice_id)
                    .copied()
                    .unwrap_or(VOICE_PRESETS[0]);
                let words_per_minute = 150.0 * speed.max(0.1);
                let word_count = text.chars().count() as f64 / 2.0;
                let duration = ((word_count / words_per_minute) * 60.0).ceil() as u64;
                Ok(json!({
                    "audioUrl": DEMO_TRACKS[0],
                    "taskId": task_id("voice"),
                    "duration": duration,
                    "voice": { "id": id, "name": name, "gender": gender, "language": language },
                    "metadata": {
                        "speed": speed,
                        "pitch": payload.get("pitch").and_then(Value::as_f64).unwrap_or(1.0),
                        "emotion": payload.get("emotion").and_then(Value::as_str).unwrap_or("neutral"),
                    }
                }))
            }
            ProviderCategory::Prompt => {
                let result = prompt_request(payload)?;
                Ok(json!({
                    "prompt": result.prompt,
                    "tags": result.tags,
                    "suggestions": result.suggestions,
                }))
            }
        }
    }

    /// Output of one pipeline step
    pub fn step_output(&self, kind: StepKind, input: &Value) -> HubResult<Value> {
        let output = match kind {
            StepKind::PromptOptimize => {
                let prompt = required_str(input, "prompt", "Prompt is required")?;
                json!({
                    "optimizedPrompt": format!("{}, cinematic, professional, high quality", prompt),
                    "tags": ["cinematic", "professional"],
                })
            }
            StepKind::ImageGenerate => json!({
                "imageUrl": picsum(random_seed()),
                "seed": random_seed(),
            }),
            StepKind::ImageEnhance => json!({
                "enhancedUrl": input
                    .get("imageUrl")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| picsum(random_seed())),
                "enhancements": ["upscale", "color_correction"],
            }),
            StepKind::VideoGenerate => json!({
                "videoUrl": "https://example.com/demo-video.mp4",
                "duration": 5,
            }),
            StepKind::MusicGenerate => json!({
                "audioUrl": DEMO_TRACKS[0],
                "duration": 30,
            }),
            StepKind::VoiceSynthesis => json!({
                "audioUrl": DEMO_TRACKS[1],
                "duration": 10,
            }),
            StepKind::VideoMerge => json!({
                "finalUrl": "https://example.com/final-video.mp4",
                "duration": input.get("videoDuration").and_then(Value::as_u64).unwrap_or(30),
            }),
        };
        Ok(output)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> HubResult<Value> {
        if request.operation == "generate" {
            return self.category_generate(request.category, &request.payload);
        }
        let kind: StepKind = request
            .operation
            .parse()
            .map_err(|_| HubError::UnknownStepType(request.operation.clone()))?;
        self.step_output(kind, &request.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_optimize_step_keeps_prompt() {
        let output = MockProvider::new()
            .step_output(StepKind::PromptOptimize, &json!({"prompt": "cat"}))
            .unwrap();
        assert_eq!(
            output["optimizedPrompt"],
            "cat, cinematic, professional, high quality"
        );
    }

    #[test]
    fn test_image_enhance_reuses_upstream_image() {
        let output = MockProvider::new()
            .step_output(
                StepKind::ImageEnhance,
                &json!({"imageUrl": "https://example.com/a.png"}),
            )
            .unwrap();
        assert_eq!(output["enhancedUrl"], "https://example.com/a.png");
    }

    #[test]
    fn test_category_validation() {
        let mock = MockProvider::new();
        let err = mock
            .category_generate(ProviderCategory::Image, &json!({}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: prompt");

        let err = mock
            .category_generate(ProviderCategory::Voice, &json!({"prompt": "x"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: text");

        let err = mock
            .category_generate(ProviderCategory::Prompt, &json!({"type": "optimize"}))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_voice_duration_and_preset() {
        let output = MockProvider::new()
            .category_generate(
                ProviderCategory::Voice,
                &json!({"text": "你好世界你好世界", "voiceId": "en-male-1"}),
            )
            .unwrap();
        assert_eq!(output["voice"]["name"], "John");
        assert_eq!(output["duration"], 2);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let request = GenerationRequest::new(ProviderCategory::Image, "teleport", json!({}));
        let err = MockProvider::new().generate(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnknownStepType);
    }
}
