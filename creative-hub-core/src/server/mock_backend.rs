//! Demo backend routes
//!
//! `POST /api/v1/{category}/generate` goes through the provider gateway, so a
//! configured live provider is tried first. `POST /api/v1/prompt/stream`
//! streams an optimized prompt as SSE frames.

use crate::models::ProviderCategory;
use crate::providers::mock::prompt_request;
use crate::providers::{GenerationRequest, StreamFrame};
use crate::server::api::{body_bytes, error_reply, json_reply, parse_body, with_state, ApiEnvelope};
use crate::server::state::AppState;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const FIRST_CHUNK_DELAY: Duration = Duration::from_millis(300);
const CHUNK_DELAY: Duration = Duration::from_millis(50);
const CHUNK_CHARS: usize = 20;

pub(crate) fn routes(state: AppState, limit: u64) -> BoxedFilter<(Response,)> {
    // POST /api/v1/prompt/stream
    let prompt_stream = warp::path!("api" / "v1" / "prompt" / "stream")
        .and(warp::post())
        .and(body_bytes(limit))
        .and_then(handle_prompt_stream);

    // POST /api/v1/:category/generate
    let generate = warp::path!("api" / "v1" / String / "generate")
        .and(warp::post())
        .and(body_bytes(limit))
        .and(with_state(state))
        .and_then(handle_generate);

    prompt_stream.or(generate).unify().boxed()
}

/// Accept either a forwarded `GenerationRequest` or a bare payload
fn generation_request(category: ProviderCategory, body: Value) -> GenerationRequest {
    if let (Some(operation), Some(payload)) = (
        body.get("operation").and_then(Value::as_str),
        body.get("payload"),
    ) {
        return GenerationRequest::new(category, operation, payload.clone());
    }
    GenerationRequest::new(category, "generate", body)
}

async fn handle_generate(
    category: String,
    body: Bytes,
    state: AppState,
) -> Result<Response, Rejection> {
    let category: ProviderCategory = match category.parse() {
        Ok(category) => category,
        Err(_) => return Err(warp::reject::not_found()),
    };
    let body: Value = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => return Ok(error_reply(&e)),
    };

    match state.gateway.generate(generation_request(category, body)).await {
        Ok(sourced) => {
            let (value, source, reason) = sourced.into_parts();
            let mut envelope = ApiEnvelope::ok(value).with_source(source);
            if let Some(reason) = reason {
                envelope = envelope.with_message(format!("fallback: {}", reason));
            }
            Ok(json_reply(&envelope, StatusCode::OK))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_prompt_stream(body: Bytes) -> Result<Response, Rejection> {
    let optimized = match parse_body::<Value>(&body).and_then(|payload| prompt_request(&payload)) {
        Ok(optimized) => optimized,
        Err(e) => return Ok(error_reply(&e)),
    };

    let metadata = json!({
        "tags": optimized.tags,
        "suggestions": optimized.suggestions,
        "notification": "提示词优化完成",
    });
    let frames = prompt_frames(split_chunks(&optimized.prompt, CHUNK_CHARS), metadata);
    let events = frames.map(|frame| warp::sse::Event::default().json_data(frame));
    Ok(warp::sse::reply(events).into_response())
}

/// Opening empty frame, the chunks after a short pause, then the closing frame
fn prompt_frames(chunks: Vec<String>, metadata: Value) -> impl Stream<Item = StreamFrame> + Send {
    let closing = if chunks.is_empty() {
        StreamFrame::failed("Stream error: empty prompt")
    } else {
        StreamFrame::finished(Some(metadata))
    };

    let opening = stream::once(async { StreamFrame::chunk("") });
    let body = stream::iter(chunks.into_iter().enumerate()).then(|(i, chunk)| async move {
        let delay = if i == 0 { FIRST_CHUNK_DELAY } else { CHUNK_DELAY };
        tokio::time::sleep(delay).await;
        StreamFrame::chunk(chunk)
    });
    opening.chain(body).chain(stream::once(async move { closing }))
}

fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks_counts_chars() {
        let chunks = split_chunks("一二三四五六七八九十abcdefghijklmnopqrstuvwxyz", 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 20);
        assert!(split_chunks("", 20).is_empty());
    }

    #[test]
    fn test_forwarded_request_keeps_operation() {
        let request = generation_request(
            ProviderCategory::Image,
            json!({"operation": "image_enhance", "payload": {"imageUrl": "x"}}),
        );
        assert_eq!(request.operation, "image_enhance");
        assert_eq!(request.payload, json!({"imageUrl": "x"}));

        let request = generation_request(ProviderCategory::Image, json!({"prompt": "cat"}));
        assert_eq!(request.operation, "generate");
        assert_eq!(request.payload["prompt"], "cat");
    }

    #[tokio::test]
    async fn test_generate_without_provider_is_fallback() {
        let routes = crate::server::create_api_routes(AppState::instant());
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/image/generate")
            .json(&json!({"prompt": "a red fox"}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["data"]["parameters"]["prompt"], "a red fox");
    }

    #[tokio::test]
    async fn test_missing_prompt_is_validation_error() {
        let routes = crate::server::create_api_routes(AppState::instant());
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/voice/generate")
            .json(&json!({}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 400);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "Missing required parameter: text");
        assert_eq!(body["errorKind"], "validation");
    }

    #[tokio::test]
    async fn test_stream_rejects_bad_type_before_streaming() {
        let routes = crate::server::create_api_routes(AppState::instant());
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/prompt/stream")
            .json(&json!({"type": "telepathy"}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 400);
    }
}
