//! HTTP API server for pipelines, sessions and the stage registry
//!
//! Every JSON route answers with [`ApiEnvelope`]. Failures carry both a
//! human-readable `error` and a machine-readable `errorKind`.

use crate::errors::{ErrorKind, HubError, HubResult};
use crate::models::{
    stages, CreatePipelineRequest, ExecuteStepRequest, Pipeline, PipelineTemplate,
    RunPipelineRequest, StageId,
};
use crate::providers::ResultSource;
use crate::server::mock_backend;
use crate::server::state::AppState;
use crate::services::logging::log_error;
use crate::workflow::SessionSnapshot;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Response envelope shared by every JSON route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set on generation results: live provider or fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResultSource>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            message: None,
            source: None,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            message: None,
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_source(mut self, source: ResultSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
    pub pipelines: usize,
}

/// `data` of `GET /api/v1/workflow?action=templates`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateList {
    pub templates: Vec<PipelineTemplate>,
}

/// `data` of `GET /api/v1/workflow`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineList {
    pub workflows: Vec<Pipeline>,
}

/// Body for `POST /api/v1/sessions` and `.../start`
#[derive(Debug, Clone, Default, Deserialize)]
struct SeedRequest {
    #[serde(default)]
    seed: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JumpRequest {
    stage: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ModifyRequest {
    #[serde(default)]
    note: String,
}

/// Request body larger than the configured limit
#[derive(Debug)]
pub(crate) struct BodyTooLarge {
    limit: u64,
}

impl warp::reject::Reject for BodyTooLarge {}

pub(crate) fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Request body that could not be read off the connection
#[derive(Debug)]
pub(crate) struct BodyUnreadable {
    reason: String,
}

impl warp::reject::Reject for BodyUnreadable {}

/// Raw request body capped at `limit` bytes.
///
/// A declared `content-length` over the limit is rejected up front; chunked
/// bodies are counted as they arrive.
pub(crate) fn body_bytes(limit: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and(warp::body::stream())
        .and_then(move |length: Option<u64>, body| read_limited(length, body, limit))
}

async fn read_limited<S, B>(length: Option<u64>, body: S, limit: u64) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    if matches!(length, Some(length) if length > limit) {
        return Err(warp::reject::custom(BodyTooLarge { limit }));
    }

    futures_util::pin_mut!(body);
    let mut collected = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            warp::reject::custom(BodyUnreadable {
                reason: e.to_string(),
            })
        })?;
        if (collected.len() + chunk.remaining()) as u64 > limit {
            return Err(warp::reject::custom(BodyTooLarge { limit }));
        }
        collected.put(chunk);
    }
    Ok(collected.freeze())
}

/// Parse a JSON body; an empty body reads as `{}`
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> HubResult<T> {
    let raw: &[u8] = if body.iter().all(|b| b.is_ascii_whitespace()) {
        b"{}"
    } else {
        body.as_ref()
    };
    serde_json::from_slice(raw)
        .map_err(|e| HubError::validation(format!("Invalid JSON body: {}", e)))
}

pub(crate) fn json_reply<T: Serialize>(envelope: &ApiEnvelope<T>, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(envelope), status).into_response()
}

pub(crate) fn error_reply(error: &HubError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log_error(&error.to_string(), Some("api"));
    }
    json_reply(
        &ApiEnvelope::<()>::failure(error.kind(), error.to_string()),
        status,
    )
}

pub(crate) fn respond<T: Serialize>(result: HubResult<T>, status: StatusCode) -> Response {
    match result {
        Ok(data) => json_reply(&ApiEnvelope::ok(data), status),
        Err(e) => error_reply(&e),
    }
}

/// Create HTTP API routes
pub fn create_api_routes(state: AppState) -> BoxedFilter<(Response,)> {
    let limit = state.config.max_body_bytes;

    pipeline_routes(state.clone(), limit)
        .or(session_routes(state.clone(), limit))
        .unify()
        .or(registry_routes(state.clone()))
        .unify()
        .or(mock_backend::routes(state, limit))
        .unify()
        .recover(handle_rejection)
        .unify()
        .boxed()
}

fn pipeline_routes(state: AppState, limit: u64) -> BoxedFilter<(Response,)> {
    // GET /api/v1/workflow - list pipelines, or templates with ?action=templates
    let list = warp::path!("api" / "v1" / "workflow")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .and_then(handle_list_pipelines);

    // POST /api/v1/workflow - create from an optional template
    let create = warp::path!("api" / "v1" / "workflow")
        .and(warp::post())
        .and(body_bytes(limit))
        .and(with_state(state.clone()))
        .and_then(handle_create_pipeline);

    // GET /api/v1/workflow/:id
    let get = warp::path!("api" / "v1" / "workflow" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_get_pipeline);

    // POST /api/v1/workflow/:id - execute one step
    let execute = warp::path!("api" / "v1" / "workflow" / String)
        .and(warp::post())
        .and(body_bytes(limit))
        .and(with_state(state.clone()))
        .and_then(handle_execute_step);

    // PUT /api/v1/workflow/:id - run the remaining steps in the background
    let run = warp::path!("api" / "v1" / "workflow" / String)
        .and(warp::put())
        .and(body_bytes(limit))
        .and(with_state(state))
        .and_then(handle_run_pipeline);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(execute)
        .unify()
        .or(run)
        .unify()
        .boxed()
}

fn session_routes(state: AppState, limit: u64) -> BoxedFilter<(Response,)> {
    // POST /api/v1/sessions - create a session and run the story stage
    let start = warp::path!("api" / "v1" / "sessions")
        .and(warp::post())
        .and(body_bytes(limit))
        .and(with_state(state.clone()))
        .and_then(handle_start_session);

    let list = warp::path!("api" / "v1" / "sessions")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_list_sessions);

    let get = warp::path!("api" / "v1" / "sessions" / Uuid)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_get_session);

    let history = warp::path!("api" / "v1" / "sessions" / Uuid / "history")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_session_history);

    // POST /api/v1/sessions/:id/:action
    let action = warp::path!("api" / "v1" / "sessions" / Uuid / String)
        .and(warp::post())
        .and(body_bytes(limit))
        .and(with_state(state.clone()))
        .and_then(handle_session_action);

    let delete = warp::path!("api" / "v1" / "sessions" / Uuid)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(handle_delete_session);

    start
        .or(list)
        .unify()
        .or(get)
        .unify()
        .or(history)
        .unify()
        .or(action)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

fn registry_routes(state: AppState) -> BoxedFilter<(Response,)> {
    // GET /api/v1/stages - the fixed stage registry
    let get_stages = warp::path!("api" / "v1" / "stages")
        .and(warp::get())
        .map(|| json_reply(&ApiEnvelope::ok(stages()), StatusCode::OK));

    // GET /api/v1/health - Health check endpoint
    let get_health = warp::path!("api" / "v1" / "health")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_get_health);

    get_stages.or(get_health).unify().boxed()
}

/// Handle GET /api/v1/workflow
async fn handle_list_pipelines(
    query: HashMap<String, String>,
    state: AppState,
) -> Result<Response, Rejection> {
    if query.get("action").map(String::as_str) == Some("templates") {
        let templates = TemplateList {
            templates: state.pipelines.templates(),
        };
        return Ok(json_reply(&ApiEnvelope::ok(templates), StatusCode::OK));
    }
    let workflows = PipelineList {
        workflows: state.pipelines.list().await,
    };
    Ok(json_reply(&ApiEnvelope::ok(workflows), StatusCode::OK))
}

/// Handle POST /api/v1/workflow
async fn handle_create_pipeline(body: Bytes, state: AppState) -> Result<Response, Rejection> {
    let request: CreatePipelineRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return Ok(error_reply(&e)),
    };
    let pipeline = state.pipelines.create(request).await;
    Ok(json_reply(
        &ApiEnvelope::ok(pipeline).with_message("Workflow created"),
        StatusCode::CREATED,
    ))
}

/// Handle GET /api/v1/workflow/:id
async fn handle_get_pipeline(id: String, state: AppState) -> Result<Response, Rejection> {
    Ok(respond(state.pipelines.get(&id).await, StatusCode::OK))
}

/// Handle POST /api/v1/workflow/:id
async fn handle_execute_step(
    id: String,
    body: Bytes,
    state: AppState,
) -> Result<Response, Rejection> {
    let result = async {
        let request: ExecuteStepRequest = parse_body(&body)?;
        let input = request.input.unwrap_or_else(|| Value::Object(Default::default()));
        state.pipelines.execute_step(&id, &request.step, &input).await
    }
    .await;
    Ok(respond(result, StatusCode::OK))
}

/// Handle PUT /api/v1/workflow/:id
async fn handle_run_pipeline(id: String, body: Bytes, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        let request: RunPipelineRequest = parse_body(&body)?;
        let input = request.input.unwrap_or_else(|| Value::Object(Default::default()));
        state.pipelines.run(&id, input).await
    }
    .await;
    match result {
        Ok(ticket) => Ok(json_reply(
            &ApiEnvelope::ok(ticket).with_message("Workflow execution started"),
            StatusCode::ACCEPTED,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle POST /api/v1/sessions
async fn handle_start_session(body: Bytes, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        let request: SeedRequest = parse_body(&body)?;
        state.orchestrator.begin(&request.seed).await
    }
    .await;
    Ok(respond(result, StatusCode::CREATED))
}

async fn handle_list_sessions(state: AppState) -> Result<Response, Rejection> {
    let sessions = state.orchestrator.list().await;
    Ok(json_reply(&ApiEnvelope::ok(sessions), StatusCode::OK))
}

async fn handle_get_session(id: Uuid, state: AppState) -> Result<Response, Rejection> {
    Ok(respond(state.orchestrator.snapshot(id).await, StatusCode::OK))
}

async fn handle_session_history(id: Uuid, state: AppState) -> Result<Response, Rejection> {
    Ok(respond(state.orchestrator.history(id).await, StatusCode::OK))
}

/// Handle POST /api/v1/sessions/:id/:action
async fn handle_session_action(
    id: Uuid,
    action: String,
    body: Bytes,
    state: AppState,
) -> Result<Response, Rejection> {
    let result = run_session_action(&state, id, &action, &body).await;
    Ok(respond(result, StatusCode::OK))
}

async fn run_session_action(
    state: &AppState,
    id: Uuid,
    action: &str,
    body: &Bytes,
) -> HubResult<SessionSnapshot> {
    let orchestrator = &state.orchestrator;
    match action {
        "start" => {
            let request: SeedRequest = parse_body(body)?;
            orchestrator.start(id, &request.seed).await
        }
        "execute" => orchestrator.execute_current(id).await,
        "confirm" => orchestrator.confirm(id).await,
        "advance" => orchestrator.advance(id).await,
        "retreat" => orchestrator.retreat(id).await,
        "jump" => {
            let request: JumpRequest = parse_body(body)?;
            let stage: StageId = request.stage.parse().map_err(HubError::Validation)?;
            orchestrator.jump_to(id, stage).await
        }
        "modify" => {
            let request: ModifyRequest = parse_body(body)?;
            orchestrator.modify(id, &request.note).await
        }
        "retry" => orchestrator.retry(id).await,
        "cancel" => orchestrator.cancel(id).await,
        "reset" => orchestrator.reset(id).await,
        "complete" => orchestrator.complete(id).await,
        other => Err(HubError::not_found("Session action", other)),
    }
}

/// Handle DELETE /api/v1/sessions/:id
async fn handle_delete_session(id: Uuid, state: AppState) -> Result<Response, Rejection> {
    let result = if state.orchestrator.remove(id).await {
        Ok(serde_json::json!({ "id": id, "deleted": true }))
    } else {
        Err(HubError::not_found("Session", id.to_string()))
    };
    Ok(respond(result, StatusCode::OK))
}

/// Handle GET /api/v1/health
async fn handle_get_health(state: AppState) -> Result<Response, Rejection> {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.orchestrator.len(),
        pipelines: state.pipelines.list().await.len(),
    };
    Ok(json_reply(&ApiEnvelope::ok(response), StatusCode::OK))
}

/// Turn unmatched routes and filter failures into error envelopes
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, kind, message) = if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound,
            "Route not found".to_string(),
        )
    } else if let Some(too_large) = err.find::<BodyTooLarge>() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Validation,
            format!("Request body exceeds {} bytes", too_large.limit),
        )
    } else if let Some(unreadable) = err.find::<BodyUnreadable>() {
        (
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            format!("Failed to read request body: {}", unreadable.reason),
        )
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, ErrorKind::Validation, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Validation,
            "Method not allowed".to_string(),
        )
    } else {
        log_error(&format!("{:?}", err), Some("unhandled rejection"));
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal,
            "Internal server error".to_string(),
        )
    };

    Ok(json_reply(&ApiEnvelope::<()>::failure(kind, message), status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let ok = serde_json::to_value(ApiEnvelope::ok(1)).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "data": 1}));

        let failed = serde_json::to_value(ApiEnvelope::<()>::failure(
            ErrorKind::UnknownStepType,
            "Unknown step type: teleport",
        ))
        .unwrap();
        assert_eq!(failed["errorKind"], "unknown_step_type");
        assert!(failed.get("data").is_none());
    }

    fn decode<T: DeserializeOwned>(raw: &str) -> ApiEnvelope<T> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_envelope_decodes_without_default_payload() {
        // Pipeline has no Default impl
        let failed: ApiEnvelope<Pipeline> =
            decode(r#"{"success": false, "error": "Workflow not found: x", "errorKind": "not_found"}"#);
        assert!(failed.data.is_none());
        assert_eq!(failed.error_kind, Some(ErrorKind::NotFound));

        let list: ApiEnvelope<PipelineList> = decode(r#"{"success": true, "data": {"workflows": []}}"#);
        assert!(list.data.unwrap().workflows.is_empty());
    }

    #[test]
    fn test_parse_body() {
        let empty: SeedRequest = parse_body(&Bytes::new()).unwrap();
        assert!(empty.seed.is_empty());

        let err = parse_body::<SeedRequest>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_health_and_stages() {
        let routes = create_api_routes(AppState::instant());

        let response = warp::test::request()
            .method("GET")
            .path("/api/v1/health")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);

        let response = warp::test::request()
            .method("GET")
            .path("/api/v1/stages")
            .reply(&routes)
            .await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec!["story", "script", "config", "character", "storyboard", "edit"]
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found_envelope() {
        let routes = create_api_routes(AppState::instant());
        let response = warp::test::request()
            .method("GET")
            .path("/api/v1/nothing-here")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 404);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errorKind"], "not_found");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let state = AppState::instant();
        let limit = state.config.max_body_bytes as usize;
        let routes = create_api_routes(state);
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/workflow")
            .body(vec![b' '; limit + 1])
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 413);
    }
}
