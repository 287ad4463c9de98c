//! `/api/v1/sessions` routes

use creative_hub_core::server::{create_api_routes, AppState};
use serde_json::{json, Value};
use warp::filters::BoxedFilter;
use warp::reply::Response;

const SEED: &str = "一个少年在森林中发现了一只会说话的狐狸";

async fn post(routes: &BoxedFilter<(Response,)>, path: &str, body: Value) -> (u16, Value) {
    let response = warp::test::request()
        .method("POST")
        .path(path)
        .json(&body)
        .reply(routes)
        .await;
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    (response.status().as_u16(), body)
}

async fn get(routes: &BoxedFilter<(Response,)>, path: &str) -> (u16, Value) {
    let response = warp::test::request()
        .method("GET")
        .path(path)
        .reply(routes)
        .await;
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    (response.status().as_u16(), body)
}

async fn start(routes: &BoxedFilter<(Response,)>) -> String {
    let (status, body) = post(routes, "/api/v1/sessions", json!({ "seed": SEED })).await;
    assert_eq!(status, 201);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_start_session_runs_story() {
    let routes = create_api_routes(AppState::instant());
    let (status, body) = post(&routes, "/api/v1/sessions", json!({ "seed": SEED })).await;

    assert_eq!(status, 201);
    let session = &body["data"];
    assert_eq!(session["currentStage"], "story");
    assert_eq!(session["seed"], SEED);
    assert_eq!(session["outputs"]["story"]["outline"], SEED);
    assert_eq!(session["outputs"]["story"]["acts"].as_array().unwrap().len(), 3);
    assert_eq!(session["statuses"]["story"], "completed");
    assert_eq!(session["stageLoading"], false);
}

#[tokio::test]
async fn test_start_without_seed_is_400() {
    let routes = create_api_routes(AppState::instant());
    let (status, body) = post(&routes, "/api/v1/sessions", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["errorKind"], "validation");
}

#[tokio::test]
async fn test_navigation_actions() {
    let routes = create_api_routes(AppState::instant());
    let id = start(&routes).await;
    let action = |name: &str| format!("/api/v1/sessions/{}/{}", id, name);

    let (status, body) = post(&routes, &action("confirm"), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["currentStage"], "script");
    assert!(body["data"]["outputs"]["script"]["scenes"].is_array());

    let (status, body) = post(&routes, &action("jump"), json!({ "stage": "edit" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["errorKind"], "invalid_transition");

    let (status, body) = post(&routes, &action("jump"), json!({ "stage": "teleport" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["errorKind"], "validation");

    let (_, body) = post(&routes, &action("retreat"), json!({})).await;
    assert_eq!(body["data"]["currentStage"], "story");

    let (_, body) = post(&routes, &action("advance"), json!({})).await;
    assert_eq!(body["data"]["currentStage"], "script");

    let (_, body) = post(&routes, &action("jump"), json!({ "stage": "story" })).await;
    assert_eq!(body["data"]["currentStage"], "story");

    let (status, body) = post(&routes, &action("teleport"), json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["errorKind"], "not_found");
}

#[tokio::test]
async fn test_modify_and_reset() {
    let routes = create_api_routes(AppState::instant());
    let id = start(&routes).await;
    let action = |name: &str| format!("/api/v1/sessions/{}/{}", id, name);

    post(&routes, &action("confirm"), json!({})).await;
    post(&routes, &action("retreat"), json!({})).await;

    let (status, body) = post(&routes, &action("modify"), json!({ "note": "更温馨一些" })).await;
    assert_eq!(status, 200);
    let outputs = body["data"]["outputs"].as_object().unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(body["data"]["outputs"]["story"]["setting"]
        .as_str()
        .unwrap()
        .contains("更温馨一些"));

    let (status, _) = post(&routes, &action("modify"), json!({})).await;
    assert_eq!(status, 400);

    let (_, body) = post(&routes, &action("reset"), json!({})).await;
    assert_eq!(body["data"]["currentStage"], "story");
    assert!(body["data"].get("seed").map_or(true, Value::is_null));
    assert!(body["data"]["outputs"].as_object().unwrap().is_empty());

    // a reset session can be started again in place
    let (status, body) = post(&routes, &action("start"), json!({ "seed": "新的构思" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outputs"]["story"]["outline"], "新的构思");
}

#[tokio::test]
async fn test_full_walk_and_complete() {
    let routes = create_api_routes(AppState::instant());
    let id = start(&routes).await;
    let action = |name: &str| format!("/api/v1/sessions/{}/{}", id, name);

    let (status, _) = post(&routes, &action("complete"), json!({})).await;
    assert_eq!(status, 409);

    for _ in 0..5 {
        let (status, _) = post(&routes, &action("confirm"), json!({})).await;
        assert_eq!(status, 200);
    }
    let (status, body) = post(&routes, &action("confirm"), json!({})).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("complete"));

    let (status, body) = post(&routes, &action("complete"), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["completed"], true);
    assert_eq!(body["data"]["currentStage"], "edit");

    let (_, body) = get(&routes, &format!("/api/v1/sessions/{}/history", id)).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.first(), Some(&"start"));
    assert_eq!(kinds.last(), Some(&"complete"));
}

#[tokio::test]
async fn test_list_get_and_delete() {
    let routes = create_api_routes(AppState::instant());
    let first = start(&routes).await;
    let second = start(&routes).await;

    let (_, body) = get(&routes, "/api/v1/sessions").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);

    let (_, body) = get(&routes, "/api/v1/health").await;
    assert_eq!(body["data"]["sessions"], 2);

    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/api/v1/sessions/{}", first))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let (status, _) = get(&routes, &format!("/api/v1/sessions/{}", first)).await;
    assert_eq!(status, 404);
    let (status, body) = get(&routes, &format!("/api/v1/sessions/{}", second)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], second);
}

#[tokio::test]
async fn test_malformed_session_id_is_404() {
    let routes = create_api_routes(AppState::instant());
    let (status, _) = get(&routes, "/api/v1/sessions/not-a-uuid").await;
    assert_eq!(status, 404);
}
