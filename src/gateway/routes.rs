//! HTTP surface for the gateway.
//!
//! Thin glue only: every endpoint delegates to [`ChannelGateway`] /
//! the memory stores and returns JSON. The trust pipeline itself
//! lives in [`super`]; nothing here makes security decisions.

use super::{is_known_channel, ChannelGateway, TurnOutcome};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the gateway router.
pub fn router(gateway: Arc<ChannelGateway>) -> Router {
    Router::new()
        .route("/api/nodes/{channel}", post(post_channel_message))
        .route("/api/nodes", get(get_nodes))
        .route("/api/memory/preferences", get(get_preferences))
        .route("/api/memory/learning", get(get_learning))
        .route("/api/memory/session", get(get_session))
        .route("/api/memory/reset-session", post(reset_session))
        .route("/api/audit/recent", get(get_audit_recent))
        .route("/api/health", get(get_health))
        .with_state(gateway)
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    content: String,
    /// Marks content of external provenance (mail, webhook, scraped).
    #[serde(default)]
    external: bool,
}

async fn post_channel_message(
    State(gateway): State<Arc<ChannelGateway>>,
    Path(channel): Path<String>,
    Json(body): Json<InboundMessage>,
) -> (StatusCode, Json<Value>) {
    if !is_known_channel(&channel) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": format!("unknown channel: {channel}")})),
        );
    }
    if body.content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "empty"})),
        );
    }

    let result = gateway
        .process_message(&channel, &body.content, body.external)
        .await;

    let status = match result.outcome {
        TurnOutcome::Completed => "success",
        TurnOutcome::Rejected => "rejected",
        TurnOutcome::Unavailable => "unavailable",
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "node_id": result.node_id,
            // <think> stays internal; clients get the visible sections.
            "reply": {
                "summary": result.reply.summary,
                "insight": result.reply.insight,
                "suggestion": result.reply.suggestion,
            },
            "security": {
                "overall": result.security.overall,
                "input_suspicious": result.security.input_scan.is_suspicious,
                "input_quarantined": result.security.input_quarantined,
            },
            "learnings_extracted": result.learnings_extracted,
            "command_results": result.command_results,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct NodesQuery {
    channel: Option<String>,
}

async fn get_nodes(
    State(gateway): State<Arc<ChannelGateway>>,
    Query(query): Query<NodesQuery>,
) -> Json<Value> {
    let nodes = gateway.nodes().list(query.channel.as_deref());
    Json(json!(nodes))
}

async fn get_preferences(State(gateway): State<Arc<ChannelGateway>>) -> Json<Value> {
    Json(json!(gateway.memory().preferences().snapshot()))
}

async fn get_learning(State(gateway): State<Arc<ChannelGateway>>) -> Json<Value> {
    let (verified, rejected) = gateway.memory().facts().counters();
    Json(json!({
        "facts": gateway.memory().facts().all(),
        "verified_facts_count": verified,
        "rejected_facts_count": rejected,
        "quarantined": gateway.memory().quarantine().len(),
    }))
}

async fn get_session(State(gateway): State<Arc<ChannelGateway>>) -> Json<Value> {
    Json(json!(gateway.memory().session().snapshot()))
}

async fn reset_session(State(gateway): State<Arc<ChannelGateway>>) -> Json<Value> {
    gateway.memory().session().reset();
    Json(json!({"status": "success", "message": "session reset"}))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn get_audit_recent(
    State(gateway): State<Arc<ChannelGateway>>,
    Query(query): Query<AuditQuery>,
) -> Json<Value> {
    let entries = gateway.audit_log().recent(query.limit.unwrap_or(10));
    Json(json!(entries))
}

async fn get_health(State(gateway): State<Arc<ChannelGateway>>) -> Json<Value> {
    let session = gateway.memory().session().snapshot();
    Json(json!({
        "status": "online",
        "total_nodes": gateway.nodes().len(),
        "total_facts": gateway.memory().facts().len(),
        "quarantined_claims": gateway.memory().quarantine().len(),
        "session_learnings": session.learning_count,
        "security_alerts": session.security_alerts,
        "model_connected": gateway.model().check_connection().await,
    }))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MemoryConfig};
    use crate::security::TruthTable;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_router(dir: &std::path::Path, model_url: String) -> Router {
        let mut config = Config::default();
        config.memory = MemoryConfig {
            dir: Some(dir.to_path_buf()),
            ..MemoryConfig::default()
        };
        config.model.url = model_url;
        config.model.timeout_secs = 5;
        let gateway =
            ChannelGateway::new(&config, Arc::new(TruthTable::with_defaults())).unwrap();
        router(Arc::new(gateway))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn channel_post_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "<summary>안녕하세요!</summary>"}}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let app = test_router(
            dir.path(),
            format!("{}/v1/chat/completions", server.uri()),
        )
        .await;

        let response = app
            .oneshot(
                Request::post("/api/nodes/kakao")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"content": "안녕"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["reply"]["summary"], "안녕하세요!");
        assert_eq!(body["security"]["overall"], "safe");
        assert!(body["reply"].get("thinking").is_none());
    }

    #[tokio::test]
    async fn unknown_channel_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), "http://127.0.0.1:1/x".to_string()).await;
        let response = app
            .oneshot(
                Request::post("/api/nodes/telegram")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"content": "hi"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_content_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), "http://127.0.0.1:1/x".to_string()).await;
        let response = app
            .oneshot(
                Request::post("/api/nodes/kakao")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"content": "  "}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn memory_endpoints_serve_documents() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path(), "http://127.0.0.1:1/x".to_string()).await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/memory/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message_count"], 0);

        let response = app
            .oneshot(
                Request::get("/api/memory/preferences")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["user"]["name"], "공장장");
    }
}
