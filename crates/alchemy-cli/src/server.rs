//! HTTP surface for the combination engine.

use std::sync::Arc;

use alchemy_core::{DEFAULT_PATH_COUNT, Path};
use alchemy_engine::{Bucket, ElementEdit, Engine, EngineError};
use alchemy_store::ElementQuery;
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{AuthConfig, ServerConfig};

pub const CALLER_HEADER: &str = "x-caller-id";
const ANONYMOUS: &str = "anonymous";

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, auth: AuthConfig) -> Self {
        Self {
            engine,
            auth: Arc::new(auth),
        }
    }
}

/// Engine error rendered as `{kind, message, retry_after?}`.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "{}", self.0);
        }
        let retry_after = self.0.retry_after();
        let body = ErrorBody {
            kind: self.0.kind(),
            message: self.0.to_string(),
            retry_after,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> std::result::Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| EngineError::InvalidInput(e.body_text()).into())
}

/// Opaque caller identity used for attribution and rate limiting.
fn caller(headers: &HeaderMap, auth: &AuthConfig) -> std::result::Result<String, EngineError> {
    let id = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match id {
        Some(id) => Ok(id.to_string()),
        None if auth.require_caller => Err(EngineError::Unauthorized(format!(
            "missing {CALLER_HEADER} header"
        ))),
        None => Ok(ANONYMOUS.to_string()),
    }
}

fn require_admin(headers: &HeaderMap, auth: &AuthConfig) -> std::result::Result<(), EngineError> {
    let Some(expected) = auth.admin_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized("admin token required".to_string()))
    }
}

fn attribution(caller: &str) -> Option<&str> {
    (caller != ANONYMOUS).then_some(caller)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/combine", post(combine))
        .route("/paths/generate", post(generate_paths))
        .route("/paths/validate", post(validate_paths))
        .route("/paths/commit", post(commit_path))
        .route(
            "/element/{name}",
            get(element_detail).put(edit_element).delete(delete_element),
        )
        .route("/elements", get(list_elements))
        .route("/stats", get(stats))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allow = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any)
            .expose_headers([header::RETRY_AFTER]),
    )
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(state: AppState, server: &ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let bind = server.bind.as_str();
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let addr = listener.local_addr().context("listener has no address")?;
    tracing::info!(%addr, "daily alchemy listening");
    eprintln!("listening on http://{addr}");

    let app = match cors_layer(&server.cors_origins) {
        Some(cors) => router(state).layer(cors),
        None => router(state),
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server failure")?;
    tracing::info!("server stopped");
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct CombineRequest {
    a: String,
    b: String,
}

async fn combine(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CombineRequest>, JsonRejection>,
) -> ApiResult<alchemy_engine::CombineOutcome> {
    let request = body(payload)?;
    let caller = caller(&headers, &state.auth)?;
    state.engine.admit(Bucket::Combine, &caller)?;
    let outcome = state
        .engine
        .combine(&request.a, &request.b, attribution(&caller))
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    target: String,
    count: Option<usize>,
}

async fn generate_paths(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<alchemy_engine::GeneratedPaths> {
    let request = body(payload)?;
    let caller = caller(&headers, &state.auth)?;
    state.engine.admit(Bucket::Generate, &caller)?;
    let generated = state
        .engine
        .generate_paths(&request.target, request.count.unwrap_or(DEFAULT_PATH_COUNT))
        .await?;
    Ok(Json(generated))
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    paths: Vec<Path>,
}

#[derive(Serialize)]
struct ValidateResponse {
    paths: Vec<alchemy_core::AnnotatedPath>,
}

async fn validate_paths(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ValidateRequest>, JsonRejection>,
) -> ApiResult<ValidateResponse> {
    let request = body(payload)?;
    let paths = state.engine.validate_paths(&request.paths).await?;
    Ok(Json(ValidateResponse { paths }))
}

#[derive(Debug, Deserialize)]
struct CommitRequest {
    path: Path,
    target_name: String,
    target_glyph: String,
}

async fn commit_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CommitRequest>, JsonRejection>,
) -> ApiResult<alchemy_engine::CommitReport> {
    require_admin(&headers, &state.auth)?;
    let request = body(payload)?;
    let report = state
        .engine
        .commit_path(&request.path, &request.target_name, &request.target_glyph)
        .await?;
    Ok(Json(report))
}

async fn element_detail(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> ApiResult<alchemy_store::ElementDetail> {
    Ok(Json(state.engine.element_detail(&name).await?))
}

async fn edit_element(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
    payload: std::result::Result<Json<ElementEdit>, JsonRejection>,
) -> ApiResult<alchemy_store::ElementChange> {
    require_admin(&headers, &state.auth)?;
    let edit = body(payload)?;
    Ok(Json(state.engine.edit_element(&name, &edit).await?))
}

async fn delete_element(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(name): UrlPath<String>,
) -> ApiResult<alchemy_store::ElementChange> {
    require_admin(&headers, &state.auth)?;
    Ok(Json(state.engine.delete_element(&name).await?))
}

#[derive(Debug, Default, Deserialize)]
struct ElementsParams {
    letter: Option<String>,
    search: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

async fn list_elements(
    State(state): State<AppState>,
    params: std::result::Result<Query<ElementsParams>, QueryRejection>,
) -> ApiResult<alchemy_store::ElementPage> {
    let Query(params) = params.map_err(|e| EngineError::InvalidInput(e.body_text()))?;
    let query = ElementQuery {
        letter: params.letter,
        search: params.search,
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(0),
    };
    Ok(Json(state.engine.list_elements(&query).await?))
}

async fn stats(State(state): State<AppState>) -> ApiResult<alchemy_store::StoreStats> {
    Ok(Json(state.engine.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_engine::{EngineConfig, GatewayError, ModelConfig, ScriptedGateway};
    use alchemy_store::Store;
    use tower::ServiceExt;

    fn app_with(gateway: ScriptedGateway, auth: AuthConfig) -> Router {
        let config = EngineConfig {
            model: ModelConfig {
                backoff_base_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = Engine::new(Store::open_in_memory().unwrap(), Arc::new(gateway), config);
        router(AppState::new(Arc::new(engine), auth))
    }

    fn app(gateway: ScriptedGateway) -> Router {
        app_with(gateway, AuthConfig::default())
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, value)
    }

    #[tokio::test]
    async fn test_combine_ok() {
        let app = app(ScriptedGateway::always(r#"{"name":"Steam","glyph":"♨️"}"#));
        let (status, _, body) = send(
            &app,
            json_request(
                Method::POST,
                "/combine",
                serde_json::json!({"a": "Water", "b": "Fire"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result_name"], "Steam");
        assert_eq!(body["result_glyph"], "♨️");
        assert_eq!(body["origin"], "model_generated");
    }

    #[tokio::test]
    async fn test_combine_invalid_input() {
        let app = app(ScriptedGateway::new([]));
        let (status, _, body) = send(
            &app,
            json_request(Method::POST, "/combine", serde_json::json!({"a": " ", "b": "Fire"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");

        let (status, _, body) = send(
            &app,
            json_request(Method::POST, "/combine", serde_json::json!({"a": "Fire"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_model_rate_limit_sets_retry_after() {
        let app = app(ScriptedGateway::new([
            Err(GatewayError::from_status(429)),
            Err(GatewayError::from_status(429)),
            Err(GatewayError::from_status(429)),
        ]));
        let (status, headers, body) = send(
            &app,
            json_request(
                Method::POST,
                "/combine",
                serde_json::json!({"a": "Earth", "b": "Fire"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["kind"], "rate_limited");
        assert!(body["retry_after"].as_u64().is_some());
        assert!(headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_caller_rate_limit() {
        let config = EngineConfig {
            rate_limit: alchemy_engine::RateLimitConfig {
                combine_per_minute: 1,
                generate_per_minute: 1,
            },
            ..Default::default()
        };
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            Arc::new(ScriptedGateway::always(r#"{"name":"Steam","glyph":"♨️"}"#)),
            config,
        );
        let app = router(AppState::new(Arc::new(engine), AuthConfig::default()));
        let request = || {
            let mut r = json_request(
                Method::POST,
                "/combine",
                serde_json::json!({"a": "Water", "b": "Fire"}),
            );
            r.headers_mut()
                .insert(CALLER_HEADER, HeaderValue::from_static("alice"));
            r
        };
        assert_eq!(send(&app, request()).await.0, StatusCode::OK);
        let (status, headers, body) = send(&app, request()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["kind"], "rate_limited");
        assert!(headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_require_caller() {
        let auth = AuthConfig {
            require_caller: true,
            ..Default::default()
        };
        let app = app_with(ScriptedGateway::new([]), auth);
        let (status, _, body) = send(
            &app,
            json_request(
                Method::POST,
                "/combine",
                serde_json::json!({"a": "Water", "b": "Fire"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_element_detail_and_404() {
        let app = app(ScriptedGateway::new([]));
        let (status, _, body) = send(&app, get_request("/element/fire")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Fire");
        assert_eq!(body["is_starter"], true);

        let (status, _, body) = send(&app, get_request("/element/Plasma")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_elements_listing() {
        let app = app(ScriptedGateway::new([]));
        let (status, _, body) = send(&app, get_request("/elements?letter=w&limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["elements"][0]["name"], "Water");
        assert_eq!(body["has_more"], true);
    }

    #[tokio::test]
    async fn test_admin_token_guards_mutations() {
        let auth = AuthConfig {
            admin_token: Some("secret".into()),
            ..Default::default()
        };
        let app = app_with(ScriptedGateway::new([]), auth);

        let unauthenticated = Request::builder()
            .method(Method::DELETE)
            .uri("/element/Steam")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, unauthenticated).await.0, StatusCode::UNAUTHORIZED);

        let starter = Request::builder()
            .method(Method::DELETE)
            .uri("/element/Fire")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, starter).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_commit_then_rename_conflict() {
        let app = app(ScriptedGateway::new([]));
        let commit = serde_json::json!({
            "path": {"steps": [
                {"a": "Water", "b": "Fire", "result_name": "Steam", "result_glyph": "♨️"},
                {"a": "Earth", "b": "Water", "result": "Mud", "glyph": "🟫"},
                {"a": "Mud", "b": "Fire", "result": "Brick", "glyph": "🧱"},
                {"a": "Steam", "b": "Fire", "result": "Heat", "glyph": "🌡️"}
            ]},
            "target_name": "Heat",
            "target_glyph": "🌡️"
        });
        let (status, _, body) = send(&app, json_request(Method::POST, "/paths/commit", commit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], 4);

        // Steam + Fire -> Heat and Mud + Fire -> Brick would collide.
        let (status, _, body) = send(
            &app,
            json_request(
                Method::PUT,
                "/element/Steam",
                serde_json::json!({"new_name": "Mud"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");

        let (status, _, body) = send(&app, get_request("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["by_origin"]["human_authored"], 4);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let app = app(ScriptedGateway::new([]))
            .layer(cors_layer(&["http://localhost:3000".to_string()]).unwrap());
        let request = Request::builder()
            .uri("/stats")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert!(cors_layer(&[]).is_none());
    }

    #[tokio::test]
    async fn test_generate_paths_endpoint() {
        let reply = r#"{"paths": [{"steps": [
            {"a": "Water", "b": "Wind", "result": "Rain", "glyph": "🌧️"},
            {"a": "Rain", "b": "Wind", "result": "Storm", "glyph": "⛈️"}
        ]}]}"#;
        let app = app(ScriptedGateway::always(reply));
        let (status, _, body) = send(
            &app,
            json_request(
                Method::POST,
                "/paths/generate",
                serde_json::json!({"target": "Storm"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let step = &body["paths"][0]["steps"][0];
        assert_eq!(step["a"], "Water");
        assert_eq!(step["result_name"], "Rain");
        assert_eq!(step["annotation"], "new");
        assert_eq!(body["paths"][0]["summary"]["new"], 2);
    }
}
