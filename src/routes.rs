use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    diagram::{DiagramRenderer, DiagramView, RenderState},
    generation::{GenerationClient, GenerationError},
    models::{CloudSolution, GenerationRequest, RenderRequestBody, RequestError, SolutionRequestBody},
};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<GenerationClient>,
    pub diagram: Arc<DiagramRenderer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/solutions", post(generate_solution))
        .route("/api/diagram", post(render_diagram).get(get_diagram))
        .route("/api/diagram/expand", post(toggle_expand))
        .route("/api/diagram/svg", get(diagram_svg))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
        .with_state(state)
}

pub enum ApiError {
    Invalid(RequestError),
    Generation(GenerationError),
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        ApiError::Invalid(e)
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        ApiError::Generation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(e) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": e.to_string() }))).into_response()
            }
            ApiError::Generation(e) => {
                // The raw payload of a malformed reply was already logged by the generator.
                tracing::error!("❌ Generation failed: {}", e);
                (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.user_message() }))).into_response()
            }
        }
    }
}

pub async fn generate_solution(
    State(state): State<AppState>,
    Json(body): Json<SolutionRequestBody>,
) -> Result<Json<CloudSolution>, ApiError> {
    let request = GenerationRequest::try_from(body)?;
    tracing::info!("🚀 Generating {} architecture", request.provider());
    let solution = state.generator.generate(&request).await?;
    Ok(Json(solution))
}

pub async fn render_diagram(State(state): State<AppState>, Json(body): Json<RenderRequestBody>) -> Json<DiagramView> {
    state.diagram.render(&body.chart).await;
    Json(state.diagram.snapshot())
}

pub async fn get_diagram(State(state): State<AppState>) -> Json<DiagramView> {
    Json(state.diagram.snapshot())
}

pub async fn toggle_expand(State(state): State<AppState>) -> Json<DiagramView> {
    let view = state.diagram.toggle_expand();
    tracing::debug!(?view, "Diagram view toggled");
    Json(state.diagram.snapshot())
}

pub async fn diagram_svg(State(state): State<AppState>) -> Response {
    match state.diagram.snapshot().render {
        RenderState::Rendered(diagram) => ([(header::CONTENT_TYPE, "image/svg+xml")], diagram.svg).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
