//! REST API for scoring candidate packings.
//!
//! Lets an external evolutionary controller submit placement sequences and read
//! back acceptance, the bounding volume score and optionally the relative
//! height map. Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::ops::ControlFlow;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, SimulationConfig};
use crate::container::{BoundingExtent, ContainerConfig, validate_height_bias};
use crate::evaluation::{
    EvaluationEvent, EvaluationResult, evaluate_packing, evaluate_packing_with_progress,
};
use crate::heightmap::HeightMap;
use crate::model::{CellSpan, PackageRequest, Placement, ValidationError};
use crate::types::Dims;

/// Largest grid a single request may allocate (2048 x 2048 cells).
pub const MAX_GRID_CELLS: usize = 2048 * 2048;

#[derive(Clone)]
struct ApiState {
    simulation: SimulationConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>box-stacking API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Container overrides for a single evaluation.
///
/// Omitted optional fields fall back to the server's configured defaults.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ContainerRequest {
    #[schema(example = 1000)]
    pub width: usize,
    #[schema(example = 1000)]
    pub height: usize,
    #[serde(default)]
    #[schema(nullable = true, example = 10.0)]
    pub penalty_multiplier: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub flatness_tolerance: Option<f64>,
}

impl ContainerRequest {
    fn into_config(self, defaults: ContainerConfig) -> ContainerConfig {
        ContainerConfig::builder()
            .width(self.width)
            .height(self.height)
            .penalty_multiplier(
                self.penalty_multiplier
                    .unwrap_or(defaults.penalty_multiplier),
            )
            .flatness_tolerance(
                self.flatness_tolerance
                    .unwrap_or(defaults.flatness_tolerance),
            )
            .build()
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "container": { "width": 1000, "height": 1000, "penalty_multiplier": 10.0 },
        "packages": [
            { "x_center": 10.0, "y_center": 10.0,
              "dims": { "size_x": 20.0, "size_y": 20.0, "size_z": 5.0 } }
        ],
        "height_bias": 1.0,
        "include_height_map": false
    })
)]
pub struct EvaluateRequest {
    #[serde(default)]
    #[schema(nullable = true)]
    pub container: Option<ContainerRequest>,
    pub packages: Vec<PackageRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub height_bias: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub include_height_map: Option<bool>,
}

#[derive(Debug)]
struct ValidatedEvaluateRequest {
    packages: Vec<PackageRequest>,
    config: ContainerConfig,
    height_bias: f64,
    include_height_map: bool,
}

#[derive(Debug)]
enum EvaluateRequestValidationError {
    InvalidContainer(ValidationError),
    GridTooLarge { cells: usize },
    InvalidHeightBias(ValidationError),
}

impl EvaluateRequest {
    fn into_validated(
        self,
        defaults: &SimulationConfig,
    ) -> Result<ValidatedEvaluateRequest, EvaluateRequestValidationError> {
        let config = match self.container {
            Some(container) => container.into_config(defaults.container_config()),
            None => defaults.container_config(),
        };
        config
            .validate()
            .map_err(EvaluateRequestValidationError::InvalidContainer)?;
        if config.cell_count() > MAX_GRID_CELLS {
            return Err(EvaluateRequestValidationError::GridTooLarge {
                cells: config.cell_count(),
            });
        }

        let height_bias = self.height_bias.unwrap_or(defaults.height_bias());
        validate_height_bias(height_bias)
            .map_err(EvaluateRequestValidationError::InvalidHeightBias)?;

        Ok(ValidatedEvaluateRequest {
            packages: self.packages,
            config,
            height_bias,
            include_height_map: self.include_height_map.unwrap_or(false),
        })
    }
}

/// Response with per-package outcomes and the candidate's score.
#[derive(Serialize, ToSchema)]
pub struct EvaluateResponse {
    pub placements: Vec<PlacementSummary>,
    pub accepted: usize,
    pub rejected: usize,
    pub penalised: usize,
    pub is_complete: bool,
    pub extent: BoundingExtent,
    pub height_bias: f64,
    pub bounding_volume: f64,
    #[schema(nullable = true)]
    pub height_map: Option<HeightMap>,
}

/// Outcome of one submitted package.
#[derive(Serialize, ToSchema)]
pub struct PlacementSummary {
    pub index: usize,
    pub accepted: bool,
    #[schema(nullable = true)]
    pub placement: Option<Placement>,
    #[schema(nullable = true)]
    pub reason_code: Option<String>,
    #[schema(nullable = true)]
    pub reason: Option<String>,
}

impl EvaluateResponse {
    /// Creates an EvaluateResponse from an EvaluationResult.
    pub fn from_evaluation(result: EvaluationResult, include_height_map: bool) -> Self {
        let accepted = result.accepted_count();
        let rejected = result.rejected_count();
        let penalised = result.penalised_count();
        let is_complete = result.is_complete();
        let height_map = include_height_map.then(|| result.container.observe_height_map());

        let placements = result
            .outcomes
            .into_iter()
            .map(|outcome| match outcome.result {
                Ok(placement) => PlacementSummary {
                    index: outcome.index,
                    accepted: true,
                    placement: Some(placement),
                    reason_code: None,
                    reason: None,
                },
                Err(err) => PlacementSummary {
                    index: outcome.index,
                    accepted: false,
                    placement: None,
                    reason_code: Some(err.code().to_string()),
                    reason: Some(err.to_string()),
                },
            })
            .collect();

        Self {
            placements,
            accepted,
            rejected,
            penalised,
            is_complete,
            extent: result.extent,
            height_bias: result.height_bias,
            bounding_volume: result.bounding_volume,
            height_map,
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn container_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid container configuration",
        details,
    )
}

fn parse_evaluate_request(
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
    defaults: &SimulationConfig,
) -> Result<ValidatedEvaluateRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(defaults) {
        Ok(validated) => Ok(validated),
        Err(EvaluateRequestValidationError::InvalidContainer(err)) => {
            Err(container_config_error(err.to_string()))
        }
        Err(EvaluateRequestValidationError::GridTooLarge { cells }) => {
            Err(container_config_error(format!(
                "grid of {} cells exceeds the limit of {} cells",
                cells, MAX_GRID_CELLS
            )))
        }
        Err(EvaluateRequestValidationError::InvalidHeightBias(err)) => {
            Err(validation_error(err.to_string()))
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_evaluate, handle_evaluate_stream),
    components(
        schemas(
            EvaluateRequest,
            ContainerRequest,
            EvaluateResponse,
            PlacementSummary,
            ErrorResponse,
            PackageRequest,
            Placement,
            CellSpan,
            Dims,
            BoundingExtent,
            HeightMap
        )
    ),
    tags((name = "evaluation", description = "Endpoints for scoring candidate packings"))
)]
struct ApiDoc;

fn router(simulation: SimulationConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/evaluate", post(handle_evaluate))
        .route("/evaluate_stream", post(handle_evaluate_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(ApiState { simulation })
}

/// Starts the API server and serves until it terminates.
///
/// # Errors
/// Fails if the listener cannot be bound.
pub async fn start_api_server(
    config: ApiConfig,
    simulation: SimulationConfig,
) -> std::io::Result<()> {
    let app = router(simulation);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("API endpoints: POST /evaluate, POST /evaluate_stream");
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        error!("API server terminated with an error: {err}");
        return Err(err);
    }
    Ok(())
}

/// Handler for POST /evaluate.
///
/// Replays the submitted packages into a fresh container and returns the
/// outcome of each placement together with the bounding volume score.
#[utoipa::path(
    post,
    path = "/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Candidate evaluated", body = EvaluateResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "evaluation"
)]
async fn handle_evaluate(
    State(state): State<ApiState>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_evaluate_request(payload, &state.simulation) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let ValidatedEvaluateRequest {
        packages,
        config,
        height_bias,
        include_height_map,
    } = request;

    info!(
        packages = packages.len(),
        width = config.width,
        height = config.height,
        "New evaluation request"
    );

    let evaluated = tokio::task::spawn_blocking(move || {
        evaluate_packing(&packages, config, height_bias)
            .map(|result| EvaluateResponse::from_evaluation(result, include_height_map))
    })
    .await;

    match evaluated {
        Ok(Ok(response)) => {
            info!(
                accepted = response.accepted,
                rejected = response.rejected,
                bounding_volume = response.bounding_volume,
                "Evaluation finished"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => container_config_error(err.to_string()),
        Err(err) => {
            error!("Evaluation task failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Evaluation failed",
                err.to_string(),
            )
        }
    }
}

/// Handler for POST /evaluate_stream (SSE).
///
/// Streams evaluation events in real-time as Server-Sent Events.
#[utoipa::path(
    post,
    path = "/evaluate_stream",
    request_body = EvaluateRequest,
    responses(
        (
            status = 200,
            description = "Streams evaluation events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "evaluation"
)]
async fn handle_evaluate_stream(
    State(state): State<ApiState>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_evaluate_request(payload, &state.simulation) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let outcome = evaluate_packing_with_progress(
            &request.packages,
            request.config,
            request.height_bias,
            |evt| forward_event(&tx, evt),
        );
        if let Err(err) = outcome {
            warn!("Streamed evaluation failed: {err}");
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Sends one event to the SSE channel; breaks once the client has gone away.
fn forward_event(tx: &mpsc::Sender<String>, event: &EvaluationEvent) -> ControlFlow<()> {
    if tx.is_closed() {
        debug!("SSE client disconnected, stopping evaluation");
        return ControlFlow::Break(());
    }
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!("Could not serialize evaluation event: {err}");
            return ControlFlow::Continue(());
        }
    };
    if tx.blocking_send(json).is_err() {
        debug!("SSE client disconnected, stopping evaluation");
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn state() -> ApiState {
        ApiState {
            simulation: SimulationConfig::default(),
        }
    }

    fn parse(json: &str) -> EvaluateRequest {
        serde_json::from_str(json).expect("Should parse valid JSON")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/evaluate"),
            "OpenAPI documentation is missing the /evaluate path"
        );
        assert!(
            paths.contains_key("/evaluate_stream"),
            "OpenAPI documentation is missing the /evaluate_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in [
            "EvaluateRequest",
            "EvaluateResponse",
            "ErrorResponse",
            "PackageRequest",
            "HeightMap",
        ] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn request_without_overrides_uses_server_defaults() {
        let request = parse(
            r#"{"packages": [{"x_center": 10.0, "y_center": 10.0,
                "dims": {"size_x": 20.0, "size_y": 20.0, "size_z": 5.0}}]}"#,
        );
        let validated = request
            .into_validated(&SimulationConfig::default())
            .expect("Should validate successfully");
        assert_eq!(validated.config, ContainerConfig::default());
        assert_eq!(validated.height_bias, 1.0);
        assert!(!validated.include_height_map);
        assert_eq!(validated.packages.len(), 1);
    }

    #[test]
    fn container_override_keeps_default_penalty_when_omitted() {
        let request = parse(
            r#"{"container": {"width": 50, "height": 20},
                "packages": [], "height_bias": 2.0, "include_height_map": true}"#,
        );
        let validated = request
            .into_validated(&SimulationConfig::default())
            .expect("Should validate successfully");
        assert_eq!(validated.config.width, 50);
        assert_eq!(validated.config.height, 20);
        assert_eq!(
            validated.config.penalty_multiplier,
            ContainerConfig::DEFAULT_PENALTY_MULTIPLIER
        );
        assert_eq!(validated.height_bias, 2.0);
        assert!(validated.include_height_map);
    }

    #[test]
    fn rejects_invalid_container_and_bias() {
        let zero_width = parse(r#"{"container": {"width": 0, "height": 20}, "packages": []}"#);
        assert!(matches!(
            zero_width.into_validated(&SimulationConfig::default()),
            Err(EvaluateRequestValidationError::InvalidContainer(_))
        ));

        let weak_penalty = parse(
            r#"{"container": {"width": 10, "height": 10, "penalty_multiplier": 0.5},
                "packages": []}"#,
        );
        assert!(matches!(
            weak_penalty.into_validated(&SimulationConfig::default()),
            Err(EvaluateRequestValidationError::InvalidContainer(_))
        ));

        let huge = parse(r#"{"container": {"width": 5000, "height": 5000}, "packages": []}"#);
        assert!(matches!(
            huge.into_validated(&SimulationConfig::default()),
            Err(EvaluateRequestValidationError::GridTooLarge { cells: 25_000_000 })
        ));

        let bad_bias = parse(r#"{"packages": [], "height_bias": -1.0}"#);
        assert!(matches!(
            bad_bias.into_validated(&SimulationConfig::default()),
            Err(EvaluateRequestValidationError::InvalidHeightBias(_))
        ));
    }

    #[test]
    fn response_reports_outcomes_and_optional_height_map() {
        let packages = vec![
            PackageRequest::new(5.0, 5.0, (4.0, 4.0, 2.0)),
            PackageRequest::new(5.0, 5.0, (40.0, 4.0, 2.0)),
        ];
        let config = ContainerConfig::builder().side(10).build();

        let result = evaluate_packing(&packages, config, 1.0).unwrap();
        let response = EvaluateResponse::from_evaluation(result, true);
        assert_eq!(response.accepted, 1);
        assert_eq!(response.rejected, 1);
        assert!(!response.is_complete);
        assert_eq!(response.bounding_volume, 2.0 * 4.0 * 4.0);
        assert!(response.placements[0].accepted);
        assert_eq!(
            response.placements[1].reason_code.as_deref(),
            Some("oversized_package")
        );
        let map = response.height_map.as_ref().expect("height map requested");
        assert_eq!(map.width(), 10);
        assert_eq!(map.max(), 2.0);

        let result = evaluate_packing(&packages, config, 1.0).unwrap();
        assert!(EvaluateResponse::from_evaluation(result, false)
            .height_map
            .is_none());
    }

    #[tokio::test]
    async fn evaluate_handler_scores_candidate() {
        let request = parse(
            r#"{"container": {"width": 100, "height": 100},
                "packages": [{"x_center": 10.0, "y_center": 10.0,
                "dims": {"size_x": 20.0, "size_y": 20.0, "size_z": 5.0}}]}"#,
        );
        let response = handle_evaluate(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["accepted"], 1);
        assert_eq!(body["bounding_volume"], 2000.0);
        assert_eq!(body["placements"][0]["placement"]["x_cells"]["end"], 20);
        assert!(body["height_map"].is_null());
    }

    #[tokio::test]
    async fn evaluate_handler_rejects_bad_configuration() {
        let request = parse(r#"{"container": {"width": 0, "height": 10}, "packages": []}"#);
        let response = handle_evaluate(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid container configuration");
    }

    #[test]
    fn forward_event_delivers_json_while_client_listens() {
        let (tx, mut rx) = mpsc::channel::<String>(4);
        let event = EvaluationEvent::Finished {
            accepted: 1,
            rejected: 0,
            bounding_volume: 8.0,
        };
        assert_eq!(forward_event(&tx, &event), ControlFlow::Continue(()));
        let json = rx.try_recv().expect("event should be queued");
        assert!(json.contains("\"type\":\"Finished\""));
    }

    #[test]
    fn streamed_evaluation_stops_after_client_disconnects() {
        let (tx, rx) = mpsc::channel::<String>(4);
        drop(rx);
        let packages = vec![PackageRequest::new(5.0, 5.0, (2.0, 2.0, 1.0)); 50];
        let config = ContainerConfig::builder().side(10).build();

        let result =
            evaluate_packing_with_progress(&packages, config, 1.0, |evt| forward_event(&tx, evt))
                .unwrap();
        assert!(result.outcomes.is_empty());
        assert_eq!(result.container.placed_count(), 0);
    }
}
