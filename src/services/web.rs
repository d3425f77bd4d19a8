//! Axum-based HTTP server for the launcher API.
//!
//! Provides REST endpoints for:
//! - GET `/` - Device name
//! - POST `/launch/arm`, `/launch/disarm` - Arming
//! - GET `/launch/status` - Arming state and tubes
//! - POST `/launch/load` - Mark tubes loaded (`{"tubeIds": [..]}`)
//! - POST `/launch/fire` - Fire tubes (`{"tubeIds": [..]}`)
//! - POST `/launch/fire/all` - Fire every tube
//! - GET `/test` - Relay bench test
//! - POST `/move/start`, `/move/stop` - Movement (`{"up": true, ...}`)
//! - POST `/move/estop` - Emergency stop
//! - GET `/move/state`, `/move/encoders` - Motion flags and encoder counts
//! - GET `/audit` - Recent pin transitions
//!
//! Hardware commands block for their fixed durations, so they run on the
//! blocking thread pool.
//!
//! | Failure | Status |
//! |---------|--------|
//! | Missing or malformed JSON, empty tube list | 400 |
//! | Not armed | 403 |
//! | Unknown tube id | 404 |
//! | Conflicting directions, tube already firing | 409 |
//! | Hardware or configuration fault | 500 |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::config::WebConfig;
use crate::error::LauncherError;
use crate::motion::MoveRequest;
use crate::traits::{GpioBackend, Timebase};

use super::api::{ApiResponse, CommandResponse, TubeIdsRequest};
use super::shared::{CommandError, SharedLauncher};

/// Router state.
pub type AppState<G, T> = Arc<SharedLauncher<G, T>>;

// ============================================================================
// Response Helpers
// ============================================================================

/// HTTP status for a failed command.
pub fn status_for(err: &CommandError) -> StatusCode {
    match err {
        CommandError::NotArmed => StatusCode::FORBIDDEN,
        CommandError::Launcher(err) => match err {
            LauncherError::EmptyLaunchRequest => StatusCode::BAD_REQUEST,
            LauncherError::UnknownTubeId(_) => StatusCode::NOT_FOUND,
            LauncherError::ConflictingDirections { .. } | LauncherError::TubeBusy(_) => {
                StatusCode::CONFLICT
            }
            LauncherError::Configuration(_) | LauncherError::Hardware(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

fn ok<D: Serialize>(data: D) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

fn command_failure(err: CommandError) -> Response {
    let status = status_for(&err);
    match &err {
        CommandError::Launcher(inner) if inner.is_rejection() => {
            debug!(error = %err, "command rejected")
        }
        _ if status.is_server_error() => error!(error = %err, "command failed"),
        _ => {}
    }
    failure(status, err.to_string())
}

fn parse_json<B: DeserializeOwned>(body: &Bytes) -> Result<B, Response> {
    if body.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "No JSON received."));
    }
    serde_json::from_slice(body)
        .map_err(|err| failure(StatusCode::BAD_REQUEST, format!("Invalid JSON: {err}")))
}

/// Runs a hardware command on the blocking pool.
async fn blocking<G, T, R, F>(state: AppState<G, T>, command: F) -> Result<R, Response>
where
    G: GpioBackend,
    T: Timebase,
    R: Send + 'static,
    F: FnOnce(&SharedLauncher<G, T>) -> Result<R, CommandError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || command(&state)).await {
        Ok(result) => result.map_err(command_failure),
        Err(err) => {
            error!(error = %err, "command task failed");
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "Command task failed"))
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET / - Device name
async fn index<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> String {
    state.name().to_string()
}

/// POST /launch/arm
async fn arm<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    state.arm();
    ok(CommandResponse::done("System armed"))
}

/// POST /launch/disarm
async fn disarm<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    state.disarm();
    ok(CommandResponse::done("System disarmed"))
}

/// GET /launch/status
async fn status<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    ok(state.status())
}

/// POST /launch/load - Accepts JSON: `{"tubeIds": [1, 2]}`
async fn load<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
    body: Bytes,
) -> Response {
    let request: TubeIdsRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.load(&request.tube_ids) {
        Ok(()) => ok(CommandResponse::done("Tubes loaded")),
        Err(err) => command_failure(err),
    }
}

/// POST /launch/fire - Accepts JSON: `{"tubeIds": [3, 5, 9]}`
async fn fire<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
    body: Bytes,
) -> Response {
    let request: TubeIdsRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match blocking(state, move |s| s.fire(&request.tube_ids)).await {
        Ok(tubes) => ok(CommandResponse::fired("Given rockets launched", tubes)),
        Err(response) => response,
    }
}

/// POST /launch/fire/all
async fn fire_all<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    match blocking(state, |s| s.fire_all()).await {
        Ok(tubes) => ok(CommandResponse::fired("All rockets launched!", tubes)),
        Err(response) => response,
    }
}

/// GET /test - Relay bench test
async fn relay_test<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
) -> Response {
    match blocking(state, |s| Ok(s.launcher().relay_test()?)).await {
        Ok(()) => ok(CommandResponse::done("Relay test complete")),
        Err(response) => response,
    }
}

/// POST /move/start - Accepts JSON: `{"up": true, "cw": true}`
async fn move_start<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
    body: Bytes,
) -> Response {
    let request: MoveRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match blocking(state, move |s| Ok(s.launcher().move_start(&request)?)).await {
        Ok(()) => ok(CommandResponse::done("Moving")),
        Err(response) => response,
    }
}

/// POST /move/stop - Accepts JSON: `{"up": true, "cw": true}`
async fn move_stop<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
    body: Bytes,
) -> Response {
    let request: MoveRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match blocking(state, move |s| Ok(s.launcher().move_stop(&request)?)).await {
        Ok(()) => ok(CommandResponse::done("Stopped")),
        Err(response) => response,
    }
}

/// POST /move/estop - Emergency stop
async fn emergency_stop<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
) -> Response {
    let result = blocking(state, |s| {
        s.launcher().emergency_stop();
        Ok(())
    })
    .await;
    match result {
        Ok(()) => ok(CommandResponse::done("Emergency stop")),
        Err(response) => response,
    }
}

/// GET /move/state
async fn move_state<G: GpioBackend, T: Timebase>(
    State(state): State<AppState<G, T>>,
) -> Response {
    ok(state.launcher().query_motion_state())
}

/// GET /move/encoders
async fn encoders<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    ok(state.launcher().query_encoder_counts())
}

/// GET /audit
async fn audit<G: GpioBackend, T: Timebase>(State(state): State<AppState<G, T>>) -> Response {
    ok(state.launcher().audit_trail())
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    failure(StatusCode::NOT_FOUND, "Not found")
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Create from shared WebConfig
    pub fn from_config(config: &WebConfig) -> Self {
        Self {
            addr: ([0, 0, 0, 0], config.port).into(),
            cors_permissive: config.cors_permissive,
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router<G: GpioBackend, T: Timebase>(
    state: AppState<G, T>,
    config: &WebServerConfig,
) -> Router {
    let mut router = Router::new()
        .route("/", get(index::<G, T>))
        // Arming and launching
        .route("/launch/arm", post(arm::<G, T>))
        .route("/launch/disarm", post(disarm::<G, T>))
        .route("/launch/status", get(status::<G, T>))
        .route("/launch/load", post(load::<G, T>))
        .route("/launch/fire", post(fire::<G, T>))
        .route("/launch/fire/all", post(fire_all::<G, T>))
        .route("/test", get(relay_test::<G, T>))
        // Movement
        .route("/move/start", post(move_start::<G, T>))
        .route("/move/stop", post(move_stop::<G, T>))
        .route("/move/estop", post(emergency_stop::<G, T>))
        .route("/move/state", get(move_state::<G, T>))
        .route("/move/encoders", get(encoders::<G, T>))
        .route("/audit", get(audit::<G, T>))
        // Fallback
        .fallback(not_found)
        .with_state(state);

    // Add CORS if requested
    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Serve the API until `shutdown` resolves.
pub async fn run_server_with_state<G, T, S>(
    state: AppState<G, T>,
    config: WebServerConfig,
    shutdown: S,
) -> Result<(), std::io::Error>
where
    G: GpioBackend,
    T: Timebase,
    S: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "web server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HardwareError;
    use crate::traits::Axis;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&CommandError::NotArmed), StatusCode::FORBIDDEN);
        let cases = [
            (LauncherError::EmptyLaunchRequest, StatusCode::BAD_REQUEST),
            (LauncherError::UnknownTubeId(20), StatusCode::NOT_FOUND),
            (LauncherError::TubeBusy(2), StatusCode::CONFLICT),
            (
                LauncherError::ConflictingDirections {
                    axis: Axis::Vertical,
                },
                StatusCode::CONFLICT,
            ),
            (
                LauncherError::Hardware(HardwareError::new(8, "io")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                LauncherError::config("bad pin"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&CommandError::Launcher(err)), status);
        }
    }

    #[test]
    fn server_config_from_web_config() {
        let config = WebServerConfig::from_config(&WebConfig::default().with_port(9000));
        assert_eq!(config.addr.port(), 9000);
        assert!(config.cors_permissive);
        assert_eq!(WebServerConfig::default().addr.port(), 8000);
    }
}
