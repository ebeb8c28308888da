//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::betting::Engine;
use crate::entity::{NewChallenge, NewSandbox, SandboxStatus};
use crate::error::BettingError;
use crate::market::{Outcome, Side};
use crate::metrics;

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Betting engine.
    pub engine: Engine,
    /// Whether the background scheduler is running.
    pub ready: Arc<AtomicBool>,
    /// Prometheus render handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            ready: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Error returned by API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Engine rejected the request.
    #[error(transparent)]
    Betting(#[from] BettingError),

    /// Blocking task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable code.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
}

/// HTTP status for an engine error.
pub fn status_for(err: &BettingError) -> StatusCode {
    match err {
        BettingError::MarketClosed { .. } => StatusCode::CONFLICT,
        BettingError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        BettingError::NotFound { .. } => StatusCode::NOT_FOUND,
        BettingError::InvalidAmount(_)
        | BettingError::Invalid(_)
        | BettingError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BettingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Betting(err) => (
                status_for(err),
                ErrorResponse {
                    error: err.code(),
                    message: err.to_string(),
                },
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal",
                    message: message.clone(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Handler result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Run a blocking engine call off the async workers.
async fn run<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Engine) -> Result<T, BettingError> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

/// Record request latency per matched route.
pub async fn track_latency(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    metrics::record_http_latency(start, &endpoint);
    response
}

// === Health ===

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse { ready: is_ready };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus text exposition.
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

// === Markets ===

/// Place-bet request body.
#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    /// Bettor.
    pub user_id: String,
    /// Side backed.
    pub side: Side,
    /// Stake.
    pub amount: Decimal,
}

/// Settle request body. Exactly one of the fields must be set.
#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    /// Winning side.
    pub winner: Option<Side>,
    /// Reported outcome, mapped to a winning side.
    pub outcome: Option<Outcome>,
}

impl SettleRequest {
    fn winning_side(&self) -> Result<Side, BettingError> {
        match (self.winner, self.outcome) {
            (Some(side), None) => Ok(side),
            (None, Some(outcome)) => Ok(outcome.winning_side()),
            _ => Err(BettingError::Invalid(
                "exactly one of winner or outcome is required".to_string(),
            )),
        }
    }
}

/// History query.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum snapshots returned.
    pub limit: Option<usize>,
}

/// `GET /api/v1/markets/:id/odds`
pub async fn get_odds(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let odds = run(&state, move |engine| engine.get_odds(&id)).await?;
    Ok(Json(odds))
}

/// `GET /api/v1/markets/:id`
pub async fn get_market(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let market = run(&state, move |engine| {
        engine
            .get_market(&id)?
            .ok_or_else(|| BettingError::not_found("market", id))
    })
    .await?;
    Ok(Json(market))
}

/// `GET /api/v1/markets/:id/history`
pub async fn odds_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let history = run(&state, move |engine| engine.odds_history(&id, query.limit)).await?;
    Ok(Json(history))
}

/// `GET /api/v1/markets/:id/bets`
pub async fn market_bets(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let bets = run(&state, move |engine| engine.bets_for_entity(&id)).await?;
    Ok(Json(bets))
}

/// `POST /api/v1/markets/:id/bets`
pub async fn place_bet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PlaceBetRequest>,
) -> ApiResult<impl IntoResponse> {
    let bet = run(&state, move |engine| {
        engine.place_bet(&id, &body.user_id, body.side, body.amount)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(bet)))
}

/// `POST /api/v1/markets/:id/settle`
pub async fn settle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SettleRequest>,
) -> ApiResult<impl IntoResponse> {
    let winner = body.winning_side()?;
    let summary = run(&state, move |engine| engine.settle(&id, winner)).await?;
    Ok(Json(summary))
}

/// `POST /api/v1/markets/:id/refund`
pub async fn refund(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let summary = run(&state, move |engine| engine.refund(&id)).await?;
    Ok(Json(summary))
}

// === Users ===

/// Create-user request body.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
}

/// Deposit request body.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    /// Amount to credit.
    pub amount: Decimal,
}

/// Balance after a deposit.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User id.
    pub user_id: String,
    /// New balance.
    pub balance: Decimal,
}

/// `POST /api/v1/users`
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = run(&state, move |engine| engine.create_user(&body.name, &body.email)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/v1/users/:id`
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let user = run(&state, move |engine| engine.get_user(&id)).await?;
    Ok(Json(user))
}

/// `GET /api/v1/users/:id/bets`
pub async fn user_bets(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let bets = run(&state, move |engine| engine.bets_for_user(&id)).await?;
    Ok(Json(bets))
}

/// `POST /api/v1/users/:id/deposit`
pub async fn deposit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DepositRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = id.clone();
    let balance = run(&state, move |engine| engine.deposit(&id, body.amount)).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

// === Sandboxes ===

/// Sandbox listing filter.
#[derive(Debug, Deserialize)]
pub struct SandboxQuery {
    /// Only sandboxes with this status.
    pub status: Option<SandboxStatus>,
}

/// Progress report body.
#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    /// Latest progress value.
    pub progress: Decimal,
}

/// Completion report body.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Reported outcome.
    pub outcome: Outcome,
}

/// `POST /api/v1/sandboxes`
pub async fn create_sandbox(
    State(state): State<AppState>,
    Json(body): Json<NewSandbox>,
) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.create_sandbox(&body)).await?;
    Ok((StatusCode::CREATED, Json(sandbox)))
}

/// `GET /api/v1/sandboxes`
pub async fn list_sandboxes(
    State(state): State<AppState>,
    Query(query): Query<SandboxQuery>,
) -> ApiResult<impl IntoResponse> {
    let sandboxes = run(&state, move |engine| engine.list_sandboxes(query.status)).await?;
    Ok(Json(sandboxes))
}

/// `GET /api/v1/sandboxes/:id`
pub async fn get_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.get_sandbox(&id)).await?;
    Ok(Json(sandbox))
}

/// `POST /api/v1/sandboxes/:id/activate`
pub async fn activate_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.activate_sandbox(&id)).await?;
    Ok(Json(sandbox))
}

/// `POST /api/v1/sandboxes/:id/pause`
pub async fn pause_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.pause_sandbox(&id)).await?;
    Ok(Json(sandbox))
}

/// `POST /api/v1/sandboxes/:id/resume`
pub async fn resume_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.resume_sandbox(&id)).await?;
    Ok(Json(sandbox))
}

/// `POST /api/v1/sandboxes/:id/stop`
pub async fn stop_sandbox(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.stop_sandbox(&id)).await?;
    Ok(Json(sandbox))
}

/// `POST /api/v1/sandboxes/:id/progress`
pub async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let sandbox = run(&state, move |engine| engine.update_progress(&id, body.progress)).await?;
    Ok(Json(sandbox))
}

/// Sandbox plus the settlement its completion triggered.
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// Finished sandbox.
    pub sandbox: crate::entity::Sandbox,
    /// Market settlement, when the sandbox had a market.
    pub settlement: Option<crate::betting::SettlementSummary>,
}

/// `POST /api/v1/sandboxes/:id/complete`
pub async fn complete_sandbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let (sandbox, settlement) =
        run(&state, move |engine| engine.complete_sandbox(&id, body.outcome)).await?;
    Ok(Json(CompleteResponse {
        sandbox,
        settlement,
    }))
}

// === Challenges ===

/// `POST /api/v1/challenges`
pub async fn create_challenge(
    State(state): State<AppState>,
    Json(body): Json<NewChallenge>,
) -> ApiResult<impl IntoResponse> {
    let challenge = run(&state, move |engine| engine.create_challenge(&body)).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// `GET /api/v1/challenges/:id`
pub async fn get_challenge(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let challenge = run(&state, move |engine| engine.get_challenge(&id)).await?;
    Ok(Json(challenge))
}
