use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use uuid::Uuid;

use prato_core::error::ExportError;
use prato_core::export::ExportFormat;
use prato_core::models::MealRecord;
use prato_core::selection::{SelectionPhase, SelectionState};
use prato_core::service::{MealReport, NutrientService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

struct Session {
    state: SelectionState,
    last_seen: Instant,
}

#[derive(Clone)]
struct AppState {
    service: Arc<NutrientService>,
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    /// Sessions idle for longer than this are dropped on the next access.
    session_ttl: Duration,
}

impl AppState {
    fn new(service: NutrientService, session_ttl: Duration) -> Self {
        Self {
            service: Arc::new(service),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            session_ttl,
        }
    }

    /// Lock the session map, evicting idle sessions first.
    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() < self.session_ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired, "expired idle sessions");
        }
        sessions
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct FoodQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct SelectionRequest {
    foods: Vec<String>,
    date: Option<String>,
}

#[derive(Serialize)]
struct SessionView {
    id: Uuid,
    phase: SelectionPhase,
    #[serde(flatten)]
    state: SelectionState,
}

impl SessionView {
    fn new(id: Uuid, state: &SelectionState) -> Self {
        Self {
            id,
            phase: state.phase(),
            state: state.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        Self::Internal(err.into())
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Session helpers ---

/// Run `f` against one session while holding the session lock. Any access
/// counts as activity.
fn with_session<T>(
    state: &AppState,
    id: Uuid,
    f: impl FnOnce(&mut SelectionState) -> T,
) -> Result<T, ApiError> {
    let mut sessions = state.lock_sessions();
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {id} not found")))?;
    session.last_seen = Instant::now();
    Ok(f(&mut session.state))
}

/// The session's report, or 409 while its selection is unconfirmed.
fn confirmed_report(state: &AppState, id: Uuid) -> Result<MealReport, ApiError> {
    let session = with_session(state, id, |s| s.clone())?;
    state.service.report(&session).ok_or_else(|| {
        ApiError::Conflict("Selection must be confirmed before results are available".to_string())
    })
}

fn parse_date(date_str: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))
}

// --- Handlers ---

async fn search_foods(
    State(state): State<AppState>,
    Query(params): Query<FoodQuery>,
) -> Json<Vec<String>> {
    let names = match params.q.as_deref() {
        Some(q) => state.service.search_foods(q),
        None => state.service.food_names(),
    };
    Json(names.into_iter().map(str::to_string).collect())
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let id = Uuid::new_v4();
    let session = SelectionState::default();
    let view = SessionView::new(id, &session);
    state.lock_sessions().insert(
        id,
        Session {
            state: session,
            last_seen: Instant::now(),
        },
    );
    info!(%id, "session created");
    (StatusCode::CREATED, Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let view = with_session(&state, id, |s| SessionView::new(id, s))?;
    Ok(Json(view))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = state.lock_sessions().remove(&id);
    if removed.is_some() {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session {id} not found")))
    }
}

async fn update_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let date = req.date.as_deref().map(parse_date).transpose()?;
    let view = with_session(&state, id, |s| {
        s.select(req.foods);
        if let Some(date) = date {
            s.set_date(date);
        }
        SessionView::new(id, s)
    })?;
    Ok(Json(view))
}

async fn confirm_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let view = with_session(&state, id, |s| {
        s.confirm();
        SessionView::new(id, s)
    })?;
    Ok(Json(view))
}

async fn save_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<MealRecord>), ApiError> {
    let meal = with_session(&state, id, |s| s.save_meal().clone())?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn clear_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let view = with_session(&state, id, |s| {
        s.clear();
        SessionView::new(id, s)
    })?;
    Ok(Json(view))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MealReport>, ApiError> {
    Ok(Json(confirmed_report(&state, id)?))
}

/// `{chart}` is `bar` or the 0-based pie index in nutrient column order.
async fn get_chart(
    State(state): State<AppState>,
    Path((id, chart)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let report = confirmed_report(&state, id)?;
    let chart = if chart == "bar" {
        &report.bar_chart
    } else {
        let index: usize = chart
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Unknown chart '{chart}'. Use bar or 0-5")))?;
        let pie = report
            .pies
            .get(index)
            .ok_or_else(|| ApiError::NotFound(format!("No chart at index {index}")))?;
        pie.chart().ok_or_else(|| {
            ApiError::NotFound(format!("Gráfico de {}: Sem Dados", pie.nutrient()))
        })?
    };

    let chart = chart.clone();
    let png = tokio::task::spawn_blocking(move || chart.to_png())
        .await
        .context("chart rendering task failed")??;
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))], png).into_response())
}

async fn get_export(
    State(state): State<AppState>,
    Path((id, format)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format.parse().map_err(ApiError::BadRequest)?;
    let report = confirmed_report(&state, id)?;
    let export = tokio::task::spawn_blocking(move || report.export(format))
        .await
        .context("export task failed")??;
    info!(%id, file = %export.file_name, bytes = export.bytes.len(), "export served");

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        export.file_name
    ))
    .context("invalid export file name")?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(export.mime)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/foods", get(search_foods))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/{id}/selection", put(update_selection))
        .route("/api/sessions/{id}/confirm", post(confirm_selection))
        .route("/api/sessions/{id}/meals", post(save_meal))
        .route("/api/sessions/{id}/clear", post(clear_selection))
        .route("/api/sessions/{id}/report", get(get_report))
        .route("/api/sessions/{id}/charts/{chart}", get(get_chart))
        .route("/api/sessions/{id}/export/{format}", get(get_export))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: NutrientService,
    port: u16,
    bind: &str,
    session_ttl: Duration,
) -> anyhow::Result<()> {
    let foods = service.table().len();
    let state = AppState::new(service, session_ttl);

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port} ({foods} foods loaded)");
    axum::serve(listener, app).await?;

    Ok(())
}
