use crate::api::responses::{
    AdvisoriesResponse, AdvisorySourceHealth, BoardErrorCode, BoardErrorResponse,
    BoardSuccessResponse, HeadlineResponse, HeadlinesResponse, HealthErrorCode,
    HealthErrorResponse, HealthStatus, HealthSuccessResponse,
};
use crate::api::{ApiState, RenderOptions};
use crate::line::Headline;
use crate::state::{AppState, FetchOutcome, FetchStatus, PublishedSnapshot};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
/// A snapshot older than this means the tick loop has stalled.
const STALE_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum BoardResponse {
    Success(BoardSuccessResponse),
    Error {
        status: StatusCode,
        body: BoardErrorResponse,
    },
}

impl IntoResponse for BoardResponse {
    fn into_response(self) -> Response {
        match self {
            BoardResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            BoardResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_board(State(state): State<ApiState>) -> impl IntoResponse {
    build_board_response(state.app, state.render)
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    build_health_response(state.app, SystemTime::now())
}

fn build_board_response(state: Arc<RwLock<AppState>>, render: RenderOptions) -> BoardResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("state lock poisoned while reading snapshot");
        }
    };
    let published = guard.snapshot().cloned();
    drop(guard);

    match published {
        Some(published) => success_response(&published, render),
        None => not_ready_response(SystemTime::now()),
    }
}

fn success_response(published: &PublishedSnapshot, render: RenderOptions) -> BoardResponse {
    let timestamp = match format_timestamp(published.published_at) {
        Ok(formatted) => formatted,
        Err(_err) => return internal_error("timestamp formatting failure"),
    };
    let snapshot = &published.snapshot;
    BoardResponse::Success(BoardSuccessResponse {
        headlines: HeadlinesResponse {
            inner: map_headline(&snapshot.inner, render),
            outer: map_headline(&snapshot.outer, render),
        },
        advisories: AdvisoriesResponse {
            a: render_text(&snapshot.advisory_a, render),
            b: render_text(&snapshot.advisory_b, render),
        },
        clock_text: render_text(&snapshot.clock_text, render),
        service_running: snapshot.service_running,
        timestamp,
    })
}

fn map_headline(headline: &Headline, render: RenderOptions) -> HeadlineResponse {
    HeadlineResponse {
        left_text: render_text(&headline.left_text, render),
        right_text: render_text(&headline.right_text, render),
        is_approaching: headline.is_approaching,
        just_became_approaching: headline.just_became_approaching,
    }
}

fn render_text(text: &str, render: RenderOptions) -> String {
    if render.zero_as_letter_o {
        text.replace('0', "O")
    } else {
        text.to_string()
    }
}

fn not_ready_response(timestamp: SystemTime) -> BoardResponse {
    match format_timestamp(timestamp) {
        Ok(formatted) => BoardResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: BoardErrorResponse {
                error_code: BoardErrorCode::NotReady,
                error_message: "Board has not produced a snapshot yet".to_string(),
                timestamp: formatted,
            },
        },
        Err(_err) => internal_error("timestamp formatting failure"),
    }
}

fn internal_error(message: &str) -> BoardResponse {
    error!(
        message = message,
        "Internal error while handling /api/board"
    );
    BoardResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: BoardErrorResponse {
            error_code: BoardErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: now_or_epoch(),
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

fn now_or_epoch() -> String {
    format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    })
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return health_internal_error("state lock poisoned while reading health");
        }
    };

    let status = derive_health_status(guard.snapshot(), guard.last_fetch(), now);
    let cached_messages = guard.remote_advisories().map_or(0, |messages| messages.len());
    let last_fetch = guard.last_fetch().cloned();
    drop(guard);

    let advisory_source = match last_fetch {
        Some(fetch) => match map_fetch(&fetch, cached_messages) {
            Ok(mapped) => Some(mapped),
            Err(_) => return health_internal_error("timestamp formatting failure"),
        },
        None => None,
    };

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return health_internal_error("timestamp formatting failure");
        }
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            advisory_source,
            timestamp,
        },
    }
}

fn derive_health_status(
    snapshot: Option<&PublishedSnapshot>,
    last_fetch: Option<&FetchOutcome>,
    now: SystemTime,
) -> HealthStatus {
    let Some(snapshot) = snapshot else {
        return HealthStatus::Ko;
    };
    let age = now
        .duration_since(snapshot.published_at)
        .unwrap_or(Duration::ZERO);
    if age > STALE_AFTER {
        return HealthStatus::Ko;
    }
    match last_fetch {
        Some(fetch) if !fetch.is_ok() => HealthStatus::Degraded,
        _ => HealthStatus::Ok,
    }
}

fn map_fetch(
    fetch: &FetchOutcome,
    cached_messages: usize,
) -> Result<AdvisorySourceHealth, TimestampError> {
    let error_message = match &fetch.status {
        FetchStatus::Ok { .. } => None,
        FetchStatus::Failed { reason } => Some(reason.clone()),
    };
    Ok(AdvisorySourceHealth {
        last_fetch_ok: fetch.is_ok(),
        last_fetch_at: format_timestamp(fetch.at)?,
        error_message,
        cached_messages,
    })
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(
        message = message,
        "Internal error while handling /api/health"
    );
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: now_or_epoch(),
        },
    }
}
