use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct HeadlineResponse {
    pub left_text: String,
    pub right_text: String,
    pub is_approaching: bool,
    /// True only on the tick the line entered the approaching state.
    pub just_became_approaching: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HeadlinesResponse {
    pub inner: HeadlineResponse,
    pub outer: HeadlineResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AdvisoriesResponse {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BoardSuccessResponse {
    pub headlines: HeadlinesResponse,
    pub advisories: AdvisoriesResponse,
    pub clock_text: String,
    pub service_running: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BoardErrorResponse {
    pub error_code: BoardErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardErrorCode {
    NotReady,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory_source: Option<AdvisorySourceHealth>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AdvisorySourceHealth {
    pub last_fetch_ok: bool,
    pub last_fetch_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub cached_messages: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthErrorResponse {
    pub error_code: HealthErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthErrorCode {
    InternalError,
}
