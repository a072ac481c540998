//! Remote advisory lists.
//!
//! A [`MessageSource`] is polled on its own interval, well away from the
//! per-second tick. Successful non-empty results replace the last-known-good
//! list in [`AppState`]; failures are logged and leave that list alone, so the
//! board keeps showing the previous (or the configured) messages.

use crate::error::AppError;
use crate::state::AppState;
use reqwest::{Client, Url};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{info, warn};

const GVIZ_BASE: &str = "https://docs.google.com/spreadsheets/d";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source returned no messages")]
    Empty,
}

pub trait MessageSource: Send + Sync {
    fn describe(&self) -> String;

    fn fetch(&self) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;
}

/// CSV export of a spreadsheet; the first column of each row is one message.
#[derive(Debug, Clone)]
pub struct SheetSource {
    client: Client,
    url: Url,
}

impl SheetSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let url = Url::parse(url).map_err(|err| SourceError::InvalidUrl(err.to_string()))?;
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }

    /// CSV endpoint for a Google Sheets tab.
    pub fn google_sheet(
        sheet_id: &str,
        sheet_name: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let base = format!("{GVIZ_BASE}/{sheet_id}/gviz/tq");
        let url = Url::parse_with_params(&base, &[("tqx", "out:csv"), ("sheet", sheet_name)])
            .map_err(|err| SourceError::InvalidUrl(err.to_string()))?;
        Self::new(url.as_str(), timeout)
    }
}

impl MessageSource for SheetSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self) -> Result<Vec<String>, SourceError> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let messages = parse_first_column(&body);
        if messages.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(messages)
    }
}

/// First CSV field of every non-blank line, unquoted and trimmed.
pub fn parse_first_column(csv: &str) -> Vec<String> {
    csv.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(first_field)
        .filter(|field| !field.is_empty())
        .collect()
}

fn first_field(line: &str) -> String {
    let Some(quoted) = line.strip_prefix('"') else {
        return line.split(',').next().unwrap_or_default().trim().to_string();
    };

    let mut field = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                field.push('"');
                chars.next();
            } else {
                break;
            }
        } else {
            field.push(c);
        }
    }
    field.trim().to_string()
}

/// Fetch once and fold the outcome into shared state.
pub async fn refresh_once<S: MessageSource>(
    source: &S,
    state: &Arc<RwLock<AppState>>,
) -> Result<(), AppError> {
    let outcome = source.fetch().await;
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    match outcome {
        Ok(messages) => {
            info!(
                source = %source.describe(),
                count = messages.len(),
                "Remote advisories refreshed"
            );
            guard.set_remote_advisories(messages, SystemTime::now());
        }
        Err(err) => {
            warn!(
                source = %source.describe(),
                error = %err,
                "Remote advisory fetch failed, keeping last known messages"
            );
            guard.record_fetch_failure(err.to_string(), SystemTime::now());
        }
    }
    Ok(())
}

/// Poll `source` every `interval`, starting immediately.
pub fn spawn_feed_refresh<S>(
    source: S,
    state: Arc<RwLock<AppState>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: MessageSource + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_once(&source, &state).await {
                warn!("Error refreshing remote advisories: {}", e);
            }
        }
    })
}
