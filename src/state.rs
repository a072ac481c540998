use crate::board::BoardSnapshot;
use crate::error::AppError;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok { count: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub at: SystemTime,
    pub status: FetchStatus,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, FetchStatus::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSnapshot {
    pub snapshot: BoardSnapshot,
    pub published_at: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    snapshot: Option<PublishedSnapshot>,
    snapshot_tx: watch::Sender<Option<PublishedSnapshot>>,
    remote_advisories: Option<Arc<[String]>>,
    last_fetch: Option<FetchOutcome>,
}

impl AppState {
    pub fn new() -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(None);
        Self {
            snapshot: None,
            snapshot_tx,
            remote_advisories: None,
            last_fetch: None,
        }
    }

    pub fn snapshot(&self) -> Option<&PublishedSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<PublishedSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn set_snapshot(
        &mut self,
        snapshot: BoardSnapshot,
        published_at: SystemTime,
    ) -> Result<(), AppError> {
        let published = PublishedSnapshot {
            snapshot,
            published_at,
        };
        self.snapshot = Some(published.clone());
        // Nobody listening is fine; the latest value is still kept above.
        if self.snapshot_tx.receiver_count() == 0 {
            return Ok(());
        }
        self.snapshot_tx
            .send(Some(published))
            .map_err(|_| AppError::WatchSend)
    }

    /// Last non-empty list fetched from the remote source, if any.
    pub fn remote_advisories(&self) -> Option<Arc<[String]>> {
        self.remote_advisories.clone()
    }

    pub fn set_remote_advisories(&mut self, messages: Vec<String>, at: SystemTime) {
        if messages.is_empty() {
            self.record_fetch_failure("empty message list".to_string(), at);
            return;
        }
        self.last_fetch = Some(FetchOutcome {
            at,
            status: FetchStatus::Ok {
                count: messages.len(),
            },
        });
        self.remote_advisories = Some(Arc::from(messages));
    }

    pub fn record_fetch_failure(&mut self, reason: String, at: SystemTime) {
        self.last_fetch = Some(FetchOutcome {
            at,
            status: FetchStatus::Failed { reason },
        });
    }

    pub fn last_fetch(&self) -> Option<&FetchOutcome> {
        self.last_fetch.as_ref()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Headline;
    use std::time::{Duration, UNIX_EPOCH};

    fn headline(left: &str, right: &str) -> Headline {
        Headline {
            left_text: left.to_string(),
            right_text: right.to_string(),
            is_approaching: false,
            just_became_approaching: false,
        }
    }

    fn snapshot() -> BoardSnapshot {
        BoardSnapshot {
            inner: headline("Inner next arrival", "5min"),
            outer: headline("Outer next arrival", "2min"),
            advisory_a: "Please Mind the Gap".to_string(),
            advisory_b: "Report anything suspicious".to_string(),
            clock_text: "Time Now 06:30:00".to_string(),
            service_running: true,
        }
    }

    #[test]
    fn set_snapshot_updates_state_and_watch() {
        let mut state = AppState::new();
        let receiver = state.subscribe_snapshot();
        let at = UNIX_EPOCH + Duration::from_secs(10);

        assert!(state.set_snapshot(snapshot(), at).is_ok());

        assert_eq!(state.snapshot().map(|p| &p.snapshot), Some(&snapshot()));
        assert_eq!(
            receiver.borrow().as_ref().map(|p| p.published_at),
            Some(at)
        );
    }

    #[test]
    fn set_snapshot_without_subscribers_still_stores() {
        let mut state = AppState::new();

        assert!(state.set_snapshot(snapshot(), UNIX_EPOCH).is_ok());

        assert!(state.snapshot().is_some());
    }

    #[test]
    fn empty_remote_list_is_recorded_as_failure() {
        let mut state = AppState::new();
        state.set_remote_advisories(vec!["keep me".to_string()], UNIX_EPOCH);

        state.set_remote_advisories(Vec::new(), UNIX_EPOCH + Duration::from_secs(1));

        assert_eq!(
            state.remote_advisories().map(|m| m.to_vec()),
            Some(vec!["keep me".to_string()])
        );
        assert!(state.last_fetch().is_some_and(|fetch| !fetch.is_ok()));
    }
}
