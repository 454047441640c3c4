// Usage telemetry emitted by scoring runs.
//
// The account and session store lives outside this crate; the pipeline only
// hands one event per run to whatever sink the caller injects.
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

pub const SCORE_ACTION: &str = "score";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEvent {
    pub action: String,
    pub records_processed: usize,
    pub user: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn score(records_processed: usize, user: Option<&str>) -> UsageEvent {
        UsageEvent {
            action: SCORE_ACTION.to_string(),
            records_processed,
            user: user.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

pub trait UsageSink: Send + Sync {
    fn record(&self, event: &UsageEvent);
}

/// Writes every event as a structured tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, event: &UsageEvent) {
        info!(
            target: "lead_scoring::usage",
            action = %event.action,
            records_processed = event.records_processed,
            user = event.user.as_deref().unwrap_or("-"),
            timestamp = %event.timestamp.to_rfc3339(),
            "usage"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserStats {
    pub analyses: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemStats {
    pub users: usize,
    pub analyses: usize,
    pub records: usize,
}

/// In-memory usage log with the per-user and system totals the admin views
/// show.
#[derive(Debug, Default)]
pub struct UsageLedger {
    events: Mutex<Vec<UsageEvent>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn scoring_events(&self) -> Vec<UsageEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == SCORE_ACTION)
            .collect()
    }

    pub fn user_stats(&self, user: &str) -> UserStats {
        self.scoring_events()
            .iter()
            .filter(|e| e.user.as_deref() == Some(user))
            .fold(UserStats::default(), |acc, e| UserStats {
                analyses: acc.analyses + 1,
                records: acc.records + e.records_processed,
            })
    }

    pub fn system_stats(&self) -> SystemStats {
        let events = self.scoring_events();
        let users: HashSet<&str> = events.iter().filter_map(|e| e.user.as_deref()).collect();
        SystemStats {
            users: users.len(),
            analyses: events.len(),
            records: events.iter().map(|e| e.records_processed).sum(),
        }
    }
}

impl UsageSink for UsageLedger {
    fn record(&self, event: &UsageEvent) {
        // a poisoned log still holds every earlier event
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
