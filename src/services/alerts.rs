use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_HISTORY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub source: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub message: String,
    pub occurrences: u32,
    pub raised_at: String,
    pub last_seen_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

/// Operational alerts shown on the admin monitoring view. One active alert
/// per source; repeats bump `occurrences` instead of stacking.
pub struct AlertCenter {
    active: RwLock<Vec<Alert>>,
    history: RwLock<VecDeque<Alert>>,
    max_history: usize,
}

impl Default for AlertCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertCenter {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history: MAX_HISTORY,
        }
    }

    pub fn raise(&self, source: &str, severity: AlertSeverity, message: impl Into<String>) -> Alert {
        let message = message.into();
        let now = Utc::now().to_rfc3339();

        let mut active = self.active.write();
        if let Some(existing) = active.iter_mut().find(|a| a.source == source) {
            existing.occurrences += 1;
            existing.message = message;
            existing.last_seen_at = now;
            if severity_rank(severity) > severity_rank(existing.severity) {
                existing.severity = severity;
            }
            return existing.clone();
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            severity,
            status: AlertStatus::Active,
            message,
            occurrences: 1,
            raised_at: now.clone(),
            last_seen_at: now,
            resolved_at: None,
        };
        active.push(alert.clone());
        drop(active);

        match severity {
            AlertSeverity::Error => tracing::error!(source, message = %alert.message, "alert raised"),
            AlertSeverity::Warning => tracing::warn!(source, message = %alert.message, "alert raised"),
            AlertSeverity::Info => tracing::info!(source, message = %alert.message, "alert raised"),
        }

        self.push_history(alert.clone());
        alert
    }

    /// Active alerts, most severe first.
    pub fn active(&self) -> Vec<Alert> {
        let mut alerts = self.active.read().clone();
        alerts.sort_by(|a, b| severity_rank(b.severity).cmp(&severity_rank(a.severity)));
        alerts
    }

    pub fn history(&self, limit: usize) -> Vec<Alert> {
        self.history.read().iter().take(limit).cloned().collect()
    }

    pub fn resolve(&self, id: &str) -> Option<Alert> {
        let mut active = self.active.write();
        let pos = active.iter().position(|a| a.id == id)?;
        let mut resolved = active.remove(pos);
        drop(active);

        resolved.status = AlertStatus::Resolved;
        resolved.resolved_at = Some(Utc::now().to_rfc3339());
        self.push_history(resolved.clone());
        Some(resolved)
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    fn push_history(&self, alert: Alert) {
        let mut history = self.history.write();
        history.push_front(alert);
        while history.len() > self.max_history {
            history.pop_back();
        }
    }
}

fn severity_rank(severity: AlertSeverity) -> u8 {
    match severity {
        AlertSeverity::Info => 0,
        AlertSeverity::Warning => 1,
        AlertSeverity::Error => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_dedupes_by_source() {
        let center = AlertCenter::new();
        let first = center.raise("recorder", AlertSeverity::Warning, "write failed");
        let second = center.raise("recorder", AlertSeverity::Error, "write failed again");

        assert_eq!(first.id, second.id);
        assert_eq!(second.occurrences, 2);
        assert_eq!(second.severity, AlertSeverity::Error);
        assert_eq!(center.active_count(), 1);
        assert_eq!(center.history(10).len(), 1);
    }

    #[test]
    fn test_active_sorted_by_severity() {
        let center = AlertCenter::new();
        center.raise("a", AlertSeverity::Info, "fyi");
        center.raise("b", AlertSeverity::Error, "broken");
        center.raise("c", AlertSeverity::Warning, "slow");

        let order: Vec<_> = center.active().into_iter().map(|a| a.source).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_resolve_moves_to_history() {
        let center = AlertCenter::new();
        let alert = center.raise("dashboard", AlertSeverity::Warning, "lessons source failed");

        let resolved = center.resolve(&alert.id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(center.active_count(), 0);
        assert!(center.resolve(&alert.id).is_none());

        let history = center.history(10);
        assert_eq!(history[0].status, AlertStatus::Resolved);
    }

    #[test]
    fn test_history_is_bounded() {
        let center = AlertCenter::new();
        for i in 0..(MAX_HISTORY + 20) {
            let alert = center.raise(&format!("src-{i}"), AlertSeverity::Info, "x");
            center.resolve(&alert.id);
        }
        assert_eq!(center.history(usize::MAX).len(), MAX_HISTORY);
    }
}
