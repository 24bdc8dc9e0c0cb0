//! Per-model crash history inside a sliding window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// One recorded crash.
#[derive(Debug, Clone, Serialize)]
struct CrashEntry {
    timestamp: DateTime<Utc>,
    reason: String,
}

/// Result of checking a model's crash history.
#[derive(Debug, Clone, Serialize)]
pub struct CrashStatus {
    /// Crashes inside the window.
    pub crash_count: usize,
    /// Whether the count has reached the circuit-breaker threshold.
    pub needs_protection: bool,
    /// Seconds since the most recent crash, if any.
    pub last_crash_secs_ago: Option<i64>,
    /// Human-readable recommendation for admin surfaces.
    pub recommendation: String,
}

/// Tracks crashes per model within a sliding window.
///
/// Entries older than the window are pruned on every touch, so the map never
/// grows past the recent-failure set.
#[derive(Debug)]
pub struct CrashTracker {
    crashes: HashMap<String, Vec<CrashEntry>>,
    threshold: usize,
    window: Duration,
}

impl CrashTracker {
    /// Create a tracker that opens the circuit at `threshold` crashes within
    /// `window_secs`.
    #[must_use]
    pub fn new(threshold: usize, window_secs: u64) -> Self {
        Self {
            crashes: HashMap::new(),
            threshold,
            window: Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX)),
        }
    }

    /// Record a crash and return the model's updated status.
    pub fn record_crash(&mut self, model_id: &str, reason: &str) -> CrashStatus {
        let entries = self.crashes.entry(model_id.to_string()).or_default();
        entries.push(CrashEntry {
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        warn!(%model_id, reason, crashes = entries.len(), "model crash recorded");
        self.check(model_id)
    }

    /// Check a model's crash history, pruning entries outside the window.
    pub fn check(&mut self, model_id: &str) -> CrashStatus {
        let cutoff = Utc::now() - self.window;

        let count;
        let last_crash_secs_ago;
        match self.crashes.get_mut(model_id) {
            Some(entries) => {
                entries.retain(|e| e.timestamp > cutoff);
                count = entries.len();
                last_crash_secs_ago = entries
                    .last()
                    .map(|e| (Utc::now() - e.timestamp).num_seconds());
                if entries.is_empty() {
                    self.crashes.remove(model_id);
                }
            },
            None => {
                count = 0;
                last_crash_secs_ago = None;
            },
        }

        let needs_protection = count >= self.threshold;
        let recommendation = if count == 0 {
            "No recent crashes".to_string()
        } else if needs_protection {
            format!(
                "Circuit breaker triggered: {count} crashes within {}s",
                self.window.num_seconds()
            )
        } else {
            format!("{count} crash(es), below threshold of {}", self.threshold)
        };

        CrashStatus {
            crash_count: count,
            needs_protection,
            last_crash_secs_ago,
            recommendation,
        }
    }

    /// Models with at least one crash inside the window.
    pub fn models_with_crashes(&mut self) -> Vec<String> {
        let cutoff = Utc::now() - self.window;
        self.crashes.retain(|_, entries| {
            entries.retain(|e| e.timestamp > cutoff);
            !entries.is_empty()
        });
        let mut models: Vec<String> = self.crashes.keys().cloned().collect();
        models.sort();
        models
    }

    /// Clear a model's history (admin action after a fix).
    pub fn clear(&mut self, model_id: &str) {
        self.crashes.remove(model_id);
    }

    /// Test helper: backdate every entry for a model.
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, model_id: &str, secs: i64) {
        if let Some(entries) = self.crashes.get_mut(model_id) {
            for entry in entries {
                entry.timestamp = entry.timestamp - Duration::seconds(secs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CrashTracker {
        CrashTracker::new(2, 300)
    }

    #[test]
    fn test_single_crash_below_threshold() {
        let mut t = tracker();
        let status = t.record_crash("model-1", "oom");
        assert_eq!(status.crash_count, 1);
        assert!(!status.needs_protection);
        assert!(status.last_crash_secs_ago.is_some());
        assert!(status.recommendation.contains("below threshold"));
    }

    #[test]
    fn test_threshold_opens_circuit() {
        let mut t = tracker();
        t.record_crash("model-1", "oom");
        let status = t.record_crash("model-1", "generation_failure");
        assert_eq!(status.crash_count, 2);
        assert!(status.needs_protection);
        assert!(status.recommendation.contains("Circuit breaker triggered"));
    }

    #[test]
    fn test_old_crashes_pruned() {
        let mut t = tracker();
        t.record_crash("model-1", "oom");
        t.backdate("model-1", 400);
        let status = t.check("model-1");
        assert_eq!(status.crash_count, 0);
        assert!(!status.needs_protection);
        assert!(status.last_crash_secs_ago.is_none());
        assert!(status.recommendation.contains("No recent crashes"));
    }

    #[test]
    fn test_mixed_old_and_new() {
        let mut t = tracker();
        t.record_crash("model-1", "old");
        t.backdate("model-1", 400);
        t.record_crash("model-1", "new");
        let status = t.check("model-1");
        assert_eq!(status.crash_count, 1);
        assert!(!status.needs_protection);
    }

    #[test]
    fn test_per_model_isolation() {
        let mut t = tracker();
        t.record_crash("model-1", "oom");
        t.record_crash("model-1", "oom");
        t.record_crash("model-2", "oom");
        assert!(t.check("model-1").needs_protection);
        assert!(!t.check("model-2").needs_protection);
    }

    #[test]
    fn test_models_with_crashes_prunes_expired() {
        let mut t = tracker();
        t.record_crash("model-1", "oom");
        t.record_crash("model-2", "oom");
        t.backdate("model-2", 400);
        assert_eq!(t.models_with_crashes(), vec!["model-1".to_string()]);
    }

    #[test]
    fn test_clear_history() {
        let mut t = tracker();
        t.record_crash("model-1", "oom");
        t.record_crash("model-1", "oom");
        t.clear("model-1");
        assert_eq!(t.check("model-1").crash_count, 0);
        // Clearing an unknown model is a no-op.
        t.clear("never-crashed");
    }

    #[test]
    fn test_custom_threshold() {
        let mut t = CrashTracker::new(3, 300);
        t.record_crash("m", "a");
        assert!(!t.record_crash("m", "b").needs_protection);
        assert!(t.record_crash("m", "c").needs_protection);
    }
}
