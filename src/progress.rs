//! Generation Progress Tracking
//!
//! Process-wide map from generation id to step, percentage and terminal
//! error, read by polling clients. Partitioned by generation id so unrelated
//! runs never contend on one lock.
//!
//! ## Lifecycle
//!
//! - Entries are created on the first update and removed by
//!   [`ProgressTracker::clear_progress`] or by the background sweep once idle
//!   longer than the configured max age.
//! - Percentage never decreases within a run. A FAILED update holds the last
//!   percentage; a COMPLETED update pins it to 100.
//! - After COMPLETED/FAILED, updates are ignored unless they restart the run
//!   with PENDING/RUNNING, which replaces the entry.
//!
//! Every accepted update is logged through `tracing` and published on a
//! broadcast channel for push-style observers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::blueprint::milestone;
use crate::constants::progress as progress_constants;
use crate::types::{BlueprintError, GenerationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Current state of one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub id: GenerationId,
    pub status: GenerationStatus,
    /// Current step label
    pub step: String,
    /// 0 - 100
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BlueprintError>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationProgress {
    fn new(id: GenerationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: GenerationStatus::Pending,
            step: String::new(),
            percentage: 0,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    fn merge(&mut self, update: ProgressUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(step) = update.step {
            self.step = step;
        }
        if let Some(percentage) = update.percentage {
            self.percentage = self.percentage.max(percentage.min(100));
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if self.status == GenerationStatus::Completed {
            self.percentage = 100;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub status: Option<GenerationStatus>,
    pub step: Option<String>,
    pub percentage: Option<u8>,
    pub error: Option<BlueprintError>,
}

impl ProgressUpdate {
    pub fn running(step: impl Into<String>, percentage: u8) -> Self {
        Self {
            status: Some(GenerationStatus::Running),
            step: Some(step.into()),
            percentage: Some(percentage),
            error: None,
        }
    }

    pub fn pending(step: impl Into<String>) -> Self {
        Self {
            status: Some(GenerationStatus::Pending),
            step: Some(step.into()),
            ..Default::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            status: Some(GenerationStatus::Completed),
            step: Some("complete".to_string()),
            percentage: Some(milestone::COMPLETE),
            error: None,
        }
    }

    pub fn failed(error: BlueprintError) -> Self {
        Self {
            status: Some(GenerationStatus::Failed),
            error: Some(error),
            ..Default::default()
        }
    }

    fn restarts_run(&self) -> bool {
        matches!(
            self.status,
            Some(GenerationStatus::Pending | GenerationStatus::Running)
        )
    }
}

/// Published for every accepted change
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Updated(GenerationProgress),
    Cleared(GenerationId),
    Expired(GenerationId),
}

struct TrackedProgress {
    progress: GenerationProgress,
    touched: Instant,
}

pub struct ProgressTracker {
    entries: DashMap<GenerationId, TrackedProgress>,
    sender: broadcast::Sender<ProgressEvent>,
}

pub type SharedProgress = Arc<ProgressTracker>;

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(progress_constants::EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            sender,
        }
    }

    /// Having no subscribers is normal operation
    #[inline]
    fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Merge `update` into the entry for `id`, creating it if absent.
    ///
    /// Returns the resulting state. Updates to a finished run that do not
    /// restart it are dropped and the unchanged state is returned.
    pub fn update_progress(&self, id: &GenerationId, update: ProgressUpdate) -> GenerationProgress {
        let (snapshot, accepted) = match self.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let tracked = occupied.get_mut();
                if tracked.progress.status.is_terminal() {
                    if update.restarts_run() {
                        let mut fresh = GenerationProgress::new(id.clone());
                        fresh.merge(update);
                        tracked.progress = fresh;
                        tracked.touched = Instant::now();
                        (tracked.progress.clone(), true)
                    } else {
                        (tracked.progress.clone(), false)
                    }
                } else {
                    tracked.progress.merge(update);
                    tracked.touched = Instant::now();
                    (tracked.progress.clone(), true)
                }
            }
            Entry::Vacant(vacant) => {
                let mut progress = GenerationProgress::new(id.clone());
                progress.merge(update);
                let snapshot = progress.clone();
                vacant.insert(TrackedProgress {
                    progress,
                    touched: Instant::now(),
                });
                (snapshot, true)
            }
        };

        if !accepted {
            tracing::debug!(
                generation_id = %id,
                status = %snapshot.status,
                "Ignoring update to finished generation"
            );
            return snapshot;
        }

        match (&snapshot.status, &snapshot.error) {
            (GenerationStatus::Failed, Some(err)) => tracing::warn!(
                generation_id = %id,
                step = %snapshot.step,
                percentage = snapshot.percentage,
                code = %err.code,
                error = %err.message,
                "Generation failed"
            ),
            (status, _) => tracing::info!(
                generation_id = %id,
                status = %status,
                step = %snapshot.step,
                percentage = snapshot.percentage,
                "Generation progress"
            ),
        }

        self.emit(ProgressEvent::Updated(snapshot.clone()));
        snapshot
    }

    pub fn get_progress(&self, id: &GenerationId) -> Option<GenerationProgress> {
        self.entries.get(id).map(|t| t.progress.clone())
    }

    /// Returns whether an entry was removed
    pub fn clear_progress(&self, id: &GenerationId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            tracing::debug!(generation_id = %id, "Progress cleared");
            self.emit(ProgressEvent::Cleared(id.clone()));
        }
        removed
    }

    /// Remove entries idle for at least `max_age`
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut expired = Vec::new();
        self.entries.retain(|id, tracked| {
            let keep = tracked.touched.elapsed() < max_age;
            if !keep {
                expired.push(id.clone());
            }
            keep
        });

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Swept idle generation progress");
        }
        let count = expired.len();
        for id in expired {
            self.emit(ProgressEvent::Expired(id));
        }
        count
    }

    /// Sweep every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tracker.sweep_expired(max_age);
                    }
                }
            }
            tracing::debug!("Progress sweeper stopped");
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;

    #[test]
    fn test_first_update_creates_entry() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        assert!(tracker.get_progress(&id).is_none());

        let state = tracker.update_progress(&id, ProgressUpdate::running("plan", 15));
        assert_eq!(state.status, GenerationStatus::Running);
        assert_eq!(state.percentage, 15);
        assert_eq!(tracker.get_progress(&id).unwrap().step, "plan");
    }

    #[test]
    fn test_partial_merge_keeps_fields() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::running("plan", 15));

        let state = tracker.update_progress(
            &id,
            ProgressUpdate {
                percentage: Some(30),
                ..Default::default()
            },
        );
        assert_eq!(state.step, "plan");
        assert_eq!(state.status, GenerationStatus::Running);
        assert_eq!(state.percentage, 30);
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::running("workflow", 50));
        let state = tracker.update_progress(&id, ProgressUpdate::running("retry", 30));
        assert_eq!(state.percentage, 50);
        assert_eq!(state.step, "retry");

        let capped = tracker.update_progress(&id, ProgressUpdate::running("x", 250));
        assert_eq!(capped.percentage, 100);
    }

    #[test]
    fn test_failure_holds_percentage_and_freezes() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::running("roadmap", 70));

        let err = BlueprintError::new(ErrorCode::AiServiceUnavailable, "down");
        let failed = tracker.update_progress(&id, ProgressUpdate::failed(err.clone()));
        assert_eq!(failed.status, GenerationStatus::Failed);
        assert_eq!(failed.percentage, 70);
        assert_eq!(failed.error, Some(err));

        let ignored = tracker.update_progress(
            &id,
            ProgressUpdate {
                percentage: Some(90),
                ..Default::default()
            },
        );
        assert_eq!(ignored.percentage, 70);
        assert_eq!(ignored.status, GenerationStatus::Failed);
    }

    #[test]
    fn test_restart_after_terminal_replaces_entry() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::completed());
        assert_eq!(tracker.get_progress(&id).unwrap().percentage, 100);

        let restarted = tracker.update_progress(&id, ProgressUpdate::running("validating", 5));
        assert_eq!(restarted.status, GenerationStatus::Running);
        assert_eq!(restarted.percentage, 5);
        assert!(restarted.error.is_none());
    }

    #[test]
    fn test_clear_makes_get_return_none() {
        let tracker = ProgressTracker::new();
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::running("plan", 15));

        assert!(tracker.clear_progress(&id));
        assert!(tracker.get_progress(&id).is_none());
        assert!(!tracker.clear_progress(&id));
    }

    #[test]
    fn test_sweep_removes_only_idle_entries() {
        let tracker = ProgressTracker::new();
        let old = GenerationId::new("old");
        tracker.update_progress(&old, ProgressUpdate::running("plan", 15));
        std::thread::sleep(Duration::from_millis(30));
        let fresh = GenerationId::new("fresh");
        tracker.update_progress(&fresh, ProgressUpdate::running("plan", 15));

        assert_eq!(tracker.sweep_expired(Duration::from_millis(20)), 1);
        assert!(tracker.get_progress(&old).is_none());
        assert!(tracker.get_progress(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let tracker = ProgressTracker::new();
        let mut events = tracker.subscribe();
        let id = GenerationId::new("g1");

        tracker.update_progress(&id, ProgressUpdate::running("plan", 15));
        tracker.clear_progress(&id);

        match events.recv().await.unwrap() {
            ProgressEvent::Updated(p) => assert_eq!(p.percentage, 15),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events.recv().await.unwrap(), ProgressEvent::Cleared(id));
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_cancelled() {
        let tracker = Arc::new(ProgressTracker::new());
        let id = GenerationId::new("g1");
        tracker.update_progress(&id, ProgressUpdate::running("plan", 15));

        let cancel = CancellationToken::new();
        let handle = tracker.spawn_sweeper(
            Duration::from_millis(10),
            Duration::from_millis(5),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tracker.get_progress(&id).is_none());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_concurrent_updates_from_many_generations() {
        let tracker = Arc::new(ProgressTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let t = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let id = GenerationId::new(format!("g{}", n));
                    for pct in 0..=100u8 {
                        t.update_progress(&id, ProgressUpdate::running("step", pct));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.len(), 8);
        for n in 0..8 {
            let id = GenerationId::new(format!("g{}", n));
            assert_eq!(tracker.get_progress(&id).unwrap().percentage, 100);
        }
    }
}
