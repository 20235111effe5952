use std::collections::{HashMap, VecDeque};

use super::types::{Snapshot, TrajectoryPoint};

/// Bounded ring of recent positions per object.
#[derive(Debug, Clone, Default)]
pub struct History {
    capacity: usize,
    tracks: HashMap<String, VecDeque<TrajectoryPoint>>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tracks: HashMap::new(),
        }
    }

    /// Appends one sample per snapshot entry. An object missing from one
    /// snapshot keeps its track; see [`History::prune`].
    pub fn record(&mut self, snapshot: &Snapshot) {
        for entry in &snapshot.entries {
            let track = self
                .tracks
                .entry(entry.state.object_id.clone())
                .or_insert_with(|| VecDeque::with_capacity(self.capacity));
            if track
                .back()
                .is_some_and(|last| last.timestamp >= entry.state.epoch)
            {
                continue;
            }
            if track.len() == self.capacity {
                track.pop_front();
            }
            track.push_back(TrajectoryPoint::from(&entry.state));
        }
    }

    /// Drops tracks of objects for which `keep` is false, returning how many
    /// went.
    pub fn prune(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|id, _| keep(id));
        before - self.tracks.len()
    }

    pub fn track(&self, id: &str) -> Option<&VecDeque<TrajectoryPoint>> {
        self.tracks.get(id)
    }

    /// Up to `limit` most recent points, oldest first.
    pub fn recent_path(&self, id: &str, limit: usize) -> Vec<TrajectoryPoint> {
        self.tracks
            .get(id)
            .map(|track| {
                let skip = track.len().saturating_sub(limit);
                track.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FeedState, Freshness};
    use crate::propagate::StateVector;
    use crate::snapshot::{FailureCounts, SnapshotEntry};
    use chrono::{DateTime, Duration, Utc};

    fn snapshot(epoch: DateTime<Utc>, ids: &[&str], altitude_km: f64) -> Snapshot {
        let entries = ids
            .iter()
            .map(|id| SnapshotEntry {
                state: StateVector::from_teme(id, epoch, [6378.0 + altitude_km, 0.0, 0.0], [0.0, 7.5, 0.0]),
                freshness: Freshness::Fresh,
            })
            .collect();
        Snapshot {
            version: 1,
            epoch,
            feed: FeedState::Live,
            entries,
            failures: FailureCounts::default(),
        }
    }

    #[test]
    fn ring_is_bounded_and_ordered() {
        let mut history = History::new(3);
        let start = Utc::now();
        for i in 0..5 {
            history.record(&snapshot(start + Duration::seconds(i), &["a"], 500.0 + i as f64));
        }
        let track = history.track("a").unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track.front().unwrap().timestamp, start + Duration::seconds(2));
        assert_eq!(history.recent_path("a", 2).len(), 2);
        assert!(history.recent_path("missing", 2).is_empty());
    }

    #[test]
    fn one_missed_snapshot_keeps_the_track() {
        let mut history = History::new(10);
        let start = Utc::now();
        history.record(&snapshot(start, &["a", "b"], 500.0));
        history.record(&snapshot(start + Duration::seconds(1), &["a"], 500.0));
        history.record(&snapshot(start + Duration::seconds(2), &["a", "b"], 499.0));
        assert_eq!(history.len(), 2);
        assert_eq!(history.track("a").unwrap().len(), 3);
        assert_eq!(history.track("b").unwrap().len(), 2);
    }

    #[test]
    fn prune_drops_only_rejected_ids() {
        let mut history = History::new(3);
        history.record(&snapshot(Utc::now(), &["a", "b"], 500.0));
        assert_eq!(history.prune(|id| id != "b"), 1);
        assert!(history.track("b").is_none());
        assert!(history.track("a").is_some());
    }
}
