use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::classifier::{Classification, Tier, WorkflowThresholds};
use super::event::{ConjunctionEvent, ConjunctionMessage, EventKey};
use crate::catalog::DataError;
use crate::config::{to_chrono, WorkflowConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

impl StatusColor {
    pub fn for_tier(tier: Option<Tier>) -> Self {
        match tier {
            None | Some(Tier::Screen) => StatusColor::Green,
            Some(Tier::Assess) => StatusColor::Yellow,
            Some(Tier::Mitigate) => StatusColor::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Superseded,
    /// An older report for a key that already has a newer one.
    Outdated,
    /// The message id was already accepted.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub mitigate: usize,
    pub assess: usize,
    pub screen: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowItem {
    pub event: ConjunctionEvent,
    pub classification: Classification,
    pub time_to_tca_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub generated_at: DateTime<Utc>,
    pub status: StatusColor,
    pub highest_tier: Option<Tier>,
    pub live: usize,
    pub expired: usize,
    pub counts: TierCounts,
    /// Every live MITIGATE item, most urgent first.
    pub mitigate: Vec<WorkflowItem>,
    /// The leading live ASSESS items.
    pub assess: Vec<WorkflowItem>,
}

impl WorkflowSummary {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            status: StatusColor::Green,
            highest_tier: None,
            live: 0,
            expired: 0,
            counts: TierCounts::default(),
            mitigate: Vec::new(),
            assess: Vec::new(),
        }
    }
}

/// Latest accepted report per `(pair, TCA window)`.
#[derive(Debug)]
pub struct ConjunctionBook {
    thresholds: WorkflowThresholds,
    window: Duration,
    retention: Duration,
    max_assess: usize,
    events: BTreeMap<EventKey, ConjunctionEvent>,
    /// Accepted message ids and the TCA they refer to, for idempotent re-ingestion.
    seen: HashMap<String, DateTime<Utc>>,
}

impl ConjunctionBook {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            window: to_chrono(config.tca_window),
            retention: to_chrono(config.retention),
            max_assess: config.max_assess_items,
            events: BTreeMap::new(),
            seen: HashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &WorkflowThresholds {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &ConjunctionEvent> {
        self.events.values()
    }

    pub fn ingest(
        &mut self,
        message: ConjunctionMessage,
        ingested_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, DataError> {
        if self.seen.contains_key(&message.message_id) {
            message.validate()?;
            return Ok(IngestOutcome::Duplicate);
        }
        let event = ConjunctionEvent::from_message(message, ingested_at)?;
        let key = event.key(self.window);
        self.seen.insert(event.message_id.clone(), event.tca);

        let outcome = match self.events.get(&key) {
            None => IngestOutcome::Created,
            Some(current) if event.precedence() > current.precedence() => {
                IngestOutcome::Superseded
            }
            Some(_) => return Ok(IngestOutcome::Outdated),
        };
        log::debug!(
            "Conjunction {} for {} accepted ({:?})",
            event.message_id,
            event.pair,
            outcome
        );
        self.events.insert(key, event);
        Ok(outcome)
    }

    /// Drops events whose TCA passed more than the retention period ago.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.events.len();
        self.events.retain(|_, event| event.tca >= cutoff);
        self.seen.retain(|_, tca| *tca >= cutoff);
        before - self.events.len()
    }

    pub fn classify(&self, event: &ConjunctionEvent, now: DateTime<Utc>) -> Classification {
        self.thresholds
            .classify(event.probability, event.miss_distance_km, event.tca - now)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> WorkflowSummary {
        let mut summary = WorkflowSummary::empty(now);
        for event in self.events.values() {
            if !event.is_live(now) {
                summary.expired += 1;
                continue;
            }
            summary.live += 1;
            let classification = self.classify(event, now);
            summary.highest_tier = summary.highest_tier.max(Some(classification.tier));
            let item = WorkflowItem {
                time_to_tca_hours: (event.tca - now).num_milliseconds() as f64 / 3_600_000.0,
                event: event.clone(),
                classification,
            };
            match item.classification.tier {
                Tier::Mitigate => {
                    summary.counts.mitigate += 1;
                    summary.mitigate.push(item);
                }
                Tier::Assess => {
                    summary.counts.assess += 1;
                    summary.assess.push(item);
                }
                Tier::Screen => summary.counts.screen += 1,
            }
        }

        summary.mitigate.sort_by(rank);
        summary.assess.sort_by(rank);
        summary.assess.truncate(self.max_assess);
        summary.status = StatusColor::for_tier(summary.highest_tier);
        summary
    }
}

/// Priority, then Pc, then miss distance, then TCA, then pair.
fn rank(a: &WorkflowItem, b: &WorkflowItem) -> Ordering {
    b.classification
        .priority
        .cmp(&a.classification.priority)
        .then_with(|| b.event.probability.total_cmp(&a.event.probability))
        .then_with(|| a.event.miss_distance_km.total_cmp(&b.event.miss_distance_km))
        .then_with(|| a.event.tca.cmp(&b.event.tca))
        .then_with(|| a.event.pair.cmp(&b.event.pair))
}
