use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::elements::{CompiledElements, ElementRecord};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    pub fresh_within: Duration,
    pub stale_within: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            fresh_within: Duration::hours(6),
            stale_within: Duration::hours(24),
        }
    }
}

impl FreshnessPolicy {
    pub fn classify(&self, refreshed_at: DateTime<Utc>, now: DateTime<Utc>) -> Freshness {
        let age = now - refreshed_at;
        if age < self.fresh_within {
            Freshness::Fresh
        } else if age < self.stale_within {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// Whether the refresh feed is still delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedState {
    Live,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Decayed {
        detected_at: DateTime<Utc>,
        altitude_km: f64,
    },
}

#[derive(Debug)]
pub struct TrackedObject {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub elements: Arc<CompiledElements>,
    pub refreshed_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl TrackedObject {
    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active)
    }
}

/// Immutable view of the catalog. Cloning is a reference-count bump.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    objects: Arc<BTreeMap<String, Arc<TrackedObject>>>,
    last_refresh: Option<DateTime<Utc>>,
}

impl CatalogView {
    pub fn get(&self, id: &str) -> Option<&Arc<TrackedObject>> {
        self.objects.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TrackedObject>> {
        self.objects.values()
    }

    pub fn active(&self) -> Vec<Arc<TrackedObject>> {
        self.iter().filter(|o| o.is_active()).cloned().collect()
    }

    pub fn retired_count(&self) -> usize {
        self.iter().filter(|o| !o.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn feed_state(&self, now: DateTime<Utc>, max_silence: Duration) -> FeedState {
        match self.last_refresh {
            Some(at) if now - at <= max_silence => FeedState::Live,
            _ => FeedState::Stale,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub created: usize,
    pub refreshed: usize,
    /// Records older than the element set already held.
    pub superseded: usize,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub id: String,
    pub reason: String,
}

/// Owner of the tracked population. Readers take a [`CatalogView`]; writers
/// publish a new map so views already handed out never change.
#[derive(Debug, Default)]
pub struct ElementStore {
    catalog: RwLock<CatalogView>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> CatalogView {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies one refresh batch. Rejected records leave the last-known
    /// elements for that object in place.
    pub fn ingest(&self, records: Vec<ElementRecord>, now: DateTime<Utc>) -> IngestReport {
        let mut report = IngestReport::default();
        if records.is_empty() {
            return report;
        }

        let compiled: Vec<_> = records
            .into_iter()
            .map(|record| {
                let result = record
                    .validate()
                    .and_then(|_| CompiledElements::compile(&record.name, &record.elements));
                (record, result)
            })
            .collect();

        let mut guard = self
            .catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let objects = Arc::make_mut(&mut guard.objects);

        for (record, result) in compiled {
            let elements = match result {
                Ok(elements) => elements,
                Err(e) => {
                    log::warn!("Rejected element set for {}: {}", record.id, e);
                    report.rejected.push(RejectedRecord {
                        id: record.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let lifecycle = match objects.get(&record.id) {
                Some(existing) if existing.elements.set.epoch > elements.set.epoch => {
                    log::debug!(
                        "Ignoring element set for {} older than epoch {}",
                        record.id,
                        existing.elements.set.epoch
                    );
                    report.superseded += 1;
                    continue;
                }
                Some(existing) => {
                    report.refreshed += 1;
                    existing.lifecycle.clone()
                }
                None => {
                    report.created += 1;
                    Lifecycle::Active
                }
            };

            let object = TrackedObject {
                id: record.id.clone(),
                name: record.name,
                tag: record.tag,
                elements: Arc::new(elements),
                refreshed_at: now,
                lifecycle,
            };
            objects.insert(record.id, Arc::new(object));
        }

        guard.last_refresh = Some(now);
        log::info!(
            "Element refresh: {} new, {} refreshed, {} superseded, {} rejected",
            report.created,
            report.refreshed,
            report.superseded,
            report.rejected.len()
        );
        report
    }

    /// Marks an object as decayed. It stays in the catalog for audit.
    pub fn retire(&self, id: &str, altitude_km: f64, at: DateTime<Utc>) -> bool {
        let mut guard = self
            .catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(existing) = guard.objects.get(id) else {
            return false;
        };
        if !existing.is_active() {
            return false;
        }

        let retired = TrackedObject {
            id: existing.id.clone(),
            name: existing.name.clone(),
            tag: existing.tag.clone(),
            elements: existing.elements.clone(),
            refreshed_at: existing.refreshed_at,
            lifecycle: Lifecycle::Decayed {
                detected_at: at,
                altitude_km,
            },
        };
        Arc::make_mut(&mut guard.objects).insert(id.to_string(), Arc::new(retired));
        log::info!("Retired {} after decay at {:.1} km", id, altitude_km);
        true
    }
}
