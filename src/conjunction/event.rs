use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::DataError;
use crate::screening::PairKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub object_type: String,
}

/// A conjunction report as delivered by the message feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionMessage {
    pub message_id: String,
    pub object_1: ObjectRef,
    pub object_2: ObjectRef,
    pub tca: DateTime<Utc>,
    pub miss_distance_km: f64,
    pub probability: f64,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub relative_speed_km_s: Option<f64>,
}

impl ConjunctionMessage {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.message_id.trim().is_empty() {
            return Err(DataError::Record("empty message id".to_string()));
        }
        if self.object_1.id.trim().is_empty() || self.object_2.id.trim().is_empty() {
            return Err(DataError::Record("empty object id".to_string()));
        }
        if self.object_1.id == self.object_2.id {
            return Err(DataError::Record(format!(
                "message {} pairs {} with itself",
                self.message_id, self.object_1.id
            )));
        }
        if !self.miss_distance_km.is_finite() {
            return Err(DataError::NonFinite("miss_distance_km"));
        }
        if !self.probability.is_finite() {
            return Err(DataError::NonFinite("probability"));
        }
        if self.miss_distance_km < 0.0 {
            return Err(DataError::Record(format!(
                "negative miss distance {}",
                self.miss_distance_km
            )));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(DataError::Record(format!(
                "probability {} is outside [0, 1]",
                self.probability
            )));
        }
        if let Some(speed) = self.relative_speed_km_s {
            if !speed.is_finite() || speed < 0.0 {
                return Err(DataError::NonFinite("relative_speed_km_s"));
            }
        }
        Ok(())
    }
}

/// Identity of one encounter: the pair and the TCA window it falls in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventKey {
    pub pair: PairKey,
    pub window: i64,
}

impl EventKey {
    pub fn new(pair: PairKey, tca: DateTime<Utc>, window: Duration) -> Self {
        let window_ms = window.num_milliseconds().max(1);
        Self {
            pair,
            window: tca.timestamp_millis().div_euclid(window_ms),
        }
    }
}

/// An accepted conjunction report. Never mutated; a newer report for the
/// same key replaces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConjunctionEvent {
    pub pair: PairKey,
    /// Object references in pair order.
    pub objects: [ObjectRef; 2],
    pub message_id: String,
    pub tca: DateTime<Utc>,
    pub miss_distance_km: f64,
    pub probability: f64,
    pub emergency: bool,
    pub relative_speed_km_s: Option<f64>,
    pub ingested_at: DateTime<Utc>,
}

impl ConjunctionEvent {
    pub fn from_message(
        message: ConjunctionMessage,
        ingested_at: DateTime<Utc>,
    ) -> Result<Self, DataError> {
        message.validate()?;
        let pair = PairKey::new(&message.object_1.id, &message.object_2.id);
        let objects = if pair.primary == message.object_1.id {
            [message.object_1, message.object_2]
        } else {
            [message.object_2, message.object_1]
        };
        Ok(Self {
            pair,
            objects,
            message_id: message.message_id,
            tca: message.tca,
            miss_distance_km: message.miss_distance_km,
            probability: message.probability,
            emergency: message.emergency,
            relative_speed_km_s: message.relative_speed_km_s,
            ingested_at,
        })
    }

    pub fn key(&self, window: Duration) -> EventKey {
        EventKey::new(self.pair.clone(), self.tca, window)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.tca >= now
    }

    /// Ordering used to decide which of two reports for one key wins.
    pub fn precedence(&self) -> (DateTime<Utc>, &str) {
        (self.ingested_at, self.message_id.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn message(id: &str, a: &str, b: &str, tca: DateTime<Utc>, miss: f64, pc: f64) -> ConjunctionMessage {
        ConjunctionMessage {
            message_id: id.to_string(),
            object_1: ObjectRef {
                id: a.to_string(),
                name: a.to_uppercase(),
                object_type: "PAYLOAD".to_string(),
            },
            object_2: ObjectRef {
                id: b.to_string(),
                name: b.to_uppercase(),
                object_type: "DEBRIS".to_string(),
            },
            tca,
            miss_distance_km: miss,
            probability: pc,
            emergency: false,
            relative_speed_km_s: Some(10.0),
        }
    }
}
