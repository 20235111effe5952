use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{DataError, ElementRecord};
use crate::conjunction::{ConjunctionMessage, WorkflowSummary};
use crate::fleet::FleetHealthSnapshot;
use crate::screening::CloseApproach;
use crate::snapshot::{LivePosition, ObjectDetail, Snapshot, Trajectory};

/// A record arriving from one of the feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    Elements(ElementRecord),
    Conjunction(ConjunctionMessage),
}

impl Inbound {
    pub fn id(&self) -> &str {
        match self {
            Inbound::Elements(record) => &record.id,
            Inbound::Conjunction(message) => &message.message_id,
        }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        match self {
            Inbound::Elements(record) => record.validate(),
            Inbound::Conjunction(message) => message.validate(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InboundBatch {
    pub elements: Vec<ElementRecord>,
    pub conjunctions: Vec<ConjunctionMessage>,
    /// Id and reason for every message that failed validation.
    pub rejected: Vec<(String, DataError)>,
}

impl InboundBatch {
    pub fn len(&self) -> usize {
        self.elements.len() + self.conjunctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validates each message and routes it to its consumer. Invalid messages
/// are set aside; the rest of the batch still goes through.
pub fn route(messages: impl IntoIterator<Item = Inbound>) -> InboundBatch {
    let mut batch = InboundBatch::default();
    for message in messages {
        if let Err(e) = message.validate() {
            log::warn!("Dropping inbound message {}: {}", message.id(), e);
            batch.rejected.push((message.id().to_string(), e));
            continue;
        }
        match message {
            Inbound::Elements(record) => batch.elements.push(record),
            Inbound::Conjunction(message) => batch.conjunctions.push(message),
        }
    }
    batch
}

/// Parses a YAML or JSON document holding either one message or a list.
pub fn parse_inbound(content: &str) -> Result<Vec<Inbound>, serde_yaml::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Inbound>),
        One(Box<Inbound>),
    }

    Ok(match serde_yaml::from_str(content)? {
        OneOrMany::Many(messages) => messages,
        OneOrMany::One(message) => vec![*message],
    })
}

/// Everything the engine sends to consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    Snapshot {
        version: u64,
        epoch: DateTime<Utc>,
        positions: Vec<LivePosition>,
    },
    Detail(ObjectDetail),
    Trajectory(Trajectory),
    Alerts {
        epoch: DateTime<Utc>,
        approaches: Vec<CloseApproach>,
    },
    Conjunction(WorkflowSummary),
    Health(FleetHealthSnapshot),
}

impl Outbound {
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        Outbound::Snapshot {
            version: snapshot.version,
            epoch: snapshot.epoch,
            positions: snapshot.live_positions(),
        }
    }

    pub fn alerts(epoch: DateTime<Utc>, approaches: Vec<CloseApproach>) -> Self {
        Outbound::Alerts { epoch, approaches }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ElementSource;

    const BATCH: &str = r#"
- kind: elements
  id: sat-a
  name: SAT-A
  elements:
    format: mean
    catalog_number: 1
    epoch: 2024-03-01T00:00:00Z
    mean_motion_rev_day: 15.05
    eccentricity: 0.0001
    inclination_deg: 53.0
    raan_deg: 120.0
    arg_perigee_deg: 90.0
    mean_anomaly_deg: 0.0
    drag_term: 0.0
    mean_motion_dot: 0.0
- kind: conjunction
  message_id: cdm-1
  object_1: {id: sat-a}
  object_2: {id: deb-9, type: DEBRIS}
  tca: 2024-03-01T06:00:00Z
  miss_distance_km: 0.4
  probability: 2.0e-4
- kind: conjunction
  message_id: cdm-2
  object_1: {id: sat-a}
  object_2: {id: sat-a}
  tca: 2024-03-01T06:00:00Z
  miss_distance_km: 0.4
  probability: 2.0e-4
"#;

    #[test]
    fn routes_valid_messages_and_sets_aside_the_rest() {
        let batch = route(parse_inbound(BATCH).unwrap());
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.elements[0].elements, ElementSource::Mean(_)));
        assert_eq!(batch.conjunctions[0].object_2.object_type, "DEBRIS");
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "cdm-2");
    }

    #[test]
    fn single_json_message() {
        let json = r#"{"kind": "elements", "id": "iss", "name": "ISS",
            "elements": {"format": "tle", "line1": "1 ...", "line2": "2 ..."}}"#;
        let messages = parse_inbound(json).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), "iss");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(parse_inbound(r#"{"kind": "telemetry", "id": "x"}"#).is_err());
    }

    #[test]
    fn outbound_is_tagged() {
        let now = Utc::now();
        let value =
            serde_json::to_value(Outbound::Conjunction(WorkflowSummary::empty(now))).unwrap();
        assert_eq!(value["kind"], "conjunction");
        assert_eq!(value["status"], "GREEN");

        let value = serde_json::to_value(Outbound::snapshot(&Snapshot::empty())).unwrap();
        assert_eq!(value["kind"], "snapshot");
        assert_eq!(value["positions"].as_array().map(Vec::len), Some(0));
    }
}
