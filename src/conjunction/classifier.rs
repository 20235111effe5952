use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{humantime_duration, to_chrono};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowThresholds {
    /// Pc at or above this is MITIGATE.
    pub mitigate_probability: f64,
    /// Miss distances below this are MITIGATE whatever the Pc.
    pub hard_floor_km: f64,
    pub assess_probability: f64,
    pub assess_distance_km: f64,
    /// MITIGATE events closer than this to TCA need a maneuver now.
    #[serde(deserialize_with = "humantime_duration")]
    pub maneuver_lead_time: Duration,
}

impl Default for WorkflowThresholds {
    fn default() -> Self {
        Self {
            mitigate_probability: 1e-4,
            hard_floor_km: 1.0,
            assess_probability: 1e-5,
            assess_distance_km: 5.0,
            maneuver_lead_time: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Screen,
    Assess,
    Mitigate,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub action: &'static str,
    /// Extra separation needed to bring the miss distance out to the ASSESS
    /// distance. Only set for MITIGATE.
    pub separation_gain_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tier: Tier,
    pub priority: Priority,
    pub recommendation: Recommendation,
}

impl WorkflowThresholds {
    pub fn tier(&self, probability: f64, miss_distance_km: f64) -> Tier {
        if probability >= self.mitigate_probability || miss_distance_km < self.hard_floor_km {
            Tier::Mitigate
        } else if probability >= self.assess_probability
            || miss_distance_km < self.assess_distance_km
        {
            Tier::Assess
        } else {
            Tier::Screen
        }
    }

    /// Pure function of the three inputs.
    pub fn classify(
        &self,
        probability: f64,
        miss_distance_km: f64,
        time_to_tca: ChronoDuration,
    ) -> Classification {
        let tier = self.tier(probability, miss_distance_km);
        let (priority, action) = match tier {
            Tier::Mitigate if time_to_tca <= to_chrono(self.maneuver_lead_time) => {
                (Priority::Critical, "Execute collision avoidance maneuver")
            }
            Tier::Mitigate => (Priority::High, "Plan avoidance maneuver, notify ops"),
            Tier::Assess => (
                Priority::Medium,
                "Evaluate maneuver options, continue monitoring",
            ),
            Tier::Screen => (Priority::Low, "Continue monitoring, no action required"),
        };
        let separation_gain_km = match tier {
            Tier::Mitigate => Some((self.assess_distance_km - miss_distance_km).max(0.0)),
            _ => None,
        };
        Classification {
            tier,
            priority,
            recommendation: Recommendation {
                action,
                separation_gain_km,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_thresholds() {
        let t = WorkflowThresholds::default();
        assert_eq!(t.tier(2e-4, 20.0), Tier::Mitigate);
        assert_eq!(t.tier(0.0, 0.8), Tier::Mitigate);
        assert_eq!(t.tier(1e-5, 20.0), Tier::Assess);
        assert_eq!(t.tier(0.0, 3.0), Tier::Assess);
        assert_eq!(t.tier(1e-7, 50.0), Tier::Screen);
        assert_eq!(t.tier(0.0, 5.0), Tier::Screen);
    }

    #[test]
    fn priority_depends_on_lead_time() {
        let t = WorkflowThresholds::default();
        let soon = t.classify(0.0, 0.8, ChronoDuration::hours(3));
        assert_eq!(soon.priority, Priority::Critical);
        assert_eq!(soon.recommendation.action, "Execute collision avoidance maneuver");
        let gain = soon.recommendation.separation_gain_km.unwrap();
        assert!((gain - 4.2).abs() < 1e-12);

        let later = t.classify(0.0, 0.8, ChronoDuration::hours(48));
        assert_eq!(later.priority, Priority::High);

        let assess = t.classify(2e-5, 10.0, ChronoDuration::hours(3));
        assert_eq!(assess.priority, Priority::Medium);
        assert_eq!(assess.recommendation.separation_gain_km, None);
    }

    #[test]
    fn classification_is_repeatable() {
        let t = WorkflowThresholds::default();
        let a = t.classify(3e-4, 2.0, ChronoDuration::hours(30));
        let b = t.classify(3e-4, 2.0, ChronoDuration::hours(30));
        assert_eq!(a, b);
        assert_eq!(a.tier.to_string(), "MITIGATE");
    }
}
