use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use super::classifier::{Tier, WorkflowThresholds};
use super::event::{ConjunctionEvent, EventKey};

const PROBABILITY_HISTORY: usize = 10;
const TREND_MIN_SAMPLES: usize = 3;
const TREND_MAJORITY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PcTrend {
    Unknown,
    Rising,
    Falling,
    Stable,
    Oscillating,
}

impl PcTrend {
    fn of(history: &VecDeque<f64>) -> Self {
        if history.len() < TREND_MIN_SAMPLES {
            return PcTrend::Unknown;
        }
        let diffs: Vec<f64> = history
            .iter()
            .zip(history.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect();
        let rising = diffs.iter().filter(|d| **d > 0.0).count();
        let falling = diffs.iter().filter(|d| **d < 0.0).count();
        let majority = diffs.len() as f64 * TREND_MAJORITY;

        if rising as f64 > majority {
            PcTrend::Rising
        } else if falling as f64 > majority {
            PcTrend::Falling
        } else if rising > 0 && falling > 0 && rising.abs_diff(falling) <= 1 {
            PcTrend::Oscillating
        } else {
            PcTrend::Stable
        }
    }
}

#[derive(Debug, Clone)]
struct AlertState {
    last_seen: DateTime<Utc>,
    above: u32,
    below: u32,
    fired: bool,
    probabilities: VecDeque<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertChange {
    pub key: EventKey,
    pub message_id: String,
    pub probability: f64,
    pub trend: PcTrend,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorReport {
    pub fired: Vec<AlertChange>,
    pub cleared: Vec<EventKey>,
    pub suppressed: Vec<AlertChange>,
    pub active: usize,
    pub tracked: usize,
}

/// Debounces conjunction alerts across refresh cycles: an alert fires after
/// `fire_after` consecutive ASSESS-or-worse observations and clears after
/// `clear_after` consecutive calmer ones.
#[derive(Debug)]
pub struct AlertMonitor {
    fire_after: u32,
    clear_after: u32,
    forget_after: Duration,
    states: HashMap<EventKey, AlertState>,
}

impl AlertMonitor {
    pub fn new(fire_after: u32, clear_after: u32, forget_after: Duration) -> Self {
        Self {
            fire_after: fire_after.max(1),
            clear_after: clear_after.max(1),
            forget_after,
            states: HashMap::new(),
        }
    }

    pub fn observe<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a ConjunctionEvent>,
        thresholds: &WorkflowThresholds,
        window: Duration,
        now: DateTime<Utc>,
    ) -> MonitorReport {
        let mut report = MonitorReport::default();

        for event in events {
            let key = event.key(window);
            let state = self.states.entry(key.clone()).or_insert_with(|| AlertState {
                last_seen: now,
                above: 0,
                below: 0,
                fired: false,
                probabilities: VecDeque::with_capacity(PROBABILITY_HISTORY),
            });
            state.last_seen = now;
            if state.probabilities.len() == PROBABILITY_HISTORY {
                state.probabilities.pop_front();
            }
            state.probabilities.push_back(event.probability);

            let elevated =
                thresholds.tier(event.probability, event.miss_distance_km) >= Tier::Assess;
            if elevated {
                state.above += 1;
                state.below = 0;
                if state.above >= self.fire_after && !state.fired {
                    let change = AlertChange {
                        key,
                        message_id: event.message_id.clone(),
                        probability: event.probability,
                        trend: PcTrend::of(&state.probabilities),
                    };
                    if change.trend == PcTrend::Oscillating {
                        report.suppressed.push(change);
                    } else {
                        state.fired = true;
                        log::info!(
                            "Conjunction alert raised for {} (Pc {:.2e})",
                            change.key.pair,
                            change.probability
                        );
                        report.fired.push(change);
                    }
                }
            } else {
                state.below += 1;
                state.above = 0;
                if state.below >= self.clear_after && state.fired {
                    state.fired = false;
                    log::info!("Conjunction alert cleared for {}", key.pair);
                    report.cleared.push(key);
                }
            }
        }

        let cutoff = now - self.forget_after;
        self.states.retain(|_, state| state.last_seen >= cutoff);
        report.active = self.states.values().filter(|state| state.fired).count();
        report.tracked = self.states.len();
        report
    }

    pub fn trend(&self, key: &EventKey) -> PcTrend {
        self.states
            .get(key)
            .map(|state| PcTrend::of(&state.probabilities))
            .unwrap_or(PcTrend::Unknown)
    }
}
