use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::scan::{sort_approaches, CloseApproach};
use crate::catalog::TrackedObject;
use crate::error::EngineError;
use crate::propagate::{Propagation, Propagator, StateVector};
use crate::risk::RiskScorer;

const GOLDEN: f64 = 0.618_033_988_749_895;
const REFINE_ITERATIONS: usize = 40;

#[derive(Debug, Clone, Copy)]
pub struct NeighborQuery {
    pub start: DateTime<Utc>,
    pub horizon: Duration,
    pub step: Duration,
    pub threshold_km: f64,
    /// Slack on the perigee/apogee shell test.
    pub tolerance_km: f64,
}

/// Closest approach of each object in `others` to `target` over the query
/// window, keeping those at or below the threshold.
pub fn screen_neighbors(
    target: &TrackedObject,
    others: &[Arc<TrackedObject>],
    propagator: &Propagator,
    query: &NeighborQuery,
    scorer: &RiskScorer,
    cancel: &CancellationToken,
) -> Result<Vec<CloseApproach>, EngineError> {
    let step_ms = query.step.num_milliseconds().max(1);
    let count = (query.horizon.num_milliseconds() / step_ms).max(0) as usize;
    let epochs: Vec<DateTime<Utc>> = (0..=count)
        .map(|k| query.start + Duration::milliseconds(step_ms * k as i64))
        .collect();

    let mut target_states = Vec::with_capacity(epochs.len());
    for (k, epoch) in epochs.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match propagator.propagate(&target.id, &target.elements, *epoch)? {
            Propagation::State(state) => target_states.push(Some(state)),
            Propagation::Decayed { altitude_km, .. } if k == 0 => {
                return Err(EngineError::Decayed {
                    id: target.id.clone(),
                    altitude_km,
                })
            }
            Propagation::Decayed { .. } => target_states.push(None),
        }
    }

    let margin = query.threshold_km + query.tolerance_km;
    let target_set = &target.elements.set;
    let candidates: Vec<&Arc<TrackedObject>> = others
        .iter()
        .filter(|other| other.id != target.id && other.is_active())
        .filter(|other| {
            let set = &other.elements.set;
            set.perigee_altitude_km() <= target_set.apogee_altitude_km() + margin
                && target_set.perigee_altitude_km() <= set.apogee_altitude_km() + margin
        })
        .collect();
    log::debug!(
        "Screening {} against {} of {} objects sharing its altitude shell",
        target.id,
        candidates.len(),
        others.len()
    );

    let mut approaches: Vec<CloseApproach> = candidates
        .par_iter()
        .filter_map(|other| {
            if cancel.is_cancelled() {
                return None;
            }
            closest_approach(target, other, propagator, &epochs, &target_states, scorer)
        })
        .filter(|approach| approach.distance_km <= query.threshold_km)
        .collect();

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    sort_approaches(&mut approaches);
    Ok(approaches)
}

fn closest_approach(
    target: &TrackedObject,
    other: &TrackedObject,
    propagator: &Propagator,
    epochs: &[DateTime<Utc>],
    target_states: &[Option<StateVector>],
    scorer: &RiskScorer,
) -> Option<CloseApproach> {
    let mut best: Option<(usize, f64)> = None;
    for (k, (epoch, target_state)) in epochs.iter().zip(target_states).enumerate() {
        let Some(target_state) = target_state else {
            continue;
        };
        let state = match propagator.propagate(&other.id, &other.elements, *epoch) {
            Ok(Propagation::State(state)) => state,
            Ok(Propagation::Decayed { .. }) => continue,
            Err(e) => {
                log::debug!("Dropping {} from neighbour screen: {}", other.id, e);
                return None;
            }
        };
        let distance = target_state.distance_km(&state);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((k, distance));
        }
    }

    let (k, _) = best?;
    let lo = epochs[k.saturating_sub(1)];
    let hi = epochs[(k + 1).min(epochs.len() - 1)];
    let (a, b) = refine_minimum(target, other, propagator, lo, hi)?;
    Some(CloseApproach::between(&a, &b, scorer))
}

/// Golden-section search for the minimum separation inside `[lo, hi]`.
fn refine_minimum(
    target: &TrackedObject,
    other: &TrackedObject,
    propagator: &Propagator,
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
) -> Option<(StateVector, StateVector)> {
    let pair_at = |t: DateTime<Utc>| -> Option<(StateVector, StateVector)> {
        let a = propagator.propagate(&target.id, &target.elements, t).ok()?.state()?;
        let b = propagator.propagate(&other.id, &other.elements, t).ok()?.state()?;
        Some((a, b))
    };
    let separation = |t: DateTime<Utc>| -> f64 {
        pair_at(t)
            .map(|(a, b)| a.distance_km(&b))
            .unwrap_or(f64::INFINITY)
    };
    let offset = |from: DateTime<Utc>, ms: f64| from + Duration::milliseconds(ms.round() as i64);

    let mut a_ms = 0.0;
    let mut b_ms = (hi - lo).num_milliseconds() as f64;
    let mut c_ms = b_ms - GOLDEN * (b_ms - a_ms);
    let mut d_ms = a_ms + GOLDEN * (b_ms - a_ms);
    let mut fc = separation(offset(lo, c_ms));
    let mut fd = separation(offset(lo, d_ms));

    for _ in 0..REFINE_ITERATIONS {
        if b_ms - a_ms < 1.0 {
            break;
        }
        if fc < fd {
            b_ms = d_ms;
            d_ms = c_ms;
            fd = fc;
            c_ms = b_ms - GOLDEN * (b_ms - a_ms);
            fc = separation(offset(lo, c_ms));
        } else {
            a_ms = c_ms;
            c_ms = d_ms;
            fc = fd;
            d_ms = a_ms + GOLDEN * (b_ms - a_ms);
            fd = separation(offset(lo, d_ms));
        }
    }

    pair_at(offset(lo, (a_ms + b_ms) / 2.0))
}
