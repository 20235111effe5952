use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::station::GroundStation;
use super::visibility::{exact_look_angles, LookAngles};
use crate::catalog::TrackedObject;
use crate::error::EngineError;
use crate::propagate::frames::round2;
use crate::propagate::{Propagation, Propagator};

/// Sampling interval while walking the window; shorter than any LEO pass.
const COARSE_STEP_SECONDS: i64 = 60;
/// AOS and LOS are resolved to this precision.
const FINE_STEP_SECONDS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pass {
    pub station: String,
    pub object_id: String,
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    /// Time of maximum elevation.
    pub culmination: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub aos_azimuth_deg: f64,
    pub los_azimuth_deg: f64,
    pub duration_seconds: i64,
}

struct PassSearch<'a> {
    station: &'a GroundStation,
    object: &'a TrackedObject,
    propagator: &'a Propagator,
}

impl PassSearch<'_> {
    /// Unrounded look angles, or `None` once the object has decayed.
    fn sample(&self, at: DateTime<Utc>) -> Result<Option<LookAngles>, EngineError> {
        match self
            .propagator
            .propagate(&self.object.id, &self.object.elements, at)?
        {
            Propagation::State(state) => Ok(Some(exact_look_angles(self.station, &state))),
            Propagation::Decayed { .. } => Ok(None),
        }
    }

    fn above_mask(&self, look: &Option<LookAngles>) -> bool {
        look.is_some_and(|l| l.elevation_deg >= self.station.min_elevation_deg)
    }

    /// Narrows a mask crossing bracketed by two coarse samples. A decayed
    /// sample counts as below the mask. Returns the edge inside the pass and
    /// its azimuth.
    fn refine_crossing(
        &self,
        before: DateTime<Utc>,
        after: DateTime<Utc>,
        rising: bool,
    ) -> Result<(DateTime<Utc>, f64), EngineError> {
        let mut low = before;
        let mut high = after;

        while (high - low).num_seconds() > FINE_STEP_SECONDS {
            let mid = low + (high - low) / 2;
            let above = self.above_mask(&self.sample(mid)?);
            if above == rising {
                high = mid;
            } else {
                low = mid;
            }
        }

        let edge = if rising { high } else { low };
        let azimuth = self.sample(edge)?.map(|l| l.azimuth_deg).unwrap_or(0.0);
        Ok((edge, round2(azimuth)))
    }
}

/// Passes of `object` over `station` between `start` and `end`, at most
/// `max_passes`. A pass counts when the object clears the station mask.
pub fn predict_passes(
    station: &GroundStation,
    object: &TrackedObject,
    propagator: &Propagator,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_passes: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Pass>, EngineError> {
    let search = PassSearch {
        station,
        object,
        propagator,
    };
    let coarse_step = Duration::seconds(COARSE_STEP_SECONDS);
    let mut passes = Vec::new();
    let mut cursor = start;
    let mut prev_visible = false;
    let mut open: Option<(DateTime<Utc>, f64)> = None;
    let mut max_el = f64::NEG_INFINITY;
    let mut max_el_time = start;

    while cursor <= end && passes.len() < max_passes {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let look = search.sample(cursor)?;
        if look.is_none() {
            log::debug!("{} decayed during pass search at {}", object.id, cursor);
            break;
        }
        let visible = search.above_mask(&look);
        let elevation = look.map(|l| l.elevation_deg).unwrap_or(f64::NEG_INFINITY);

        if visible && !prev_visible {
            open = Some(if cursor == start {
                (start, round2(look.map(|l| l.azimuth_deg).unwrap_or(0.0)))
            } else {
                search.refine_crossing(cursor - coarse_step, cursor, true)?
            });
            max_el = elevation;
            max_el_time = cursor;
        } else if visible && elevation > max_el {
            max_el = elevation;
            max_el_time = cursor;
        } else if !visible && prev_visible {
            if let Some((aos, aos_az)) = open.take() {
                let (los, los_az) = search.refine_crossing(cursor - coarse_step, cursor, false)?;
                passes.push(Pass {
                    station: station.name.clone(),
                    object_id: object.id.clone(),
                    aos,
                    los,
                    culmination: max_el_time,
                    max_elevation_deg: round2(max_el),
                    aos_azimuth_deg: aos_az,
                    los_azimuth_deg: los_az,
                    duration_seconds: (los - aos).num_seconds(),
                });
            }
        }

        prev_visible = visible;
        cursor += coarse_step;
    }

    // Window closed mid-pass: report it cut at the last sample.
    if let Some((aos, aos_az)) = open {
        if passes.len() < max_passes {
            let last = end.min(cursor - coarse_step);
            let los_az = round2(search.sample(last)?.map(|l| l.azimuth_deg).unwrap_or(0.0));
            passes.push(Pass {
                station: station.name.clone(),
                object_id: object.id.clone(),
                aos,
                los: last,
                culmination: max_el_time,
                max_elevation_deg: round2(max_el),
                aos_azimuth_deg: aos_az,
                los_azimuth_deg: los_az,
                duration_seconds: (last - aos).num_seconds(),
            });
        }
    }

    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::catalog::{ElementRecord, ElementSource, ElementStore};

    fn leo_object(now: DateTime<Utc>) -> std::sync::Arc<TrackedObject> {
        let store = ElementStore::new();
        store.ingest(
            vec![ElementRecord {
                id: "leo".to_string(),
                name: "LEO".to_string(),
                tag: String::new(),
                elements: ElementSource::Mean(leo_set(1, now, 0.0)),
            }],
            now,
        );
        store.view().get("leo").cloned().unwrap()
    }

    #[test]
    fn finds_passes_with_ordered_bounds() {
        let now = Utc::now();
        let object = leo_object(now);
        // 53 deg inclination passes over mid latitudes several times a day.
        let station = GroundStation::new("Cape Canaveral", 28.49, -80.58, 10.0);
        let passes = predict_passes(
            &station,
            &object,
            &Propagator::default(),
            now,
            now + Duration::hours(24),
            20,
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(!passes.is_empty());
        for pass in &passes {
            assert!(pass.aos <= pass.culmination && pass.culmination <= pass.los);
            assert!(pass.max_elevation_deg >= 10.0);
            assert!(pass.duration_seconds < 20 * 60);
        }
        assert!(passes.windows(2).all(|w| w[0].los < w[1].aos));
    }

    #[test]
    fn respects_pass_limit_and_cancellation() {
        let now = Utc::now();
        let object = leo_object(now);
        let station = GroundStation::new("Cape Canaveral", 28.49, -80.58, 10.0);
        let limited = predict_passes(
            &station,
            &object,
            &Propagator::default(),
            now,
            now + Duration::hours(24),
            1,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(limited.len() <= 1);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = predict_passes(
            &station,
            &object,
            &Propagator::default(),
            now,
            now + Duration::hours(24),
            20,
            &cancel,
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
