use serde::{Deserialize, Serialize};

use crate::snapshot::TrajectoryPoint;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendThresholds {
    /// Fewer history points than this leave the trend UNKNOWN.
    pub min_samples: usize,
    /// Shorter history spans than this leave the trend UNKNOWN.
    pub min_span_minutes: f64,
    pub raising_km_day: f64,
    /// Rates at or below the negative of this are DECAYING.
    pub decaying_km_day: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            min_samples: 10,
            min_span_minutes: 30.0,
            raising_km_day: 1.0,
            decaying_km_day: 1.0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AltitudeTrend {
    Raising,
    Stable,
    Decaying,
    Unknown,
}

/// Least-squares altitude rate over the points, in km/day.
pub fn altitude_rate_km_day<'a>(points: impl IntoIterator<Item = &'a TrajectoryPoint>) -> Option<f64> {
    let points: Vec<&TrajectoryPoint> = points.into_iter().collect();
    let origin = points.first()?.timestamp;

    let n = points.len() as f64;
    let xs: Vec<f64> = points
        .iter()
        .map(|p| (p.timestamp - origin).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY)
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.altitude_km).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, p) in xs.iter().zip(&points) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (p.altitude_km - mean_y);
    }
    if sxx <= 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendEstimate {
    pub trend: AltitudeTrend,
    pub rate_km_day: Option<f64>,
}

impl TrendThresholds {
    pub fn classify_rate(&self, rate_km_day: f64) -> AltitudeTrend {
        if rate_km_day >= self.raising_km_day {
            AltitudeTrend::Raising
        } else if rate_km_day <= -self.decaying_km_day {
            AltitudeTrend::Decaying
        } else {
            AltitudeTrend::Stable
        }
    }

    pub fn estimate<'a, I>(&self, points: I) -> TrendEstimate
    where
        I: IntoIterator<Item = &'a TrajectoryPoint>,
        I::IntoIter: ExactSizeIterator + Clone,
    {
        let points = points.into_iter();
        let unknown = TrendEstimate {
            trend: AltitudeTrend::Unknown,
            rate_km_day: None,
        };
        if points.len() < self.min_samples.max(2) {
            return unknown;
        }
        let mut ends = points.clone();
        let (Some(first), Some(last)) = (ends.next(), ends.last()) else {
            return unknown;
        };
        let span_minutes = (last.timestamp - first.timestamp).num_seconds() as f64 / 60.0;
        if span_minutes < self.min_span_minutes {
            return unknown;
        }
        match altitude_rate_km_day(points) {
            Some(rate) => TrendEstimate {
                trend: self.classify_rate(rate),
                rate_km_day: Some(rate),
            },
            None => unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn track(rate_km_day: f64, count: usize, step: Duration) -> Vec<TrajectoryPoint> {
        let start = Utc::now();
        (0..count)
            .map(|k| {
                let elapsed_days = (step * k as i32).num_seconds() as f64 / SECONDS_PER_DAY;
                TrajectoryPoint {
                    timestamp: start + step * k as i32,
                    latitude_deg: 0.0,
                    longitude_deg: 0.0,
                    altitude_km: 500.0 + rate_km_day * elapsed_days,
                }
            })
            .collect()
    }

    #[test]
    fn fits_linear_rate() {
        let points = track(-3.0, 48, Duration::minutes(30));
        let rate = altitude_rate_km_day(&points).unwrap();
        assert!((rate + 3.0).abs() < 1e-6);
        assert!(altitude_rate_km_day(&points[..1]).is_none());
    }

    #[test]
    fn classifies_by_rate() {
        let thresholds = TrendThresholds::default();
        let decaying = thresholds.estimate(&track(-3.0, 48, Duration::minutes(30)));
        assert_eq!(decaying.trend, AltitudeTrend::Decaying);
        let raising = thresholds.estimate(&track(5.0, 48, Duration::minutes(30)));
        assert_eq!(raising.trend, AltitudeTrend::Raising);
        let stable = thresholds.estimate(&track(0.1, 48, Duration::minutes(30)));
        assert_eq!(stable.trend, AltitudeTrend::Stable);
    }

    #[test]
    fn short_history_is_unknown() {
        let thresholds = TrendThresholds::default();
        let few = thresholds.estimate(&track(-3.0, 5, Duration::minutes(30)));
        assert_eq!(few.trend, AltitudeTrend::Unknown);
        assert!(few.rate_km_day.is_none());
        let brief = thresholds.estimate(&track(-3.0, 20, Duration::seconds(10)));
        assert_eq!(brief.trend, AltitudeTrend::Unknown);
    }
}
