use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    /// Below this miss distance the severity is HIGH.
    pub high_km: f64,
    /// Up to this miss distance the severity is MEDIUM.
    pub medium_km: f64,
    /// e-folding distance of the LOW band score.
    pub low_decay_km: f64,
    /// Closing speed at which the speed weight reaches one half.
    pub reference_speed_km_s: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            high_km: 1.0,
            medium_km: 5.0,
            low_decay_km: 20.0,
            reference_speed_km_s: 7.5,
            probability_floor: 1e-7,
            probability_ceiling: 1e-3,
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
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub severity: Severity,
}

/// What a caller knows about an encounter.
#[derive(Debug, Clone, Copy)]
pub enum RiskInput {
    Geometry {
        miss_distance_km: f64,
        closing_speed_km_s: f64,
    },
    Probability(f64),
}

/// The single scoring function behind every risk figure the engine reports.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    bands: RiskBands,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(RiskBands::default())
    }
}

impl RiskScorer {
    pub fn new(bands: RiskBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &RiskBands {
        &self.bands
    }

    pub fn assess(&self, input: RiskInput) -> RiskAssessment {
        match input {
            RiskInput::Geometry {
                miss_distance_km,
                closing_speed_km_s,
            } => self.score_geometry(miss_distance_km, closing_speed_km_s),
            RiskInput::Probability(pc) => self.score_probability(pc),
        }
    }

    /// Piecewise score: HIGH in (0.7, 1], MEDIUM in [0.3, 0.7), LOW in [0, 0.3).
    /// Strictly decreasing in distance; speed only scales within a band.
    pub fn score_geometry(&self, miss_distance_km: f64, closing_speed_km_s: f64) -> RiskAssessment {
        let bands = &self.bands;
        if !miss_distance_km.is_finite() {
            return RiskAssessment {
                score: 0.0,
                severity: Severity::Low,
            };
        }
        let d = miss_distance_km.max(0.0);
        let k = 0.9 + 0.1 * self.speed_weight(closing_speed_km_s);

        if d < bands.high_km {
            RiskAssessment {
                score: 0.7 + 0.3 * k * (1.0 - d / bands.high_km),
                severity: Severity::High,
            }
        } else if d <= bands.medium_km {
            let t = (d - bands.high_km) / (bands.medium_km - bands.high_km);
            RiskAssessment {
                score: 0.3 + 0.4 * k * (1.0 - t),
                severity: Severity::Medium,
            }
        } else {
            let score = 0.3 * k * (-(d - bands.medium_km) / bands.low_decay_km).exp();
            RiskAssessment {
                score,
                severity: Severity::Low,
            }
        }
    }

    /// Log-scaled collision probability mapped onto the same bands.
    pub fn score_probability(&self, pc: f64) -> RiskAssessment {
        let bands = &self.bands;
        let score = if pc.is_finite() && pc > 0.0 {
            let floor = bands.probability_floor.log10();
            let ceiling = bands.probability_ceiling.log10();
            ((pc.log10() - floor) / (ceiling - floor)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        RiskAssessment {
            score,
            severity: severity_for_score(score),
        }
    }

    fn speed_weight(&self, closing_speed_km_s: f64) -> f64 {
        if !closing_speed_km_s.is_finite() || closing_speed_km_s <= 0.0 {
            return 0.0;
        }
        closing_speed_km_s / (closing_speed_km_s + self.bands.reference_speed_km_s)
    }
}

pub fn severity_for_score(score: f64) -> Severity {
    if score > 0.7 {
        Severity::High
    } else if score >= 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_match_distance() {
        let scorer = RiskScorer::default();
        let high = scorer.score_geometry(0.4, 10.0);
        let medium = scorer.score_geometry(3.0, 10.0);
        let low = scorer.score_geometry(25.0, 10.0);

        assert_eq!(high.severity, Severity::High);
        assert!(high.score > 0.7 && high.score <= 1.0);
        assert_eq!(medium.severity, Severity::Medium);
        assert!(medium.score >= 0.3 && medium.score < 0.7);
        assert_eq!(low.severity, Severity::Low);
        assert!(low.score < 0.3);

        assert_eq!(scorer.score_geometry(1.0, 10.0).severity, Severity::Medium);
        assert_eq!(scorer.score_geometry(5.0, 10.0).severity, Severity::Medium);
    }

    #[test]
    fn strictly_decreasing_with_distance() {
        let scorer = RiskScorer::default();
        for speed in [0.0, 0.5, 7.5, 14.0] {
            let mut previous = f64::INFINITY;
            let mut d = 0.0;
            while d < 120.0 {
                let score = scorer.score_geometry(d, speed).score;
                assert!(score < previous, "score did not fall at d={} v={}", d, speed);
                assert!((0.0..=1.0).contains(&score));
                previous = score;
                d += 0.05;
            }
        }
    }

    #[test]
    fn closing_speed_raises_score_within_band() {
        let scorer = RiskScorer::default();
        let slow = scorer.score_geometry(2.0, 0.1);
        let fast = scorer.score_geometry(2.0, 14.0);
        assert!(fast.score > slow.score);
        assert_eq!(fast.severity, slow.severity);
    }

    #[test]
    fn probability_scale() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.score_probability(0.0).severity, Severity::Low);
        assert!((scorer.score_probability(1e-3).score - 1.0).abs() < 1e-12);
        assert_eq!(scorer.score_probability(1e-9).score, 0.0);
        assert_eq!(scorer.score_probability(1e-4).severity, Severity::High);
        assert_eq!(scorer.score_probability(1e-5).severity, Severity::Medium);
        assert_eq!(scorer.score_probability(1e-6).severity, Severity::Low);
    }
}
