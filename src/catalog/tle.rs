use chrono::{Datelike, Timelike};

use super::elements::ElementSet;
use super::error::DataError;

/// Largest catalog number the five-column field can hold.
pub const MAX_CATALOG_NUMBER: u32 = 99_999;

/// Lays an element set out in the fixed-column two-line format, checksums included.
pub fn format_tle(set: &ElementSet) -> Result<(String, String), DataError> {
    let catalog = set.catalog_number;
    if catalog > MAX_CATALOG_NUMBER {
        return Err(DataError::Record(format!(
            "catalog number {} does not fit the two-line format",
            catalog
        )));
    }
    let epoch = set.epoch;
    let seconds_of_day =
        epoch.num_seconds_from_midnight() as f64 + epoch.nanosecond() as f64 * 1e-9;
    let day_of_year = epoch.ordinal() as f64 + seconds_of_day / 86_400.0;

    let line1 = format!(
        "1 {:05}U 00001A   {:02}{:012.8} {} {} {} 0 {:4}",
        catalog,
        epoch.year().rem_euclid(100),
        day_of_year,
        format_mean_motion_dot(set.mean_motion_dot),
        format_assumed_decimal(0.0),
        format_assumed_decimal(set.drag_term),
        999,
    );

    let ecc_digits = ((set.eccentricity * 1e7).round() as u64).min(9_999_999);
    let line2 = format!(
        "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:05}",
        catalog,
        set.inclination_deg.clamp(0.0, 180.0),
        set.raan_deg.rem_euclid(360.0),
        ecc_digits,
        set.arg_perigee_deg.rem_euclid(360.0),
        set.mean_anomaly_deg.rem_euclid(360.0),
        set.mean_motion_rev_day,
        0,
    );

    Ok((with_checksum(line1), with_checksum(line2)))
}

fn format_mean_motion_dot(value: f64) -> String {
    let digits = format!("{:.8}", value.abs().min(0.999_999_99));
    let sign = if value < 0.0 { '-' } else { ' ' };
    format!("{}{}", sign, &digits[1..])
}

/// Eight-column field with an implied leading decimal point, e.g. ` 28098-4`.
fn format_assumed_decimal(value: f64) -> String {
    const ZERO: &str = " 00000-0";
    if value == 0.0 || !value.is_finite() {
        return ZERO.to_string();
    }
    let sign = if value < 0.0 { '-' } else { ' ' };
    let magnitude = value.abs();
    let mut exponent = magnitude.log10().floor() as i32 + 1;
    let mut mantissa = (magnitude / 10f64.powi(exponent) * 1e5).round() as i64;
    if mantissa >= 100_000 {
        mantissa /= 10;
        exponent += 1;
    }
    if exponent < -9 {
        return ZERO.to_string();
    }
    let exponent = exponent.min(9);
    let exponent_sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{:05}{}{}", sign, mantissa, exponent_sign, exponent.abs())
}

fn with_checksum(line: String) -> String {
    let sum: u32 = line
        .bytes()
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    format!("{}{}", line, sum % 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::elements::fixtures::*;

    #[test]
    fn assumed_decimal_fields() {
        assert_eq!(format_assumed_decimal(2.8098e-5), " 28098-4");
        assert_eq!(format_assumed_decimal(-1.1606e-5), "-11606-4");
        assert_eq!(format_assumed_decimal(0.0), " 00000-0");
        assert_eq!(format_mean_motion_dot(-0.00002182), "-.00002182");
        assert_eq!(format_mean_motion_dot(0.00000023), " .00000023");
    }

    #[test]
    fn checksum_matches_published_lines() {
        assert_eq!(with_checksum(VANGUARD_LINE1[..68].to_string()), VANGUARD_LINE1);
        assert_eq!(with_checksum(ISS_LINE2[..68].to_string()), ISS_LINE2);
    }

    #[test]
    fn formatted_lines_parse_back() {
        let original = vanguard().set;
        let (line1, line2) = format_tle(&original).unwrap();
        assert_eq!(line1.len(), 69);
        assert_eq!(line2.len(), 69);

        let parsed = sgp4::Elements::from_tle(None, line1.as_bytes(), line2.as_bytes()).unwrap();
        let round = crate::catalog::ElementSet::from_elements(&parsed);
        assert_eq!(round.catalog_number, 5);
        assert!((round.eccentricity - original.eccentricity).abs() < 1e-7);
        assert!((round.raan_deg - original.raan_deg).abs() < 1e-4);
        assert!((round.mean_motion_rev_day - original.mean_motion_rev_day).abs() < 1e-8);
        assert!((round.drag_term - original.drag_term).abs() < 1e-9);
        assert!((round.epoch - original.epoch).num_milliseconds().abs() < 5);
    }

    #[test]
    fn six_digit_catalog_numbers_are_rejected() {
        let mut set = vanguard().set;
        set.catalog_number = MAX_CATALOG_NUMBER;
        let (line1, _) = format_tle(&set).unwrap();
        assert_eq!(&line1[2..7], "99999");

        set.catalog_number = 100_000;
        assert!(matches!(format_tle(&set), Err(DataError::Record(_))));
    }
}
