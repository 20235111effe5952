use serde::{Deserialize, Serialize};

use crate::propagate::frames::geodetic_to_ecef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub name: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub altitude_m: f64,
    /// Elevation below which the station cannot work the object.
    pub min_elevation_deg: f64,
}

impl GroundStation {
    pub fn new(name: &str, latitude_deg: f64, longitude_deg: f64, min_elevation_deg: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude_deg,
            longitude_deg,
            altitude_m: 0.0,
            min_elevation_deg,
        }
    }

    /// Parses `"lat,lon"` as written in station lists.
    pub fn from_coordinates(
        name: &str,
        coordinates: &str,
        altitude_m: Option<f64>,
        min_elevation_deg: f64,
    ) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() < 2 {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            latitude_deg: parts[0].parse().ok()?,
            longitude_deg: parts[1].parse().ok()?,
            altitude_m: altitude_m.unwrap_or(0.0),
            min_elevation_deg,
        })
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn position_ecef_km(&self) -> [f64; 3] {
        geodetic_to_ecef(self.latitude_deg, self.longitude_deg, self.altitude_m / 1000.0)
    }
}

/// Polar and mid-latitude stations used when the config names none.
pub fn default_stations() -> Vec<GroundStation> {
    vec![
        GroundStation::new("Svalbard", 78.23, 15.39, 5.0),
        GroundStation::new("Fairbanks", 64.86, -147.85, 5.0),
        GroundStation::new("McMurdo", -77.85, 166.67, 5.0),
        GroundStation::new("Punta Arenas", -53.16, -70.91, 5.0),
        GroundStation::new("Hawaii", 20.71, -156.26, 10.0),
        GroundStation::new("Guam", 13.44, 144.79, 10.0),
        GroundStation::new("Cape Canaveral", 28.49, -80.58, 10.0),
        GroundStation::new("Vandenberg", 34.74, -120.52, 10.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coordinates() {
        let station = GroundStation::from_coordinates("Darmstadt", " 49.87, 8.65 ", Some(144.0), 5.0)
            .unwrap();
        assert_eq!(station.latitude_deg, 49.87);
        assert_eq!(station.longitude_deg, 8.65);
        assert_eq!(station.altitude_m, 144.0);
        assert!(GroundStation::from_coordinates("x", "49.87", None, 5.0).is_none());
        assert!(GroundStation::from_coordinates("x", "north,8.6", None, 5.0).is_none());
    }

    #[test]
    fn equator_station_sits_on_the_x_axis() {
        let station = GroundStation::new("Null Island", 0.0, 0.0, 0.0);
        let ecef = station.position_ecef_km();
        assert!((ecef[0] - 6378.137).abs() < 1e-9);
        assert!(ecef[1].abs() < 1e-9 && ecef[2].abs() < 1e-9);
    }
}
