use std::collections::HashMap;

use crate::propagate::frames::norm;

/// Slack added to every window edge so rounding never drops a boundary pair.
const EDGE_EPS_DEG: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey {
    band: i64,
    lat: i64,
    lon: i64,
}

#[derive(Debug, Clone, Copy)]
struct Located {
    key: CellKey,
    lat_deg: f64,
    lon_deg: f64,
}

/// Partition of a point set into radial bands, geocentric latitude bands and
/// longitude cells. For any pair within `threshold_km`, each member is in the
/// candidate window of the other; windows are derived from the smallest
/// radius in the set, so the candidate set is a superset of the exact answer.
pub struct ScreeningGrid {
    band_km: f64,
    band_reach: i64,
    lat_cells: i64,
    lon_cells: i64,
    lat_width_deg: f64,
    lon_width_deg: f64,
    /// Largest angular separation two points within the threshold can have.
    window_deg: f64,
    chord_ratio: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    located: Vec<Located>,
}

impl ScreeningGrid {
    pub fn build(points: &[[f64; 3]], threshold_km: f64, tolerance_km: f64, cell_deg: f64) -> Self {
        let min_radius_km = points
            .iter()
            .map(|p| norm(*p))
            .fold(f64::INFINITY, f64::min);
        let chord_ratio = if min_radius_km.is_finite() && min_radius_km > 0.0 {
            threshold_km / (2.0 * min_radius_km)
        } else {
            1.0
        };
        let window_deg = if chord_ratio >= 1.0 {
            180.0
        } else {
            (2.0 * chord_ratio.asin()).to_degrees()
        };

        let cell = cell_deg.max(window_deg).clamp(1e-3, 180.0);
        let lat_cells = ((180.0 / cell).floor() as i64).max(1);
        let lon_cells = ((360.0 / cell).floor() as i64).max(1);
        let band_km = threshold_km.max(tolerance_km).max(1e-3);

        let mut grid = Self {
            band_km,
            band_reach: (threshold_km / band_km).ceil().max(1.0) as i64,
            lat_cells,
            lon_cells,
            lat_width_deg: 180.0 / lat_cells as f64,
            lon_width_deg: 360.0 / lon_cells as f64,
            window_deg,
            chord_ratio,
            cells: HashMap::new(),
            located: Vec::with_capacity(points.len()),
        };

        for (index, point) in points.iter().enumerate() {
            let located = grid.locate(*point);
            grid.cells.entry(located.key).or_default().push(index);
            grid.located.push(located);
        }
        grid
    }

    fn locate(&self, p: [f64; 3]) -> Located {
        let radius = norm(p);
        let lat_deg = if radius > 0.0 {
            (p[2] / radius).clamp(-1.0, 1.0).asin().to_degrees()
        } else {
            0.0
        };
        let lon_deg = p[1].atan2(p[0]).to_degrees();
        Located {
            key: CellKey {
                band: (radius / self.band_km).floor() as i64,
                lat: self.lat_index(lat_deg),
                lon: self.lon_index(lon_deg),
            },
            lat_deg,
            lon_deg,
        }
    }

    fn lat_index(&self, lat_deg: f64) -> i64 {
        (((lat_deg + 90.0) / self.lat_width_deg).floor() as i64).clamp(0, self.lat_cells - 1)
    }

    fn lon_index(&self, lon_deg: f64) -> i64 {
        (((lon_deg + 180.0) / self.lon_width_deg).floor() as i64).rem_euclid(self.lon_cells)
    }

    fn lon_cells_for(&self, here: &Located) -> Vec<i64> {
        if self.window_deg >= 180.0 {
            return (0..self.lon_cells).collect();
        }
        let widest_lat = (here.lat_deg.abs() + self.window_deg).min(90.0);
        let cos_lat = widest_lat.to_radians().cos();
        if cos_lat <= 1e-12 || self.chord_ratio / cos_lat >= 1.0 {
            return (0..self.lon_cells).collect();
        }
        let half_width = (2.0 * (self.chord_ratio / cos_lat).asin()).to_degrees() + EDGE_EPS_DEG;
        if 2.0 * half_width + self.lon_width_deg >= 360.0 {
            return (0..self.lon_cells).collect();
        }
        let lo = ((here.lon_deg - half_width + 180.0) / self.lon_width_deg).floor() as i64;
        let hi = ((here.lon_deg + half_width + 180.0) / self.lon_width_deg).floor() as i64;
        (lo..=hi).map(|i| i.rem_euclid(self.lon_cells)).collect()
    }

    /// Pushes every index greater than `index` that may lie within the threshold.
    pub fn candidates(&self, index: usize, out: &mut Vec<usize>) {
        let here = self.located[index];
        let window = self.window_deg + EDGE_EPS_DEG;
        let lat_lo = self.lat_index(here.lat_deg - window);
        let lat_hi = self.lat_index(here.lat_deg + window);
        let lon_cells = self.lon_cells_for(&here);

        for band in (here.key.band - self.band_reach)..=(here.key.band + self.band_reach) {
            for lat in lat_lo..=lat_hi {
                for &lon in &lon_cells {
                    if let Some(members) = self.cells.get(&CellKey { band, lat, lon }) {
                        out.extend(members.iter().copied().filter(|&j| j > index));
                    }
                }
            }
        }
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}
