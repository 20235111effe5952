use serde::{Deserialize, Serialize};

/// A nominal altitude band one constellation sub-group is designed to occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellDefinition {
    pub name: String,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    /// Members further than this from the target altitude count against health.
    pub tolerance_km: f64,
    #[serde(default = "default_inclination_tolerance")]
    pub inclination_tolerance_deg: f64,
}

fn default_inclination_tolerance() -> f64 {
    2.0
}

impl ShellDefinition {
    pub fn new(name: &str, altitude_km: f64, inclination_deg: f64, tolerance_km: f64) -> Self {
        Self {
            name: name.to_string(),
            altitude_km,
            inclination_deg,
            tolerance_km,
            inclination_tolerance_deg: default_inclination_tolerance(),
        }
    }

    pub fn within_tolerance(&self, altitude_km: f64) -> bool {
        (altitude_km - self.altitude_km).abs() <= self.tolerance_km
    }
}

pub fn default_shells() -> Vec<ShellDefinition> {
    vec![
        ShellDefinition::new("Shell 1", 550.0, 53.0, 30.0),
        ShellDefinition::new("Shell 2", 540.0, 53.2, 20.0),
        ShellDefinition::new("Shell 3 (polar)", 560.0, 97.6, 20.0),
        ShellDefinition::new("Shell 4", 525.0, 43.0, 25.0),
        ShellDefinition::new("Shell 5", 530.0, 33.0, 25.0),
    ]
}

/// Index of the shell whose inclination is nearest, if any is within its
/// inclination tolerance. Ties go to the earlier shell.
pub fn assign_shell(shells: &[ShellDefinition], inclination_deg: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, shell) in shells.iter().enumerate() {
        let offset = (inclination_deg - shell.inclination_deg).abs();
        if offset > shell.inclination_tolerance_deg {
            continue;
        }
        if best.map_or(true, |(_, d)| offset < d) {
            best = Some((index, offset));
        }
    }
    best.map(|(index, _)| index)
}
