// Distance and delay multipliers used by every scoring computation,
// precomputed over the grid/time bounds. Lookups past the built range
// saturate at the last entry (longest distance / delay) instead of failing.
#[derive(Debug, Clone)]
pub struct DecayTables {
    distance: Vec<f64>,
    delay: Vec<f64>,
}

impl DecayTables {
    pub fn build(max_distance: usize, max_delay: usize) -> Self {
        DecayTables {
            distance: (0..=max_distance)
                .map(|d| 2f64.powf(-0.1 * d as f64))
                .collect(),
            delay: (0..=max_delay).map(|dt| 10.0 / (dt as f64 + 10.0)).collect(),
        }
    }

    pub fn distance(&self, d: usize) -> f64 {
        self.distance[d.min(self.distance.len() - 1)]
    }

    pub fn delay(&self, dt: usize) -> f64 {
        self.delay[dt.min(self.delay.len() - 1)]
    }
}
