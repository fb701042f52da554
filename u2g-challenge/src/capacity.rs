use crate::Challenge;
use ndarray::Array3;

// Relays repeat a 10-step duty cycle: full bandwidth while tau is in [3, 6],
// half bandwidth at tau 2 and 7, down otherwise, where
// tau = (phase + t) % 10.
pub const CYCLE_LEN: usize = 10;

// Instantaneous bandwidth per (t, x, y), derived once from the grid cells
// and read-only afterwards. Decoders take a private working copy to consume.
#[derive(Debug, Clone)]
pub struct CapacityField {
    values: Array3<f64>,
}

impl CapacityField {
    pub fn build(challenge: &Challenge) -> Self {
        let mut values = Array3::zeros((challenge.horizon, challenge.width, challenge.height));
        for t in 0..challenge.horizon {
            for x in 0..challenge.width {
                for y in 0..challenge.height {
                    let cell = challenge.cell(x, y);
                    let tau = (cell.phase as usize + t) % CYCLE_LEN;
                    values[[t, x, y]] = match tau {
                        3..=6 => cell.base_bandwidth,
                        2 | 7 => cell.base_bandwidth / 2.0,
                        _ => 0.0,
                    };
                }
            }
        }
        CapacityField { values }
    }

    pub fn at(&self, t: usize, x: usize, y: usize) -> f64 {
        self.values[[t, x, y]]
    }

    pub fn working_copy(&self) -> Array3<f64> {
        self.values.clone()
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Difficulty, Flow, Region, RelayCell};

    fn one_relay_challenge(bandwidth: f64, phase: u32) -> Challenge {
        Challenge {
            seed: [0u8; 32],
            difficulty: Difficulty {
                grid_size: 2,
                num_flows: 1,
            },
            width: 2,
            height: 2,
            horizon: 10,
            cells: vec![
                RelayCell {
                    base_bandwidth: bandwidth,
                    phase,
                },
                RelayCell {
                    base_bandwidth: 0.0,
                    phase: 0,
                },
                RelayCell {
                    base_bandwidth: 0.0,
                    phase: 0,
                },
                RelayCell {
                    base_bandwidth: 0.0,
                    phase: 0,
                },
            ],
            flows: vec![Flow {
                id: 1,
                origin: (0, 0),
                start_time: 0,
                demand: 15.0,
                region: Region {
                    x_min: 0,
                    y_min: 0,
                    x_max: 1,
                    y_max: 1,
                },
            }],
        }
    }

    #[test]
    fn duty_cycle_of_phase_three_relay() {
        let field = CapacityField::build(&one_relay_challenge(10.0, 3));
        // tau = (3 + t) % 10: full at t in {0..3}, half at t in {4, 9}
        for t in 0..4 {
            assert_eq!(field.at(t, 0, 0), 10.0);
        }
        assert_eq!(field.at(4, 0, 0), 5.0);
        assert_eq!(field.at(9, 0, 0), 5.0);
        for t in 5..9 {
            assert_eq!(field.at(t, 0, 0), 0.0);
        }
    }

    #[test]
    fn values_are_zero_half_or_full() {
        let field = CapacityField::build(&one_relay_challenge(7.0, 6));
        for t in 0..10 {
            let v = field.at(t, 0, 0);
            assert!(v == 0.0 || v == 3.5 || v == 7.0, "unexpected value {}", v);
        }
    }

    #[test]
    fn empty_cells_have_no_capacity() {
        let field = CapacityField::build(&one_relay_challenge(10.0, 3));
        for t in 0..10 {
            assert_eq!(field.at(t, 1, 1), 0.0);
        }
    }
}
