use anyhow::{anyhow, Result};
use rand::{
    rngs::{SmallRng, StdRng},
    Rng, SeedableRng,
};
use serde::{Deserialize, Serialize};
use serde_json::{from_value, Map, Value};
use std::collections::HashSet;

pub mod capacity;
pub mod decay;
pub mod text;

pub use capacity::CapacityField;
pub use decay::DecayTables;

// Epsilon shared by every floating-point comparison that is part of the
// observable behavior: peak-time ties, slot admission, the local search's
// improvement threshold and the integral check on output amounts.
pub const EPSILON: f64 = 1e-9;

// Slack allowed when checking the capacity and demand invariants of a
// solution; schedules are sums of f64 draws and accumulate rounding.
pub const VERIFY_TOLERANCE: f64 = 1e-6;

// Horizon used by generated instances.
pub const DEFAULT_HORIZON: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Difficulty {
    pub grid_size: usize,
    pub num_flows: usize,
}

impl From<Vec<i32>> for Difficulty {
    fn from(arr: Vec<i32>) -> Self {
        Self {
            grid_size: arr[0] as usize,
            num_flows: arr[1] as usize,
        }
    }
}

impl Into<Vec<i32>> for Difficulty {
    fn into(self) -> Vec<i32> {
        vec![self.grid_size as i32, self.num_flows as i32]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RelayCell {
    pub base_bandwidth: f64,
    pub phase: u32,
}

// Axis-aligned rectangle of admissible relay cells, inclusive on both ends.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl Region {
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn area(&self) -> usize {
        (self.x_max - self.x_min + 1) * (self.y_max - self.y_min + 1)
    }

    pub fn cells(self) -> impl Iterator<Item = (usize, usize)> {
        (self.x_min..=self.x_max)
            .flat_map(move |x| (self.y_min..=self.y_max).map(move |y| (x, y)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Flow {
    pub id: u32,
    pub origin: (usize, usize),
    pub start_time: usize,
    pub demand: f64,
    pub region: Region,
}

impl Flow {
    pub fn distance_to(&self, x: usize, y: usize) -> usize {
        self.origin.0.abs_diff(x) + self.origin.1.abs_diff(y)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ScheduleItem {
    pub t: usize,
    pub x: usize,
    pub y: usize,
    pub amount: f64,
}

// One item sequence per flow, in challenge flow order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Solution {
    pub schedules: Vec<Vec<ScheduleItem>>,
}

impl Solution {
    pub fn new() -> Self {
        Self {
            schedules: Vec::new(),
        }
    }
}

impl TryFrom<Map<String, Value>> for Solution {
    type Error = serde_json::Error;

    fn try_from(v: Map<String, Value>) -> Result<Self, Self::Error> {
        from_value(Value::Object(v))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Challenge {
    pub seed: [u8; 32],
    pub difficulty: Difficulty,
    pub width: usize,
    pub height: usize,
    pub horizon: usize,
    // row-major: cells[x * height + y]
    pub cells: Vec<RelayCell>,
    pub flows: Vec<Flow>,
}

impl Challenge {
    pub fn cell(&self, x: usize, y: usize) -> &RelayCell {
        &self.cells[x * self.height + y]
    }

    pub fn capacity_field(&self) -> CapacityField {
        CapacityField::build(self)
    }

    pub fn decay_tables(&self) -> DecayTables {
        DecayTables::build(self.width + self.height, self.horizon)
    }

    pub fn generate_instance(seed: &[u8; 32], difficulty: &Difficulty) -> Result<Challenge> {
        if difficulty.grid_size == 0 || difficulty.num_flows == 0 {
            return Err(anyhow!("grid_size and num_flows must be positive"));
        }
        let mut rng = SmallRng::from_seed(StdRng::from_seed(seed.clone()).gen());
        let size = difficulty.grid_size;
        let horizon = DEFAULT_HORIZON;

        // roughly one in five cells carries no relay at all
        let cells = (0..size * size)
            .map(|_| RelayCell {
                base_bandwidth: if rng.gen_bool(0.8) {
                    rng.gen_range(5.0..50.0_f64).round()
                } else {
                    0.0
                },
                phase: rng.gen_range(0..10),
            })
            .collect::<Vec<_>>();

        let reach = 4.min(size.saturating_sub(1));
        let flows = (0..difficulty.num_flows)
            .map(|i| {
                let origin = (rng.gen_range(0..size), rng.gen_range(0..size));
                let rx = if reach == 0 { 0 } else { rng.gen_range(1..=reach) };
                let ry = if reach == 0 { 0 } else { rng.gen_range(1..=reach) };
                Flow {
                    id: i as u32 + 1,
                    origin,
                    start_time: rng.gen_range(0..horizon / 2),
                    demand: rng.gen_range(10.0..200.0_f64).round(),
                    region: Region {
                        x_min: origin.0.saturating_sub(rx),
                        y_min: origin.1.saturating_sub(ry),
                        x_max: (origin.0 + rx).min(size - 1),
                        y_max: (origin.1 + ry).min(size - 1),
                    },
                }
            })
            .collect::<Vec<_>>();

        Ok(Challenge {
            seed: seed.clone(),
            difficulty: difficulty.clone(),
            width: size,
            height: size,
            horizon,
            cells,
            flows,
        })
    }

    pub fn verify_solution(&self, solution: &Solution) -> Result<()> {
        if solution.schedules.len() != self.flows.len() {
            return Err(anyhow!(
                "Expecting solution to have {} schedules. Got {}",
                self.flows.len(),
                solution.schedules.len()
            ));
        }

        let field = self.capacity_field();
        let mut drawn = field.working_copy();
        drawn.fill(0.0);

        for (flow, schedule) in self.flows.iter().zip(&solution.schedules) {
            let mut delivered = 0.0;
            for item in schedule {
                if item.t >= self.horizon {
                    return Err(anyhow!(
                        "Flow {}: item at t={} is outside the horizon {}",
                        flow.id,
                        item.t,
                        self.horizon
                    ));
                }
                if item.t < flow.start_time {
                    return Err(anyhow!(
                        "Flow {}: item at t={} precedes its start time {}",
                        flow.id,
                        item.t,
                        flow.start_time
                    ));
                }
                if item.x >= self.width || item.y >= self.height {
                    return Err(anyhow!(
                        "Flow {}: relay ({}, {}) is outside the {}x{} grid",
                        flow.id,
                        item.x,
                        item.y,
                        self.width,
                        self.height
                    ));
                }
                if !flow.region.contains(item.x, item.y) {
                    return Err(anyhow!(
                        "Flow {}: relay ({}, {}) is outside its admissible region",
                        flow.id,
                        item.x,
                        item.y
                    ));
                }
                if item.amount < 0.0 {
                    return Err(anyhow!("Flow {}: negative amount", flow.id));
                }
                delivered += item.amount;
                drawn[[item.t, item.x, item.y]] += item.amount;
            }
            if delivered > flow.demand + VERIFY_TOLERANCE {
                return Err(anyhow!(
                    "Flow {} delivers {} which exceeds its demand {}",
                    flow.id,
                    delivered,
                    flow.demand
                ));
            }
        }

        for ((t, x, y), &z) in drawn.indexed_iter() {
            if z > field.at(t, x, y) + VERIFY_TOLERANCE {
                return Err(anyhow!(
                    "Relay ({}, {}) at t={} is oversubscribed: {} drawn of {}",
                    x,
                    y,
                    t,
                    z,
                    field.at(t, x, y)
                ));
            }
        }

        Ok(())
    }

    pub fn evaluate_solution(&self, solution: &Solution) -> Result<f64> {
        if solution.schedules.len() != self.flows.len() {
            return Err(anyhow!(
                "Expecting solution to have {} schedules. Got {}",
                self.flows.len(),
                solution.schedules.len()
            ));
        }
        Ok(aggregate_score(self, solution, &self.decay_tables()))
    }
}

pub fn flow_score(flow: &Flow, schedule: &[ScheduleItem], tables: &DecayTables) -> f64 {
    if flow.demand <= EPSILON {
        return 0.0;
    }

    let mut transmitted = 0.0;
    let mut delay_sum = 0.0;
    let mut dist_sum = 0.0;
    let mut endpoints = HashSet::new();

    for item in schedule {
        transmitted += item.amount;
        let delay = item.t.saturating_sub(flow.start_time);
        let hops = flow.distance_to(item.x, item.y);
        let fraction = item.amount / flow.demand;
        delay_sum += fraction * tables.delay(delay);
        dist_sum += fraction * tables.distance(hops);
        endpoints.insert((item.x, item.y));
    }

    let u2g = (transmitted / flow.demand).min(1.0);
    let land = 1.0 / endpoints.len().max(1) as f64;

    100.0 * (0.4 * u2g + 0.2 * delay_sum + 0.3 * dist_sum + 0.1 * land)
}

// Demand-weighted average of per-flow scores.
pub fn aggregate_score(challenge: &Challenge, solution: &Solution, tables: &DecayTables) -> f64 {
    let total_demand: f64 = challenge.flows.iter().map(|f| f.demand).sum();
    let weighted: f64 = challenge
        .flows
        .iter()
        .zip(&solution.schedules)
        .map(|(flow, schedule)| flow_score(flow, schedule, tables) * flow.demand)
        .sum();
    weighted / (total_demand + 1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_flow(demand: f64) -> Flow {
        Flow {
            id: 1,
            origin: (0, 0),
            start_time: 0,
            demand,
            region: Region {
                x_min: 0,
                y_min: 0,
                x_max: 1,
                y_max: 1,
            },
        }
    }

    #[test]
    fn zero_demand_flow_scores_zero() {
        let tables = DecayTables::build(4, 10);
        let flow = single_flow(0.0);
        let items = vec![ScheduleItem {
            t: 0,
            x: 0,
            y: 0,
            amount: 1.0,
        }];
        assert_eq!(flow_score(&flow, &items, &tables), 0.0);
    }

    #[test]
    fn empty_schedule_scores_landing_term_only() {
        let tables = DecayTables::build(4, 10);
        let flow = single_flow(15.0);
        let score = flow_score(&flow, &[], &tables);
        assert!((score - 10.0).abs() < 1e-12);
    }

    #[test]
    fn endpoint_splitting_lowers_the_score() {
        let tables = DecayTables::build(4, 10);
        let flow = single_flow(10.0);
        let one = vec![ScheduleItem {
            t: 0,
            x: 0,
            y: 0,
            amount: 10.0,
        }];
        let two = vec![
            ScheduleItem {
                t: 0,
                x: 0,
                y: 0,
                amount: 5.0,
            },
            ScheduleItem {
                t: 0,
                x: 0,
                y: 1,
                amount: 5.0,
            },
        ];
        let s1 = flow_score(&flow, &one, &tables);
        let s2 = flow_score(&flow, &two, &tables);
        assert!(s1 > s2);
    }

    #[test]
    fn region_cells_cover_area() {
        let region = Region {
            x_min: 1,
            y_min: 2,
            x_max: 3,
            y_max: 2,
        };
        let cells: Vec<(usize, usize)> = region.cells().collect();
        assert_eq!(cells, vec![(1, 2), (2, 2), (3, 2)]);
        assert_eq!(region.area(), 3);
    }
}
