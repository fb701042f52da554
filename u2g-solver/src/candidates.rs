use std::cmp::Ordering;
use u2g_challenge::{CapacityField, Challenge, DecayTables, Flow, EPSILON};

// Slots are only considered this many steps past a flow's start time.
pub const LOOKAHEAD_WINDOW: usize = 60;

pub const MAX_CANDIDATES: usize = 8;
pub const MIN_CANDIDATES: usize = 2;

// A candidate is admitted when its window capacity covers this share of the
// flow's demand, or when it sits within ADMIT_DISTANCE of the origin.
const ADMIT_CAPACITY_SHARE: f64 = 0.05;
const ADMIT_DISTANCE: usize = 2;

// Candidates within DIVERSITY_DISTANCE of an already kept one need at least
// DIVERSITY_RATIO of its potential to survive pruning.
const DIVERSITY_DISTANCE: usize = 1;
const DIVERSITY_RATIO: f64 = 0.8;

// A time step at which a candidate relay has usable bandwidth. Slots are
// consumed in descending `value` order, not chronological order.
#[derive(Debug, Clone)]
pub struct TimeSlot {
    pub t: usize,
    pub bandwidth: f64,
    pub delay_factor: f64,
    pub value: f64,
}

// A relay cell retained for one flow after scoring and pruning.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub x: usize,
    pub y: usize,
    pub distance: usize,
    pub potential: f64,
    pub avg_bandwidth: f64,
    pub total_capacity: f64,
    pub peak_times: Vec<usize>,
    pub slots: Vec<TimeSlot>,
}

pub fn build_candidates(
    challenge: &Challenge,
    field: &CapacityField,
    tables: &DecayTables,
) -> Vec<Vec<Candidate>> {
    challenge
        .flows
        .iter()
        .map(|flow| flow_candidates(flow, challenge.horizon, field, tables))
        .collect()
}

fn flow_candidates(
    flow: &Flow,
    horizon: usize,
    field: &CapacityField,
    tables: &DecayTables,
) -> Vec<Candidate> {
    let window_end = horizon.min(flow.start_time + LOOKAHEAD_WINDOW);

    let mut raw = Vec::new();
    for (x, y) in flow.region.cells() {
        let distance = flow.distance_to(x, y);
        let dist_factor = tables.distance(distance);

        let mut total_capacity = 0.0;
        let mut weighted = 0.0;
        let mut count = 0usize;
        let mut max_bandwidth = 0.0f64;
        let mut peak_times = Vec::new();

        for t in flow.start_time..window_end {
            let bandwidth = field.at(t, x, y);
            if bandwidth > EPSILON {
                let delay_factor = tables.delay(t - flow.start_time);
                total_capacity += bandwidth;
                weighted += bandwidth * delay_factor * dist_factor;
                count += 1;

                if bandwidth > max_bandwidth {
                    max_bandwidth = bandwidth;
                    peak_times.clear();
                    peak_times.push(t);
                } else if (bandwidth - max_bandwidth).abs() < EPSILON {
                    peak_times.push(t);
                }
            }
        }

        let avg_bandwidth = if count > 0 {
            total_capacity / count as f64
        } else {
            0.0
        };
        let capacity_score = (1.0 + total_capacity).ln();
        let distance_penalty = distance as f64 * 0.5;
        let potential = weighted * 0.6 + capacity_score * 0.3 - distance_penalty * 0.1;

        raw.push(Candidate {
            x,
            y,
            distance,
            potential,
            avg_bandwidth,
            total_capacity,
            peak_times,
            slots: Vec::new(),
        });
    }

    let rect_area = flow.region.area();

    let mut admitted: Vec<Candidate> = raw
        .iter()
        .filter(|c| {
            c.total_capacity > flow.demand * ADMIT_CAPACITY_SHARE || c.distance <= ADMIT_DISTANCE
        })
        .cloned()
        .collect();

    // Every cell failed the filter: keep the single best raw candidate so
    // each flow always has one (it decodes to an empty schedule when the
    // cell has no usable slots).
    if admitted.is_empty() {
        if let Some(best) = raw.into_iter().max_by(|a, b| {
            a.potential
                .partial_cmp(&b.potential)
                .unwrap_or(Ordering::Equal)
        }) {
            admitted.push(best);
        }
    }

    admitted.sort_by(|a, b| {
        b.potential
            .partial_cmp(&a.potential)
            .unwrap_or(Ordering::Equal)
    });

    let top_k = MAX_CANDIDATES
        .min(rect_area)
        .min(admitted.len())
        .max(MIN_CANDIDATES);

    let mut kept: Vec<Candidate> = Vec::with_capacity(top_k);
    let mut rest = admitted.into_iter();
    if let Some(first) = rest.next() {
        kept.push(first);
    }
    for cand in rest {
        if kept.len() >= top_k {
            break;
        }
        let too_close = kept.iter().any(|kc| {
            let d = cand.x.abs_diff(kc.x) + cand.y.abs_diff(kc.y);
            d <= DIVERSITY_DISTANCE && cand.potential < kc.potential * DIVERSITY_RATIO
        });
        if !too_close {
            kept.push(cand);
        }
    }

    for cand in kept.iter_mut() {
        cand.slots = build_slots(flow, cand.x, cand.y, cand.distance, window_end, field, tables);
    }
    kept
}

fn build_slots(
    flow: &Flow,
    x: usize,
    y: usize,
    distance: usize,
    window_end: usize,
    field: &CapacityField,
    tables: &DecayTables,
) -> Vec<TimeSlot> {
    let dist_factor = tables.distance(distance);
    let mut slots = Vec::new();
    for t in flow.start_time..window_end {
        let bandwidth = field.at(t, x, y);
        if bandwidth > EPSILON {
            let delay_factor = tables.delay(t - flow.start_time);
            slots.push(TimeSlot {
                t,
                bandwidth,
                delay_factor,
                value: delay_factor * bandwidth * dist_factor,
            });
        }
    }
    slots.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use u2g_challenge::{Difficulty, Region, RelayCell};

    fn uniform_challenge(size: usize, bandwidth: f64) -> Challenge {
        Challenge {
            seed: [0u8; 32],
            difficulty: Difficulty {
                grid_size: size,
                num_flows: 1,
            },
            width: size,
            height: size,
            horizon: 40,
            cells: vec![
                RelayCell {
                    base_bandwidth: bandwidth,
                    phase: 3,
                };
                size * size
            ],
            flows: vec![Flow {
                id: 1,
                origin: (0, 0),
                start_time: 0,
                demand: 50.0,
                region: Region {
                    x_min: 0,
                    y_min: 0,
                    x_max: size - 1,
                    y_max: size - 1,
                },
            }],
        }
    }

    #[test]
    fn candidate_lists_are_bounded() {
        let challenge = uniform_challenge(6, 20.0);
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let candidates = build_candidates(&challenge, &field, &tables);
        assert_eq!(candidates.len(), 1);
        let list = &candidates[0];
        assert!(!list.is_empty());
        assert!(list.len() <= MAX_CANDIDATES);
        assert!(list.len() <= challenge.flows[0].region.area());
    }

    #[test]
    fn candidates_are_ranked_by_potential() {
        let challenge = uniform_challenge(6, 20.0);
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let list = &build_candidates(&challenge, &field, &tables)[0];
        for pair in list.windows(2) {
            assert!(pair[0].potential >= pair[1].potential);
        }
        // with a uniform grid the origin cell is the clear best
        assert_eq!((list[0].x, list[0].y), (0, 0));
    }

    #[test]
    fn slots_are_sorted_by_descending_value() {
        let challenge = uniform_challenge(4, 20.0);
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let list = &build_candidates(&challenge, &field, &tables)[0];
        for cand in list {
            assert!(!cand.slots.is_empty());
            for pair in cand.slots.windows(2) {
                assert!(pair[0].value >= pair[1].value);
            }
        }
    }

    #[test]
    fn equal_bandwidth_steps_are_all_peaks() {
        let challenge = uniform_challenge(2, 10.0);
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let list = &build_candidates(&challenge, &field, &tables)[0];
        let origin = list.iter().find(|c| c.x == 0 && c.y == 0).unwrap();
        // phase 3: full bandwidth at t in {0..3}, {10..13}, {20..23}, {30..33}
        assert_eq!(origin.peak_times.len(), 16);
        assert_eq!(origin.peak_times[..4], [0, 1, 2, 3]);
    }

    #[test]
    fn zero_capacity_region_falls_back_to_best_raw_candidate() {
        let mut challenge = uniform_challenge(5, 0.0);
        challenge.flows[0].region = Region {
            x_min: 4,
            y_min: 4,
            x_max: 4,
            y_max: 4,
        };
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let list = &build_candidates(&challenge, &field, &tables)[0];
        // distance 8 > 2 and no capacity: only the fallback keeps it alive
        assert_eq!(list.len(), 1);
        assert_eq!((list[0].x, list[0].y), (4, 4));
        assert!(list[0].slots.is_empty());
    }

    #[test]
    fn close_relays_survive_the_admission_filter() {
        // zero bandwidth everywhere, but cells within distance 2 stay
        let challenge = uniform_challenge(3, 0.0);
        let field = challenge.capacity_field();
        let tables = challenge.decay_tables();
        let list = &build_candidates(&challenge, &field, &tables)[0];
        assert!(!list.is_empty());
        for cand in list {
            assert!(cand.distance <= 2);
        }
    }
}
