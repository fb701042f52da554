use crate::candidates::Candidate;
use ndarray::Array3;
use std::cmp::Ordering;
use u2g_challenge::{
    aggregate_score, CapacityField, Challenge, DecayTables, ScheduleItem, Solution, EPSILON,
};

// Fraction of demand that may remain unserved before the decoder tries the
// next-ranked candidate. Exactly one fallback candidate is attempted.
const FALLBACK_SHORTFALL: f64 = 0.1;

pub struct Decoded {
    pub solution: Solution,
    pub score: f64,
}

// Deterministically materializes a schedule for every flow from one
// candidate choice per flow, consuming shared capacity in flow-priority
// order. Pure function of (assignment, static tables).
pub fn decode(
    challenge: &Challenge,
    field: &CapacityField,
    tables: &DecayTables,
    candidates: &[Vec<Candidate>],
    assignment: &[usize],
) -> Decoded {
    let mut remaining = field.working_copy();
    let mut schedules: Vec<Vec<ScheduleItem>> = vec![Vec::new(); challenge.flows.len()];

    // earlier flows claim shared capacity first, larger demand breaks ties
    let mut order: Vec<usize> = (0..challenge.flows.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = &challenge.flows[a];
        let fb = &challenge.flows[b];
        fa.start_time.cmp(&fb.start_time).then(
            fb.demand
                .partial_cmp(&fa.demand)
                .unwrap_or(Ordering::Equal),
        )
    });

    for idx in order {
        let flow = &challenge.flows[idx];
        let cands = &candidates[idx];
        if cands.is_empty() {
            continue;
        }
        let mut cand_idx = assignment[idx];
        if cand_idx >= cands.len() {
            cand_idx = 0;
        }

        let mut need = flow.demand;
        consume(&cands[cand_idx], &mut remaining, &mut need, &mut schedules[idx]);

        if need > flow.demand * FALLBACK_SHORTFALL && cands.len() > 1 {
            let next = (cand_idx + 1) % cands.len();
            consume(&cands[next], &mut remaining, &mut need, &mut schedules[idx]);
        }
    }

    let solution = Solution { schedules };
    let score = aggregate_score(challenge, &solution, tables);
    Decoded { solution, score }
}

fn consume(
    cand: &Candidate,
    remaining: &mut Array3<f64>,
    need: &mut f64,
    items: &mut Vec<ScheduleItem>,
) {
    for slot in &cand.slots {
        if *need <= EPSILON {
            break;
        }
        let available = remaining[[slot.t, cand.x, cand.y]];
        if available > EPSILON {
            let take = available.min(*need);
            remaining[[slot.t, cand.x, cand.y]] -= take;
            *need -= take;
            items.push(ScheduleItem {
                t: slot.t,
                x: cand.x,
                y: cand.y,
                amount: take,
            });
        }
    }
}
