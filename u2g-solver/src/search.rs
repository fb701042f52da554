use crate::candidates::Candidate;
use crate::decoder::decode;
use ahash::RandomState;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{Map, Value};
use std::collections::HashSet;
use u2g_challenge::{CapacityField, Challenge, DecayTables, Solution, EPSILON};

pub const DEFAULT_MAX_ITERATIONS: usize = 150;
pub const DEFAULT_MAX_STAGNATION: usize = 20;

// Flows delivering less than this share of their demand count as
// under-served and attract most of the perturbation.
const SERVED_THRESHOLD: f64 = 0.8;

const SEARCH_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub max_iterations: usize,
    pub max_stagnation: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_stagnation: DEFAULT_MAX_STAGNATION,
        }
    }
}

impl SearchParams {
    pub fn from_hyperparameters(hyperparameters: &Option<Map<String, Value>>) -> Self {
        let mut params = Self::default();
        if let Some(v) = hyperparameters
            .as_ref()
            .and_then(|m| m.get("max_iterations"))
            .and_then(|v| v.as_u64())
        {
            params.max_iterations = v as usize;
        }
        if let Some(v) = hyperparameters
            .as_ref()
            .and_then(|m| m.get("max_stagnation"))
            .and_then(|v| v.as_u64())
        {
            params.max_stagnation = v as usize;
        }
        params
    }
}

pub struct SearchResult {
    pub assignment: Vec<usize>,
    pub score: f64,
}

// Hill climbing over candidate assignments: perturb, decode, keep strict
// improvements only. Perturbation is biased toward under-served flows.
pub fn local_search(
    challenge: &Challenge,
    field: &CapacityField,
    tables: &DecayTables,
    candidates: &[Vec<Candidate>],
    initial: Vec<usize>,
    params: &SearchParams,
) -> SearchResult {
    let mut rng = StdRng::seed_from_u64(SEARCH_SEED);

    // only flows with a real choice can be perturbed
    let eligible: Vec<usize> = (0..challenge.flows.len())
        .filter(|&i| candidates[i].len() > 1)
        .collect();

    let decoded = decode(challenge, field, tables, candidates, &initial);
    let mut best_score = decoded.score;
    let mut problematic = under_served(challenge, &decoded.solution);

    let mut current = initial.clone();
    let mut best = initial;

    // fixed seeds keep runs reproducible
    let hasher = RandomState::with_seeds(SEARCH_SEED, 0x9e3779b9, 0x85ebca6b, 0xc2b2ae35);
    let mut seen: HashSet<Vec<usize>, RandomState> = HashSet::with_hasher(hasher);
    seen.insert(current.clone());

    let mut stagnation = 0usize;

    for _ in 0..params.max_iterations {
        let mut mutated = current.clone();

        if !problematic.is_empty() && rng.gen_range(0..10) < 7 {
            let idx = problematic[rng.gen_range(0..problematic.len())];
            reassign(&mut mutated, idx, candidates, &mut rng);
        } else if !eligible.is_empty() {
            let num_changes = rng.gen_range(0..2) + 1;
            for _ in 0..num_changes {
                let idx = eligible[rng.gen_range(0..eligible.len())];
                reassign(&mut mutated, idx, candidates, &mut rng);
            }
        }

        // already evaluated: counts as a non-improving iteration
        if !seen.insert(mutated.clone()) {
            stagnation += 1;
            if stagnation > params.max_stagnation {
                break;
            }
            continue;
        }

        let decoded = decode(challenge, field, tables, candidates, &mutated);
        if decoded.score > best_score + EPSILON {
            best_score = decoded.score;
            best = mutated.clone();
            current = mutated;
            problematic = under_served(challenge, &decoded.solution);
            stagnation = 0;
        } else {
            stagnation += 1;
        }

        if stagnation > params.max_stagnation {
            break;
        }
    }

    SearchResult {
        assignment: best,
        score: best_score,
    }
}

// Moves the flow to a uniformly random different candidate index, when it
// has more than one.
fn reassign(
    assignment: &mut [usize],
    idx: usize,
    candidates: &[Vec<Candidate>],
    rng: &mut StdRng,
) {
    let num_cands = candidates[idx].len();
    if num_cands > 1 {
        let offset = rng.gen_range(1..num_cands);
        assignment[idx] = (assignment[idx] + offset) % num_cands;
    }
}

fn under_served(challenge: &Challenge, solution: &Solution) -> Vec<usize> {
    challenge
        .flows
        .iter()
        .zip(&solution.schedules)
        .enumerate()
        .filter(|(_, (flow, schedule))| {
            let delivered: f64 = schedule.iter().map(|item| item.amount).sum();
            delivered < flow.demand * SERVED_THRESHOLD
        })
        .map(|(i, _)| i)
        .collect()
}
