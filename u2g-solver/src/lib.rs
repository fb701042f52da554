pub mod candidates;
pub mod decoder;
pub mod search;

use anyhow::Result;
use serde_json::{Map, Value};
use u2g_challenge::{Challenge, Solution};

use crate::candidates::build_candidates;
use crate::decoder::decode;
use crate::search::{local_search, SearchParams};

pub fn solve_challenge(
    challenge: &Challenge,
    save_solution: &dyn Fn(&Solution) -> Result<()>,
    hyperparameters: &Option<Map<String, Value>>,
) -> Result<()> {
    let field = challenge.capacity_field();
    let tables = challenge.decay_tables();
    let candidates = build_candidates(challenge, &field, &tables);

    // candidates are ranked, so index 0 per flow is the greedy start
    let initial = vec![0usize; challenge.flows.len()];
    let params = SearchParams::from_hyperparameters(hyperparameters);
    let result = local_search(challenge, &field, &tables, &candidates, initial, &params);

    let decoded = decode(challenge, &field, &tables, &candidates, &result.assignment);
    save_solution(&decoded.solution)?;
    Ok(())
}
