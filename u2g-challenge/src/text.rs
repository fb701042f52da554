// The instance/schedule wire format: whitespace-separated tokens.
//
// Instance: `M N FN T`, then M*N records `x y bandwidth phase`, then FN
// records `id x y start demand x_min y_min x_max y_max`.
//
// Schedule: per flow in ascending id order, `id count` followed by `count`
// records `t x y amount`; items sharing (t, x, y) are merged by summation
// and sorted lexicographically; integral amounts print without decimals.

use crate::{Challenge, Difficulty, Flow, Region, RelayCell, ScheduleItem, Solution, EPSILON};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};

fn next_token<'a, T, I>(tokens: &mut I, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    I: Iterator<Item = &'a str>,
{
    let tok = tokens
        .next()
        .ok_or_else(|| anyhow!("Unexpected end of input, expecting {}", what))?;
    tok.parse::<T>()
        .map_err(|_| anyhow!("Failed to parse {} from '{}'", what, tok))
}

pub fn parse_challenge(input: &str) -> Result<Challenge> {
    let mut tokens = input.split_whitespace();

    let width: usize = next_token(&mut tokens, "grid width")?;
    let height: usize = next_token(&mut tokens, "grid height")?;
    let num_flows: usize = next_token(&mut tokens, "flow count")?;
    let horizon: usize = next_token(&mut tokens, "time horizon")?;
    if width == 0 || height == 0 {
        return Err(anyhow!("Grid must be non-empty"));
    }

    let mut cells = vec![
        RelayCell {
            base_bandwidth: 0.0,
            phase: 0,
        };
        width * height
    ];
    for _ in 0..width * height {
        let x: usize = next_token(&mut tokens, "relay x")?;
        let y: usize = next_token(&mut tokens, "relay y")?;
        let base_bandwidth: f64 = next_token(&mut tokens, "relay bandwidth")?;
        let phase: u32 = next_token(&mut tokens, "relay phase")?;
        if x >= width || y >= height {
            return Err(anyhow!(
                "Relay ({}, {}) is outside the {}x{} grid",
                x,
                y,
                width,
                height
            ));
        }
        cells[x * height + y] = RelayCell {
            base_bandwidth,
            phase,
        };
    }

    let mut flows = Vec::with_capacity(num_flows);
    for _ in 0..num_flows {
        let id: u32 = next_token(&mut tokens, "flow id")?;
        let x: usize = next_token(&mut tokens, "flow origin x")?;
        let y: usize = next_token(&mut tokens, "flow origin y")?;
        let start_time: usize = next_token(&mut tokens, "flow start time")?;
        let demand: f64 = next_token(&mut tokens, "flow demand")?;
        let x_min: usize = next_token(&mut tokens, "region x_min")?;
        let y_min: usize = next_token(&mut tokens, "region y_min")?;
        let x_max: usize = next_token(&mut tokens, "region x_max")?;
        let y_max: usize = next_token(&mut tokens, "region y_max")?;
        if x >= width || y >= height {
            return Err(anyhow!("Flow {}: origin is outside the grid", id));
        }
        if x_min > x_max || y_min > y_max || x_max >= width || y_max >= height {
            return Err(anyhow!("Flow {}: invalid admissible region", id));
        }
        flows.push(Flow {
            id,
            origin: (x, y),
            start_time,
            demand,
            region: Region {
                x_min,
                y_min,
                x_max,
                y_max,
            },
        });
    }

    Ok(Challenge {
        seed: [0u8; 32],
        difficulty: Difficulty {
            grid_size: width.max(height),
            num_flows,
        },
        width,
        height,
        horizon,
        cells,
        flows,
    })
}

pub fn format_challenge(challenge: &Challenge) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} {} {}\n",
        challenge.width,
        challenge.height,
        challenge.flows.len(),
        challenge.horizon
    ));
    for x in 0..challenge.width {
        for y in 0..challenge.height {
            let cell = challenge.cell(x, y);
            out.push_str(&format!(
                "{} {} {} {}\n",
                x,
                y,
                format_amount(cell.base_bandwidth),
                cell.phase
            ));
        }
    }
    for flow in &challenge.flows {
        out.push_str(&format!(
            "{} {} {} {} {} {} {} {} {}\n",
            flow.id,
            flow.origin.0,
            flow.origin.1,
            flow.start_time,
            format_amount(flow.demand),
            flow.region.x_min,
            flow.region.y_min,
            flow.region.x_max,
            flow.region.y_max
        ));
    }
    out
}

pub fn format_solution(challenge: &Challenge, solution: &Solution) -> Result<String> {
    if solution.schedules.len() != challenge.flows.len() {
        return Err(anyhow!(
            "Expecting solution to have {} schedules. Got {}",
            challenge.flows.len(),
            solution.schedules.len()
        ));
    }

    let mut order: Vec<usize> = (0..challenge.flows.len()).collect();
    order.sort_by_key(|&i| challenge.flows[i].id);

    let mut out = String::new();
    for i in order {
        let mut merged: BTreeMap<(usize, usize, usize), f64> = BTreeMap::new();
        for item in &solution.schedules[i] {
            *merged.entry((item.t, item.x, item.y)).or_insert(0.0) += item.amount;
        }
        out.push_str(&format!("{} {}\n", challenge.flows[i].id, merged.len()));
        for ((t, x, y), amount) in merged {
            out.push_str(&format!("{} {} {} {}\n", t, x, y, format_amount(amount)));
        }
    }
    Ok(out)
}

pub fn parse_solution(challenge: &Challenge, input: &str) -> Result<Solution> {
    let index_by_id: HashMap<u32, usize> = challenge
        .flows
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id, i))
        .collect();

    let mut schedules = vec![Vec::new(); challenge.flows.len()];
    let mut seen = vec![false; challenge.flows.len()];
    let mut tokens = input.split_whitespace();

    while let Some(tok) = tokens.next() {
        let id: u32 = tok
            .parse()
            .map_err(|_| anyhow!("Failed to parse flow id from '{}'", tok))?;
        let count: usize = next_token(&mut tokens, "item count")?;
        let idx = *index_by_id
            .get(&id)
            .ok_or_else(|| anyhow!("Unknown flow id {}", id))?;
        if seen[idx] {
            return Err(anyhow!("Duplicate schedule for flow {}", id));
        }
        seen[idx] = true;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let t: usize = next_token(&mut tokens, "item time")?;
            let x: usize = next_token(&mut tokens, "item relay x")?;
            let y: usize = next_token(&mut tokens, "item relay y")?;
            let amount: f64 = next_token(&mut tokens, "item amount")?;
            items.push(ScheduleItem { t, x, y, amount });
        }
        schedules[idx] = items;
    }

    Ok(Solution { schedules })
}

pub fn format_amount(amount: f64) -> String {
    if (amount - amount.round()).abs() < EPSILON {
        format!("{}", amount.round() as i64)
    } else {
        format!("{:.6}", amount)
    }
}
