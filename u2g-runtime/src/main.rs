use anyhow::{anyhow, Result};
use clap::{arg, ArgAction, Command};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::{fs, io::Read, path::PathBuf};
use u2g_challenge::{text, Challenge, Difficulty, Solution};
use u2g_solver::solve_challenge;

fn cli() -> Command {
    Command::new("u2g-runtime")
        .about("Generates, solves and verifies UAV-to-ground relay instances")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("generate_instance")
                .about("Generates a random instance")
                .arg(arg!(<SEED> "Seed value").value_parser(clap::value_parser!(u64)))
                .arg(
                    arg!(<GRID_SIZE> "Grid size (M = N)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(<NUM_FLOWS> "Number of flows")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--output [OUTPUT_FILE] "If set, the instance is saved to this file path")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--json "Emit the instance as json instead of the text format")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("compute_solution")
                .about("Computes a schedule for an instance")
                .arg(
                    arg!(<INSTANCE> "Instance text, path to a file, or '-' for stdin")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--hyperparameters [HYPERPARAMETERS] "Hyperparameters json string or path to json file")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--output [OUTPUT_FILE] "If set, the schedule is saved to this file path")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--score "Print the aggregate score to stderr")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("verify_solution")
                .about("Verifies a schedule and prints its score")
                .arg(
                    arg!(<INSTANCE> "Instance text, path to a file, or '-' for stdin")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(<SOLUTION> "Schedule text, path to a file, or '-' for stdin")
                        .value_parser(clap::value_parser!(String)),
                ),
        )
}

fn main() {
    let matches = cli().get_matches();

    if let Err(e) = match matches.subcommand() {
        Some(("generate_instance", sub_m)) => generate_instance(
            *sub_m.get_one::<u64>("SEED").unwrap(),
            *sub_m.get_one::<usize>("GRID_SIZE").unwrap(),
            *sub_m.get_one::<usize>("NUM_FLOWS").unwrap(),
            sub_m.get_one::<PathBuf>("output").cloned(),
            *sub_m.get_one::<bool>("json").unwrap(),
        ),
        Some(("compute_solution", sub_m)) => compute_solution(
            sub_m.get_one::<String>("INSTANCE").unwrap().clone(),
            sub_m.get_one::<String>("hyperparameters").cloned(),
            sub_m.get_one::<PathBuf>("output").cloned(),
            *sub_m.get_one::<bool>("score").unwrap(),
        ),
        Some(("verify_solution", sub_m)) => verify_solution(
            sub_m.get_one::<String>("INSTANCE").unwrap().clone(),
            sub_m.get_one::<String>("SOLUTION").unwrap().clone(),
        ),
        _ => Err(anyhow!("Invalid subcommand")),
    } {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

pub fn generate_instance(
    seed: u64,
    grid_size: usize,
    num_flows: usize,
    output_file: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..8].copy_from_slice(&seed.to_be_bytes());
    let difficulty = Difficulty {
        grid_size,
        num_flows,
    };
    let challenge = Challenge::generate_instance(&seed_bytes, &difficulty)?;
    let out = if json {
        serde_json::to_string(&challenge)?
    } else {
        text::format_challenge(&challenge)
    };
    write_output(out, output_file)
}

pub fn compute_solution(
    instance: String,
    hyperparameters: Option<String>,
    output_file: Option<PathBuf>,
    print_score: bool,
) -> Result<()> {
    let challenge = parse_instance(&load_text(&instance)?)?;
    let hyperparameters = load_hyperparameters(hyperparameters)?;

    let solution = RefCell::new(Solution::new());
    let save_solution_fn = |s: &Solution| -> Result<()> {
        *solution.borrow_mut() = s.clone();
        Ok(())
    };
    solve_challenge(&challenge, &save_solution_fn, &hyperparameters)?;
    let solution = solution.into_inner();

    if print_score {
        eprintln!("Score: {:.3}", challenge.evaluate_solution(&solution)?);
    }
    write_output(text::format_solution(&challenge, &solution)?, output_file)
}

pub fn verify_solution(instance: String, solution: String) -> Result<()> {
    let challenge = parse_instance(&load_text(&instance)?)?;
    let solution = text::parse_solution(&challenge, &load_text(&solution)?)?;
    challenge.verify_solution(&solution)?;
    let score = challenge.evaluate_solution(&solution)?;
    println!("Solution is valid (score: {:.3})", score);
    Ok(())
}

fn parse_instance(input: &str) -> Result<Challenge> {
    if input.trim_start().starts_with('{') {
        Ok(serde_json::from_str::<Challenge>(input)?)
    } else {
        text::parse_challenge(input)
    }
}

fn load_hyperparameters(hyperparameters: Option<String>) -> Result<Option<Map<String, Value>>> {
    match hyperparameters {
        Some(h) => {
            let h = if h.ends_with(".json") {
                fs::read_to_string(&h)
                    .map_err(|e| anyhow!("Failed to read hyperparameters file {}: {}", h, e))?
            } else {
                h
            };
            Ok(Some(serde_json::from_str::<Map<String, Value>>(&h)?))
        }
        None => Ok(None),
    }
}

fn load_text(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| anyhow!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else if fs::metadata(arg).is_ok() {
        fs::read_to_string(arg).map_err(|e| anyhow!("Failed to read file {}: {}", arg, e))
    } else {
        Ok(arg.to_string())
    }
}

fn write_output(contents: String, output_file: Option<PathBuf>) -> Result<()> {
    match output_file {
        Some(path) => fs::write(&path, contents)
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e)),
        None => {
            print!("{}", contents);
            Ok(())
        }
    }
}
