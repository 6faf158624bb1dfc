use std::path::PathBuf;
use std::process::ExitCode;

use bin_packer::instance::{Demand, Instance};
use bin_packer::render;
use bin_packer::solver::{Solver, SolverConfig, Strategy};
use bin_packer::types::{Outcome, Rect, SolveReport};
use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "bin_packer",
    about = "Exact 2D bin packing via logic-based Benders decomposition"
)]
struct Cli {
    /// Instance file in 2DPackLib format
    #[arg(long, conflicts_with_all = ["bin", "items"])]
    instance: Option<PathBuf>,

    /// Bin dimensions (WxH, e.g. 10x8)
    #[arg(long, required_unless_present = "instance")]
    bin: Option<String>,

    /// Items as id:WxH:qty (e.g. 1:4x3:2 2:2x2:5)
    #[arg(long, num_args = 1..)]
    items: Vec<String>,

    /// Solution strategy
    #[arg(long, value_enum, default_value_t = Strategy::Benders)]
    strategy: Strategy,

    /// Wall-clock limit in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Multiplier on the area lower bound used to size the model
    #[arg(long, default_value_t = 1.2)]
    bin_factor: f64,

    /// Explicit number of bins to model
    #[arg(long)]
    max_bins: Option<usize>,

    /// Write solver logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose solver logs
    #[arg(short, long)]
    verbose: bool,

    /// Show ASCII layout of each bin
    #[arg(long)]
    layout: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_dimensions(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("invalid dimensions '{}', expected WxH", s));
    }
    let w = parts[0]
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let h = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok(Rect::new(w, h))
}

fn parse_item(s: &str) -> Result<Demand, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("invalid item '{}', expected id:WxH:qty", s));
    }
    let id = parts[0]
        .parse::<u32>()
        .map_err(|_| format!("invalid id in '{}'", s))?;
    let rect = parse_dimensions(parts[1])?;
    let qty = parts[2]
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    if qty == 0 {
        return Err(format!("quantity must be non-zero in '{}'", s));
    }
    Ok(Demand { id, rect, qty })
}

fn load_instance(cli: &Cli) -> Result<Instance, String> {
    if let Some(path) = &cli.instance {
        return Instance::from_file(path).map_err(|e| format!("{}: {}", path.display(), e));
    }
    let bin = parse_dimensions(cli.bin.as_deref().unwrap_or_default())?;
    let demands = cli
        .items
        .iter()
        .map(|s| parse_item(s))
        .collect::<Result<Vec<_>, _>>()?;
    Instance::from_demands("cli", bin, &demands).map_err(|e| e.to_string())
}

fn init_logging(cli: &Cli) -> Result<(), String> {
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level);
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
            builder.with_writer(file).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn print_report(report: &SolveReport, layout: bool) {
    let stats = &report.stats;
    let solution = match &report.outcome {
        Outcome::Packed { solution } => solution,
        Outcome::NoSolution => {
            println!("No solution found within the time limit");
            return;
        }
        Outcome::Infeasible => {
            println!(
                "Infeasible: items do not fit in {} bin{}",
                stats.bin_bound,
                if stats.bin_bound == 1 { "" } else { "s" }
            );
            return;
        }
        Outcome::Unbounded => {
            println!("Unbounded");
            return;
        }
    };

    for bin in &solution.bins {
        println!("Bin {}:", bin.index);
        for p in &bin.placements {
            println!("  item {} (#{}) {} @ ({}, {})", p.item, p.label, p.rect, p.x, p.y);
        }
        if layout {
            print!("{}", render::render_bin(solution.stock, &bin.placements));
        }
        println!();
    }

    println!(
        "Summary: {} bin{} used, {:.1}% waste{}",
        solution.bin_count(),
        if solution.bin_count() == 1 { "" } else { "s" },
        solution.total_waste_percent(),
        if stats.optimal { ", optimal" } else { "" },
    );
    if stats.incomplete {
        println!("Warning: cut generation hit the time limit; layout is unverified");
    }
    println!(
        "Time: {:.3}s total, {:.3}s in cut generation, {} cut{}, {} node{}",
        stats.total_time_secs,
        stats.callback_time_secs,
        stats.feasibility_cuts,
        if stats.feasibility_cuts == 1 { "" } else { "s" },
        stats.node_count,
        if stats.node_count == 1 { "" } else { "s" },
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let instance = match load_instance(&cli) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = SolverConfig {
        strategy: cli.strategy,
        time_limit_secs: cli.time_limit,
        bin_bound_factor: cli.bin_factor,
        max_bins: cli.max_bins,
    };
    let report = match Solver::new(instance, config).solve() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report, cli.layout);
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("10x8").unwrap(), Rect::new(10, 8));
        assert!(parse_dimensions("10").is_err());
        assert!(parse_dimensions("0x8").is_err());
        assert!(parse_dimensions("ax8").is_err());
    }

    #[test]
    fn test_parse_item() {
        let d = parse_item("3:4x2:5").unwrap();
        assert_eq!((d.id, d.rect, d.qty), (3, Rect::new(4, 2), 5));
        assert!(parse_item("4x2:5").is_err());
        assert!(parse_item("3:4x2:0").is_err());
    }

    #[test]
    fn test_cli_requires_bin_or_instance() {
        assert!(Cli::try_parse_from(["bin_packer"]).is_err());
        assert!(Cli::try_parse_from(["bin_packer", "--bin", "4x4", "--items", "1:2x2:4"]).is_ok());
        assert!(
            Cli::try_parse_from(["bin_packer", "--instance", "a.txt", "--bin", "4x4"]).is_err()
        );
    }
}
