use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use gf_project::{Project, RunSettings};
use gf_results::{ResultStore, compute_run_id};
use gf_sim::{SOLVER_VERSION, SimulationDriver};

#[derive(Parser)]
#[command(name = "gf-cli")]
#[command(about = "GridFlow CLI - QSTS distribution feeder simulation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate project file syntax and structure
    Validate {
        /// Path to the project YAML file
        project_path: PathBuf,
    },
    /// List scenarios in a project
    Scenarios {
        /// Path to the project YAML file
        project_path: PathBuf,
    },
    /// Run a scenario
    Run {
        /// Path to the project YAML file
        project_path: PathBuf,
        /// Scenario ID to simulate
        scenario_id: String,
        /// Directory holding run outputs
        #[arg(short, long, default_value = "runs")]
        output: PathBuf,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
        /// Skip CSV materialization after the run
        #[arg(long)]
        no_export: bool,
    },
    /// List cached runs in an output directory
    Runs {
        /// Directory holding run outputs
        #[arg(short, long, default_value = "runs")]
        output: PathBuf,
    },
    /// Show details of a cached run
    ShowRun {
        /// Directory holding run outputs
        #[arg(short, long, default_value = "runs")]
        output: PathBuf,
        /// Run ID to display
        run_id: String,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] gf_project::ProjectError),

    #[error(transparent)]
    Sim(#[from] gf_sim::SimError),

    #[error(transparent)]
    Results(#[from] gf_results::ResultsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::Scenarios { project_path } => cmd_scenarios(&project_path),
        Commands::Run {
            project_path,
            scenario_id,
            output,
            no_cache,
            no_export,
        } => cmd_run(&project_path, &scenario_id, &output, !no_cache, !no_export),
        Commands::Runs { output } => cmd_runs(&output),
        Commands::ShowRun { output, run_id } => cmd_show_run(&output, &run_id),
    }
}

fn load_project(path: &Path) -> CliResult<Project> {
    let project = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => gf_project::load_json(path)?,
        _ => gf_project::load_yaml(path)?,
    };
    Ok(project)
}

fn cmd_validate(project_path: &Path) -> CliResult<()> {
    println!("Validating project: {}", project_path.display());
    load_project(project_path)?;
    println!("✓ Project is valid");
    Ok(())
}

fn cmd_scenarios(project_path: &Path) -> CliResult<()> {
    let project = load_project(project_path)?;

    if project.scenarios.is_empty() {
        println!("No scenarios found in project");
    } else {
        println!("Scenarios in project:");
        for scenario in &project.scenarios {
            println!(
                "  {} - {} ({} steps @ {} s, {} controllers)",
                scenario.id,
                scenario.name,
                scenario.simulation.horizon_steps,
                scenario.simulation.step_resolution_s,
                scenario.controllers.len()
            );
        }
    }
    Ok(())
}

fn cmd_run(
    project_path: &Path,
    scenario_id: &str,
    output: &Path,
    use_cache: bool,
    export: bool,
) -> CliResult<()> {
    let project = load_project(project_path)?;
    let scenario = project
        .scenarios
        .iter()
        .find(|s| s.id == scenario_id)
        .ok_or_else(|| CliError::Usage(format!("no scenario with id {scenario_id}")))?
        .clone();

    let settings = RunSettings::from_scenario(&scenario);
    let run_id = compute_run_id(&scenario, &settings, SOLVER_VERSION);
    if use_cache && ResultStore::has_run(output, &run_id) {
        println!("✓ Loaded from cache: {run_id}");
        return Ok(());
    }

    println!("Running scenario: {scenario_id}");
    let mut driver = SimulationDriver::new(scenario, output, None)?;
    let summary = driver.run()?;
    println!("✓ Simulation completed: {}", summary.run_id);
    println!(
        "  Steps: {} ({} fully converged)",
        summary.steps, summary.converged_steps
    );

    if export {
        let report = driver.export_csv("");
        for path in &report.exported {
            println!("  Exported {}", path.display());
        }
        for (table, error) in &report.failures {
            eprintln!("  Export failed for {table}: {error}");
        }
    }
    Ok(())
}

fn cmd_runs(output: &Path) -> CliResult<()> {
    let mut found = false;
    if output.is_dir() {
        for entry in std::fs::read_dir(output)? {
            let entry = entry?;
            let Some(run_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(manifest) = ResultStore::load_manifest(output, &run_id) else {
                continue;
            };
            found = true;
            println!(
                "  {} - scenario {} ({} steps, {})",
                manifest.run_id, manifest.scenario_id, manifest.horizon_steps, manifest.timestamp
            );
        }
    }
    if !found {
        println!("No cached runs in {}", output.display());
    }
    Ok(())
}

fn cmd_show_run(output: &Path, run_id: &str) -> CliResult<()> {
    let manifest = ResultStore::load_manifest(output, run_id)?;
    println!("Run {}", manifest.run_id);
    println!("  Scenario: {}", manifest.scenario_id);
    println!("  Started: {}", manifest.timestamp);
    println!("  Solver: {}", manifest.solver_version);
    println!(
        "  Horizon: {} steps @ {} s",
        manifest.horizon_steps, manifest.step_resolution_s
    );

    let index = output.join(run_id).join("index.csv");
    if let Ok(content) = std::fs::read_to_string(index) {
        println!("  Rows collected: {}", content.lines().count().saturating_sub(1));
    }
    Ok(())
}
