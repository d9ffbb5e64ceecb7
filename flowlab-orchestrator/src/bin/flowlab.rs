//! FlowLab CLI - run one wind tunnel case from the terminal
//!
//! Usage:
//!   flowlab <MESH.stl> --case <DIR> [--config <FILE>] [--out <FILE>] [-v]
//!   flowlab --case <DIR> --skip-solver [--out <FILE>]
//!
//! Example:
//!   flowlab audi.stl --case ./windtunnel --out audi_flow_results.glb

use anyhow::{bail, Context, Result};
use colored::Colorize;
use flowlab::solver::{JobState, SolverJob, SolverSpec};
use flowlab::upload::{self, UploadPolicy};
use flowlab::{postprocess, presentation, LabConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn print_usage() {
    eprintln!(
        r#"
{} - Virtual wind tunnel: mesh in, streamlines out

{}
    flowlab [MESH] --case <DIR> [OPTIONS]

{}
    [MESH]     Surface mesh of the body (.stl); optional with --skip-solver

{}
    -c, --case <DIR>        Case directory with the solver script (default: .)
    --config <FILE>         Config file (default: flowlab.toml if present)
    -o, --out <FILE>        Also copy the exported GLB here
    --skip-solver           Only post-process existing results
    -v, --verbose           Show debug logging
    -h, --help              Print this help message

{}
    flowlab audi.stl --case ./windtunnel
    flowlab --case ./windtunnel --skip-solver -o view.glb
"#,
        "FlowLab CLI".bold(),
        "USAGE:".bold(),
        "ARGS:".bold(),
        "OPTIONS:".bold(),
        "EXAMPLES:".bold(),
    );
}

struct CliArgs {
    mesh: Option<PathBuf>,
    case_dir: PathBuf,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    skip_solver: bool,
    verbose: bool,
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(0);
    }

    let mut mesh = None;
    let mut case_dir = PathBuf::from(".");
    let mut config = None;
    let mut out = None;
    let mut skip_solver = false;
    let mut verbose = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--case" | "-c" => {
                i += 1;
                case_dir = PathBuf::from(args.get(i).context("--case needs a directory")?);
            }
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(args.get(i).context("--config needs a file")?));
            }
            "--out" | "-o" => {
                i += 1;
                out = Some(PathBuf::from(args.get(i).context("--out needs a file")?));
            }
            "--skip-solver" => skip_solver = true,
            "--verbose" | "-v" => verbose = true,
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            other => {
                if mesh.is_some() {
                    bail!("Unexpected argument: {}", other);
                }
                mesh = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    if mesh.is_none() && !skip_solver {
        print_usage();
        std::process::exit(1);
    }

    Ok(CliArgs {
        mesh,
        case_dir,
        config,
        out,
        skip_solver,
        verbose,
    })
}

fn load_config(path: Option<&Path>) -> Result<LabConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from("flowlab.toml");
            if !default.exists() {
                return Ok(LabConfig::default());
            }
            default
        }
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    LabConfig::from_toml(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

async fn run_solver(config: &LabConfig, case_dir: &Path) -> Result<JobState> {
    let spec = SolverSpec::from_config(&config.solver, case_dir);
    eprintln!(
        "{} {} {}",
        "▶".cyan(),
        "Running".bold(),
        format!("{} {}", spec.shell.display(), spec.script.display()).dimmed()
    );

    let job = SolverJob::spawn(spec)?;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut next = 0;

    loop {
        ticker.tick().await;
        let finished = job.state().is_terminal();

        let slice = job.lines_since(next);
        if slice.dropped > next {
            eprintln!("{}", format!("... {} lines dropped", slice.dropped - next).dimmed());
        }
        for line in &slice.lines {
            eprintln!("  {}", line.dimmed());
        }
        next = slice.next;

        if finished {
            break;
        }
    }

    let state = job.wait().await;
    eprintln!(
        "{} solver finished in {:.1}s",
        "■".cyan(),
        job.elapsed().as_secs_f64()
    );
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(args.config.as_deref())?;
    let case_dir = args.case_dir.clone();
    if !case_dir.is_dir() {
        bail!("Case directory not found: {}", case_dir.display());
    }

    if let Some(mesh) = &args.mesh {
        let bytes = std::fs::read(mesh)
            .with_context(|| format!("Failed to read {}", mesh.display()))?;
        let name = mesh
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let policy = UploadPolicy::new(&config.case, config.max_upload_bytes);
        let stored = upload::store_mesh(&case_dir, &config.case.mesh_path, name, &bytes, &policy)?;
        eprintln!("{} mesh stored at {}", "✓".green(), stored.display());
    }

    if !args.skip_solver {
        // A marker from an earlier run would hide a failed one
        let marker = case_dir.join(&config.case.marker_file);
        if marker.exists() {
            std::fs::remove_file(&marker)
                .with_context(|| format!("Failed to remove {}", marker.display()))?;
        }

        match run_solver(&config, &case_dir).await? {
            JobState::Exited { code: Some(0) } => {}
            JobState::Exited { code } => eprintln!(
                "{} solver exited with code {}",
                "!".yellow(),
                code.map_or("signal".to_string(), |c| c.to_string())
            ),
            other => bail!("Solver did not finish: {:?}", other),
        }
    }

    if !postprocess::marker_present(&case_dir, &config.case) {
        bail!(
            "No results found ({} missing in {})",
            config.case.marker_file,
            case_dir.display()
        );
    }

    let visual = config.visual.clone();
    let case = config.case.clone();
    let dir = case_dir.clone();
    let vis =
        tokio::task::spawn_blocking(move || postprocess::visualize(&dir, &visual, &case)).await??;

    if let Some(out) = &args.out {
        std::fs::write(out, &vis.glb)
            .with_context(|| format!("Failed to write {}", out.display()))?;
    }

    println!();
    println!("{}", "Aerodynamics".bold());
    println!(
        "  {:<20} {}",
        "Top Air Velocity:".dimmed(),
        presentation::format_velocity(vis.max_velocity).green().bold()
    );
    println!("  {:<20} {}", "Time step:".dimmed(), vis.time);
    println!("  {:<20} {}", "Streamlines:".dimmed(), vis.streamline_count);
    println!(
        "  {:<20} {}",
        "Body surface:".dimmed(),
        if vis.has_body { "yes".normal() } else { "not found".yellow() }
    );
    println!("  {:<20} {}", "3D model:".dimmed(), vis.asset_path.display());
    if let Some(out) = &args.out {
        println!("  {:<20} {}", "Copied to:".dimmed(), out.display());
    }

    Ok(())
}
