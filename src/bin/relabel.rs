//! relabel CLI — parallel SELinux relabeling, one job per mounted filesystem.

use clap::{Parser, Subcommand};
use relabel_rs::budget::ResourceBudget;
use relabel_rs::config::Config;
use relabel_rs::event::{Event, EventKind, EventSink};
use relabel_rs::launcher::JobLauncher;
use relabel_rs::model::RunReport;
use relabel_rs::mounts;
use relabel_rs::preflight;
use relabel_rs::scheduler::JobPool;
use relabel_rs::telemetry::{TelemetryConfig, init_telemetry};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "relabel", about = "Relabel SELinux contexts on every local filesystem in parallel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Relabel every discovered filesystem
    Run {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Fixed number of concurrent jobs (default: cpus minus reserved cores)
        #[arg(long)]
        max_jobs: Option<usize>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        /// Skip the root and SELinux mode checks
        #[arg(long)]
        skip_preflight: bool,
    },
    /// Show the work units and pool size without launching anything
    Plan {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            max_jobs,
            json,
            skip_preflight,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if max_jobs.is_some() {
                config.max_jobs = max_jobs;
            }
            cmd_run(config, json, skip_preflight).await
        }
        Command::Plan { config } => {
            let config = Config::load(config.as_deref())?;
            cmd_plan(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(config: Config, json: bool, skip_preflight: bool) -> anyhow::Result<ExitCode> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "relabel".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    if !skip_preflight {
        preflight::run_preflight(&config.selinuxfs)?;
    }

    let budget = ResourceBudget::detect(config.reserved_cores).with_override(config.max_jobs);
    let units = mounts::discover_from_table(&config.mount_table, &config.fs_types)?;
    tokio::fs::create_dir_all(&config.log_dir).await?;

    if !json {
        println!(
            "Relabeling {} filesystem(s) with up to {} concurrent job(s); logs in {}",
            units.len(),
            budget.max_jobs,
            config.log_dir.display()
        );
    }

    let (events, rx) = EventSink::channel();
    let progress = tokio::spawn(print_progress(rx, json));

    let pool = JobPool::new(
        JobLauncher::new(config.command.clone(), &config.log_dir),
        budget.max_jobs,
    )
    .with_events(events);
    let report = pool.run(units).await;
    drop(pool);
    let _ = progress.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_plan(config: &Config) -> anyhow::Result<()> {
    let budget = ResourceBudget::detect(config.reserved_cores).with_override(config.max_jobs);
    let entries = mounts::read_mount_table(&config.mount_table)?;
    let units = mounts::discover(&entries, &config.fs_types);

    println!(
        "CPUs: {}  reserved: {}  max jobs: {}",
        budget.total_cores, budget.reserved_cores, budget.max_jobs
    );
    println!("Filesystem types: {}", config.fs_types.join(", "));
    println!();

    if units.is_empty() {
        println!("No matching filesystems found.");
        return Ok(());
    }

    println!("{:<4}  {:<40}  LOG", "#", "PATH");
    println!("{}", "-".repeat(100));
    for (i, unit) in units.iter().enumerate() {
        println!(
            "{:<4}  {:<40}  {}",
            i + 1,
            unit.path.display(),
            unit.log_path(&config.log_dir).display()
        );
    }

    let uncovered = mounts::uncovered_mounts(&entries, &units);
    if !uncovered.is_empty() {
        println!("\nNested mounts that will NOT be relabeled:");
        for mount in &uncovered {
            println!("  {} ({})", mount.path.display(), mount.fs_type);
        }
    }

    println!("\n{} unit(s)", units.len());
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<Event>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        match event.kind {
            EventKind::JobLaunched { path, .. } => {
                println!("  started   {}", path.display());
            }
            EventKind::LaunchFailed { path, error, .. } => {
                println!("  FAILED    {}: {error}", path.display());
            }
            EventKind::JobFinished {
                path,
                status,
                duration_ms,
                ..
            } => {
                println!("  {status:<9} {} ({duration_ms}ms)", path.display());
            }
            EventKind::PoolSaturated { .. } => {}
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("{:<10}  {:<40}  LOG", "STATUS", "PATH");
    println!("{}", "-".repeat(100));
    for job in &report.jobs {
        println!(
            "{:<10}  {:<40}  {}",
            job.status,
            job.unit.path.display(),
            job.log_path.display()
        );
    }
    println!(
        "\n{} succeeded, {} failed in {:.1}s",
        report.succeeded(),
        report.failed(),
        report.elapsed().as_secs_f64()
    );
    for job in report.failures() {
        if let Some(ref error) = job.error {
            println!("  {}: {error}", job.unit.path.display());
        }
        println!("    see {}", job.log_path.display());
    }
}
