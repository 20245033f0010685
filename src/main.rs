//! CodeCrew - Multi-Role Coding Pipeline Orchestrator
//!
//! Command-line front-end over the orchestration core: plan a requirement,
//! run it through the task loop, or drive the full staged role pipeline.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use codecrew::collab::{
    CliGenerator, LlmAuditor, LlmPlanner, LlmPostMortem, Planner, ShellExecutor,
};
use codecrew::config::CrewConfig;
use codecrew::controller::{RunStatus, TaskLoopController};
use codecrew::error::CrewError;
use codecrew::worker::Worker;
use codecrew::workflow::WorkflowScheduler;
use codecrew::AbortFlag;

#[derive(Parser)]
#[command(name = "codecrew")]
#[command(version = "0.1.0")]
#[command(about = "Multi-role coding pipeline: plan, generate, execute, audit", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a requirement and print the task queue without executing it
    Plan {
        /// The requirement to break down
        requirement: String,
    },

    /// Plan and execute a requirement through the audited task loop
    Run {
        /// The requirement to implement
        requirement: String,
    },

    /// Drive a requirement through the full staged role pipeline
    Pipeline {
        /// The requirement to deliver
        requirement: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "codecrew=debug,info"
    } else {
        "codecrew=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let config = match CrewConfig::load(&project_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    };

    let generator = Arc::new(CliGenerator::new(config.llm.clone(), &project_path));
    if !generator.is_available() {
        eprintln!(
            "{} LLM CLI '{}' not found on PATH",
            "Error:".red().bold(),
            config.llm.command
        );
        std::process::exit(
            CrewError::collaborator(config.llm.command.clone(), "not found on PATH").exit_code(),
        );
    }

    let abort = AbortFlag::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} finishing current step...", "Interrupted,".yellow());
                abort.abort();
            }
        });
    }

    match cli.command {
        Commands::Plan { requirement } => {
            let planner = LlmPlanner::new(generator);
            let tasks = planner.plan(&requirement).await;
            if tasks.is_empty() {
                eprintln!("{} planning produced no tasks", "Error:".red().bold());
                std::process::exit(
                    CrewError::EmptyPlan { requirement }.exit_code(),
                );
            }
            println!("{}", "Planned tasks:".bold());
            for (i, task) in tasks.iter().enumerate() {
                println!(
                    "  {}. [{}] {}",
                    i + 1,
                    format!("{:?}", task.priority).to_lowercase().cyan(),
                    task.description
                );
            }
        }

        Commands::Run { requirement } => {
            let executor = Arc::new(ShellExecutor::new(&project_path));
            let controller = TaskLoopController::new(
                Arc::new(LlmPlanner::new(generator.clone())),
                Worker::new(generator.clone(), executor, config.engine.clone()),
                Arc::new(LlmAuditor::new(generator)),
                config.engine.clone(),
            )
            .with_abort(abort);

            match controller.run(&requirement).await {
                Ok(report) => {
                    let banner = match report.status {
                        RunStatus::Completed => "Run completed".green().bold(),
                        RunStatus::Aborted => "Run aborted".yellow().bold(),
                    };
                    println!(
                        "\n{} {}/{} tasks done, {} replan(s)",
                        banner, report.completed_tasks, report.total_tasks, report.replans
                    );
                    if report.status == RunStatus::Aborted {
                        std::process::exit(CrewError::aborted("interrupted").exit_code());
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    std::process::exit(e.exit_code());
                }
            }
        }

        Commands::Pipeline { requirement } => {
            let executor = Arc::new(ShellExecutor::new(&project_path));
            let lessons_path = config.lessons_path();
            let scheduler = WorkflowScheduler::new(
                generator.clone(),
                Arc::new(LlmAuditor::new(generator.clone())),
                executor,
                Arc::new(LlmPostMortem::new(generator, lessons_path)),
                config.clone(),
            )
            .with_artifacts_dir(project_path.join(&config.artifacts_dir))
            .with_abort(abort);

            match scheduler.run(&requirement).await {
                Ok(report) => {
                    if report.is_completed() {
                        println!(
                            "\n{} {} stage(s), {} review cycle(s)",
                            "Pipeline completed".green().bold(),
                            report.stages_run.len(),
                            report.review_cycles
                        );
                    } else {
                        let reason = report.failure.unwrap_or_else(|| "unknown".to_string());
                        eprintln!("\n{} {}", "Pipeline failed:".red().bold(), reason);
                        std::process::exit(
                            CrewError::stage(report.final_stage.to_string(), reason).exit_code(),
                        );
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    std::process::exit(e.exit_code());
                }
            }
        }
    }

    Ok(())
}
