use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use access_cli::assistant::ServiceManager;
use access_cli::config::{AssistantConfig, ExecutorConfig};
use access_cli::executor::SandboxExecutor;
use access_cli::runner::{ContainerEngine, DockerCli};
use access_cli::validator::{TaskValidator, ValidationOptions};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

/// Validate an ACCESS task: run its commands in containers and check that
/// grading behaves on the template and the reference solution
#[derive(Parser, Debug)]
#[command(name = "access-cli", version)]
struct Cli {
    /// Task directory containing config.toml
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// User id passed to docker (default: current user)
    #[arg(short, long)]
    user: Option<String>,

    /// Expected exit code of run_command on the template
    #[arg(short, long)]
    run: Option<i32>,

    /// Expected exit code of test_command on the template
    #[arg(short, long)]
    test: Option<i32>,

    /// Run test_command on the solution and expect it to pass
    #[arg(short = 'T', long)]
    test_solution: bool,

    /// Grade the template and expect 0 points
    #[arg(short = 'g', long)]
    grade_template: bool,

    /// Grade the solution and expect max_points
    #[arg(short = 'G', long)]
    grade_solution: bool,

    /// Shell command turning the template into the solution
    #[arg(short, long)]
    solve_command: Option<String>,

    /// Course-level file staged for grading (repeatable)
    #[arg(short = 'f', long = "global-file")]
    global_files: Vec<String>,

    /// Course root that global files are relative to
    #[arg(short = 'C', long)]
    course_root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// API key forwarded to the AI grading service
    #[arg(long)]
    llm_api_key: Option<String>,

    /// Leave the AI grading service running afterwards
    #[arg(long)]
    llm_keep_service: bool,

    /// Only perform AI grading
    #[arg(long)]
    llm_only: bool,

    /// Base URL of the AI grading service
    #[arg(long)]
    assistant_url: Option<String>,

    /// Model overriding the task's [llm] model
    #[arg(long)]
    llm_model: Option<String>,

    /// Container command timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    /// Exit code for inconsistent flag combinations
    fn usage_error(&self) -> Option<(i32, &'static str)> {
        if self.grade_solution && self.solve_command.is_none() {
            return Some((11, "--grade-solution requires --solve-command"));
        }
        if !self.global_files.is_empty() && self.course_root.is_none() {
            return Some((12, "--global-file requires --course-root"));
        }
        if self.test_solution && self.solve_command.is_none() {
            return Some((13, "--test-solution requires --solve-command"));
        }
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "access_cli=debug"
    } else {
        "access_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    if let Some((code, message)) = cli.usage_error() {
        error!("{}", message);
        std::process::exit(code);
    }

    let mut executor_config = ExecutorConfig::from_env();
    if let Some(secs) = cli.timeout {
        executor_config.command_timeout = Duration::from_secs(secs);
    }
    executor_config.user = Some(
        cli.user
            .clone()
            .unwrap_or_else(|| nix::unistd::getuid().as_raw().to_string()),
    );

    let mut assistant_config = AssistantConfig::from_env();
    if let Some(url) = &cli.assistant_url {
        assistant_config = assistant_config.with_base_url(url)?;
    }
    if cli.llm_api_key.is_some() {
        assistant_config.api_key = cli.llm_api_key.clone();
    }
    assistant_config.model_override = cli.llm_model.clone();
    assistant_config.keep_running = cli.llm_keep_service;

    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerCli::new(&executor_config.docker_bin));
    let executor = SandboxExecutor::new(engine.clone(), executor_config);
    let mut service = ServiceManager::new(engine, assistant_config.clone());

    let options = ValidationOptions {
        run: cli.run,
        test: cli.test,
        test_solution: cli.test_solution,
        grade_template: cli.grade_template,
        grade_solution: cli.grade_solution,
        solve_command: cli.solve_command.clone(),
        global_files: cli.global_files.clone(),
        course_root: cli.course_root.clone(),
        llm_only: cli.llm_only,
    };

    let report = TaskValidator::new(&executor, &mut service, assistant_config, &options)
        .validate(&cli.directory)
        .await;

    if cli.llm_keep_service {
        service.release();
    } else {
        service.teardown().await;
    }

    if report.is_valid() {
        println!("❰ Validation successful ❱");
        for subject in &report.passed {
            println!(" ✓ {}", subject);
        }
        info!("{} checks passed", report.passed.len());
        Ok(())
    } else {
        println!("❰ Validation failed ❱");
        for message in report.error_messages() {
            println!(" ✗ {}", message);
        }
        std::process::exit(1);
    }
}
