//! pybuild CLI entry point.
//!
//! Runs build plans in a throwaway virtual environment and exposes the
//! individual drivers (source fetch, interpreter info, URL checks) as
//! subcommands.

mod plan;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use build_env::progress::{LogHandler, ProgressHandler};
use build_env::{git, CloneOptions, Settings};
use clap::{Parser, Subcommand};
use log::info;

use crate::plan::{BuildPlan, JsonHandler, DEFAULT_PLAN_FILE};

#[derive(Parser, Debug)]
#[command(name = "pybuild")]
#[command(about = "Build Python projects in isolated virtual environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a build plan
    Build {
        /// Build plan file
        #[arg(long, default_value = DEFAULT_PLAN_FILE)]
        plan: PathBuf,

        /// Emit progress and the final report as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Clone a git repository
    Clone {
        url: String,

        /// Target directory (default: derived from the URL)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Branch to check out
        #[arg(long)]
        branch: Option<String>,

        /// Don't ask git to report progress
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the resolved system interpreter and tools
    Info,

    /// Check whether a URL would be accepted for cloning
    CheckUrl { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let settings = match &cli.config {
        Some(path) => build_env::load_settings_from(path),
        None => build_env::load_settings(),
    };

    match cli.command {
        Commands::Build { plan, json } => build(&settings, plan, json).await,
        Commands::Clone {
            url,
            dest,
            branch,
            no_progress,
        } => {
            let options = CloneOptions {
                destination: dest,
                branch,
                progress: !no_progress,
            };
            clone(&settings, &url, &options).await
        }
        Commands::Info => show_info(&settings, cli.config).await,
        Commands::CheckUrl { url } => check_url(&url),
    }
}

async fn build(settings: &Settings, plan_path: PathBuf, json: bool) -> anyhow::Result<()> {
    let plan = BuildPlan::load(&plan_path)?;
    info!("Running build plan {:?} in {}", plan_path, plan.env_name);

    let progress: Arc<dyn ProgressHandler> = if json {
        Arc::new(JsonHandler)
    } else {
        Arc::new(LogHandler)
    };

    // Dropping the build future on Ctrl-C tears the environment down.
    let report = tokio::select! {
        report = plan::execute(&plan, settings, progress) => report?,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        for path in &report.cloned {
            println!("Cloned: {}", path.display());
        }
        if let Some(path) = &report.docs {
            println!("Documentation: {}", path.display());
        }
        if let Some(path) = &report.frozen {
            println!("Requirements: {}", path.display());
        }
    }
    Ok(())
}

async fn clone(settings: &Settings, url: &str, options: &CloneOptions) -> anyhow::Result<()> {
    let git_path = match &settings.git {
        Some(path) => path.clone(),
        None => build_launch::get_git_path().await?,
    };
    match git::clone(&settings.runner(), &git_path, url, options).await? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("Invalid URL: {}", url),
    }
}

async fn show_info(settings: &Settings, config: Option<PathBuf>) -> anyhow::Result<()> {
    let python = match &settings.python {
        Some(path) => build_launch::find_python(Some(path))?,
        None => build_launch::get_python_path().await?,
    };
    let interpreter = build_env::interpreter_info(&settings.runner(), &python).await?;

    println!("pybuild {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Settings:  {}",
        config.unwrap_or_else(build_env::settings_path).display()
    );
    println!("Platform:  {}", build_env::Platform::current()?);
    println!("Python:    {} [{}]", python.display(), interpreter);
    let git = match &settings.git {
        Some(path) => Ok(path.clone()),
        None => build_launch::get_git_path().await,
    };
    match git {
        Ok(path) => println!("Git:       {}", path.display()),
        Err(e) => println!("Git:       {}", e),
    }
    println!("Base dir:  {}", settings.base_dir().display());
    Ok(())
}

fn check_url(url: &str) -> anyhow::Result<()> {
    if build_env::validate_url(url) {
        println!("valid");
        Ok(())
    } else {
        bail!("Invalid URL: {}", url)
    }
}
