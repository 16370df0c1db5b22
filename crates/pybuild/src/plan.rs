//! Build plans: a JSON description of one build, executed step by step.
//!
//! ```json
//! {
//!   "env_name": "pybuildenv",
//!   "sources": [{ "url": "https://github.com/foobar/baz.git", "branch": "dev" }],
//!   "packages": [{ "name": "requests", "version": "2.31.0" }],
//!   "docs": { "package": "baz", "output_dir": "doc", "force": true },
//!   "executable": { "args": "--onefile baz/main.py" },
//!   "freeze": "requirements.txt"
//! }
//! ```
//!
//! Steps run in a fixed order: clone, provision, install, upgrade, list,
//! docs, executable, freeze. The environment is torn down when the plan
//! finishes, fails, or is interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use build_env::progress::{EnvProgressPhase, ProgressHandler};
use build_env::{
    docs, git, packager, pip, virtualenv, CloneOptions, DocOptions, Environment, Package,
    ProvisionOptions, Settings,
};
use build_launch::FlagSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Environment name used when a plan does not set one.
pub const DEFAULT_ENV_NAME: &str = "pybuildenv";

/// Plan file looked up when none is given on the command line.
pub const DEFAULT_PLAN_FILE: &str = "pybuild.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildPlan {
    pub env_name: String,
    pub provision: ProvisionOptions,
    pub sources: Vec<SourceStep>,
    pub packages: Vec<Package>,
    /// pip options for `packages`.
    pub install_options: FlagSet,
    pub upgrade: Vec<Package>,
    /// Log `pip list` after installing.
    pub list: bool,
    pub docs: Option<DocsStep>,
    pub executable: Option<ExecutableStep>,
    /// Write `pip freeze` output here before teardown.
    pub freeze: Option<PathBuf>,
}

impl Default for BuildPlan {
    fn default() -> Self {
        Self {
            env_name: DEFAULT_ENV_NAME.to_string(),
            provision: ProvisionOptions::default(),
            sources: Vec::new(),
            packages: Vec::new(),
            install_options: FlagSet::new(),
            upgrade: Vec::new(),
            list: false,
            docs: None,
            executable: None,
            freeze: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStep {
    pub url: String,
    #[serde(flatten)]
    pub options: CloneOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsStep {
    pub package: String,
    #[serde(flatten)]
    pub options: DocOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableStep {
    /// Raw PyInstaller arguments.
    pub args: String,
}

/// What a finished plan produced.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub python: Option<PathBuf>,
    pub cloned: Vec<PathBuf>,
    pub docs: Option<PathBuf>,
    pub executable_code: Option<i32>,
    pub frozen: Option<PathBuf>,
}

impl BuildPlan {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build plan {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse build plan {:?}", path))
    }
}

/// Progress handler writing each phase as one JSON line on stdout.
pub struct JsonHandler;

impl ProgressHandler for JsonHandler {
    fn on_progress(&self, env_name: &str, phase: EnvProgressPhase) {
        if let Some(line) = progress_json(env_name, &phase) {
            println!("{line}");
        }
    }
}

fn progress_json(env_name: &str, phase: &EnvProgressPhase) -> Option<String> {
    let mut value = serde_json::to_value(phase).ok()?;
    value
        .as_object_mut()?
        .insert("env".to_string(), env_name.into());
    Some(value.to_string())
}

/// Run every step of `plan`. The environment is removed before this returns.
pub async fn execute(
    plan: &BuildPlan,
    settings: &Settings,
    progress: Arc<dyn ProgressHandler>,
) -> anyhow::Result<BuildReport> {
    let mut report = BuildReport::default();

    if !plan.sources.is_empty() {
        let git_path = match &settings.git {
            Some(path) => path.clone(),
            None => build_launch::get_git_path().await?,
        };
        let runner = settings.runner();
        for source in &plan.sources {
            match git::clone(&runner, &git_path, &source.url, &source.options).await? {
                Some(path) => report.cloned.push(path),
                None => warn!("Skipping source {:?}", source.url),
            }
        }
    }

    let mut env = Environment::from_settings(&plan.env_name, settings)
        .await?
        .with_progress(progress);
    let mut provision = plan.provision.clone();
    if provision.version.is_none() {
        provision.version = settings.virtualenv_version.clone();
    }
    report.python = Some(virtualenv::provision(&mut env, &provision).await?);

    if !plan.packages.is_empty() {
        pip::install(&env, &plan.packages, &plan.install_options).await?;
    }
    if !plan.upgrade.is_empty() {
        pip::upgrade(&env, &plan.upgrade).await?;
    }
    if plan.list {
        pip::list(&env, true).await?;
    }

    if let Some(step) = &plan.docs {
        report.docs = Some(docs::make(&env, &step.package, &step.options).await?);
    }

    if let Some(step) = &plan.executable {
        let code = packager::make(&env, &step.args).await?;
        report.executable_code = Some(code);
        if code != 0 {
            bail!("PyInstaller exited with code {}", code);
        }
    }

    if let Some(file) = &plan.freeze {
        report.frozen = Some(pip::freeze(&env, file).await?);
    }

    info!("Build in {} finished", env.name());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_plan_uses_defaults() {
        let plan: BuildPlan = serde_json::from_str("{}").unwrap();
        assert_eq!(plan, BuildPlan::default());
        assert_eq!(plan.env_name, DEFAULT_ENV_NAME);
        assert!(plan.docs.is_none());
    }

    #[test]
    fn test_full_plan_parses() {
        let plan: BuildPlan = serde_json::from_str(
            r#"{
                "env_name": "release",
                "provision": { "clean": true, "version": ">=20" },
                "sources": [
                    { "url": "https://github.com/foobar/baz.git", "branch": "dev", "progress": false }
                ],
                "packages": [{ "name": "requests", "version": "2.31.0" }, { "name": "attrs" }],
                "install_options": { "no_cache_dir": true, "index_url": "https://pypi.org/simple" },
                "upgrade": [{ "name": "pip" }],
                "list": true,
                "docs": { "package": "baz", "output_dir": "doc", "force": true },
                "executable": { "args": "--onefile baz/main.py" },
                "freeze": "requirements.txt"
            }"#,
        )
        .unwrap();

        assert_eq!(plan.env_name, "release");
        assert!(plan.provision.clean);
        assert_eq!(plan.sources[0].options.branch.as_deref(), Some("dev"));
        assert!(!plan.sources[0].options.progress);
        assert!(plan.sources[0].options.destination.is_none());
        assert_eq!(plan.packages[0].to_string(), "requests==2.31.0");
        assert_eq!(plan.packages[1].to_string(), "attrs");
        assert_eq!(
            plan.install_options.render(),
            "--index-url https://pypi.org/simple --no-cache-dir"
        );

        let docs = plan.docs.unwrap();
        assert_eq!(docs.package, "baz");
        assert!(docs.options.force);
        assert!(docs.options.html);
        assert_eq!(docs.options.output_dir, PathBuf::from("doc"));

        assert_eq!(plan.executable.unwrap().args, "--onefile baz/main.py");
        assert_eq!(plan.freeze, Some(PathBuf::from("requirements.txt")));
    }

    #[test]
    fn test_load_reports_missing_and_invalid_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_PLAN_FILE);
        assert!(BuildPlan::load(&path).is_err());

        std::fs::write(&path, "{ \"packages\": 3 }").unwrap();
        let err = BuildPlan::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));

        std::fs::write(&path, r#"{ "list": true }"#).unwrap();
        assert!(BuildPlan::load(&path).unwrap().list);
    }

    #[test]
    fn test_progress_json_adds_env() {
        let line = progress_json(
            "e1",
            &EnvProgressPhase::InstallingTool {
                package: "virtualenv".into(),
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["env"], "e1");
        assert_eq!(value["phase"], "installing_tool");
        assert_eq!(value["package"], "virtualenv");
    }

    #[tokio::test]
    async fn test_execute_rejects_env_name_outside_base_dir() {
        let temp = TempDir::new().unwrap();
        let python = temp.path().join("python");
        std::fs::write(&python, "").unwrap();
        let settings = Settings {
            python: Some(python),
            base_dir: Some(temp.path().join("envs")),
            ..Default::default()
        };
        let plan = BuildPlan {
            env_name: "..".into(),
            ..Default::default()
        };

        let err = execute(&plan, &settings, Arc::new(build_env::NullHandler))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<build_env::EnvError>(),
            Some(build_env::EnvError::InvalidName(_))
        ));
        assert!(temp.path().join("python").exists());
    }
}
