//! Documentation generation with pdoc.
//!
//! ```ignore
//! let options = DocOptions { force: true, output_dir: "doc".into(), ..Default::default() };
//! let path = docs::make(&env, "pybuild", &options).await?;
//! ```

use std::path::{Path, PathBuf};

use build_launch::process::quote_arg;
use build_launch::FlagSet;
use log::info;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{EnvError, EnvResult};
use crate::pip::{self, Package};

/// Package providing the documentation generator.
pub const DOC_PACKAGE: &str = "pdoc3";

/// Module name the generator is run as.
const DOC_MODULE: &str = "pdoc";

/// Options recognised by [`make`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocOptions {
    /// `KEY=VALUE` template configuration override.
    pub config: Option<String>,
    /// Only document identifiers matching this filter.
    pub filter: Option<String>,
    /// Overwrite existing output.
    pub force: bool,
    pub html: bool,
    pub pdf: bool,
    pub output_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    /// `HOST:PORT` to serve the documentation on instead of writing it.
    pub http: Option<String>,
    /// Skip modules that fail to import.
    pub skip_errors: bool,
    /// Extra pip options used when pdoc has to be installed.
    pub install: FlagSet,
}

impl Default for DocOptions {
    fn default() -> Self {
        Self {
            config: None,
            filter: None,
            force: false,
            html: true,
            pdf: false,
            output_dir: PathBuf::from("."),
            template_dir: None,
            http: None,
            skip_errors: false,
            install: FlagSet::new(),
        }
    }
}

impl DocOptions {
    /// Command-line flags for the generator, in a fixed order.
    pub fn flags(&self) -> FlagSet {
        FlagSet::new()
            .opt_value("config", self.config.as_deref().map(quote_arg))
            .opt_value("filter", self.filter.as_deref().map(quote_arg))
            .switch("force", self.force)
            .switch("html", self.html)
            .switch("pdf", self.pdf)
            .value("output_dir", quote_arg(&self.output_dir.to_string_lossy()))
            .opt_value(
                "template_dir",
                self.template_dir
                    .as_ref()
                    .map(|p| quote_arg(&p.to_string_lossy())),
            )
            .opt_value("http", self.http.as_deref())
            .switch("skip_errors", self.skip_errors)
    }
}

/// Where pdoc writes the output for `package` under `output_dir`.
pub fn output_path(output_dir: &Path, package: &str) -> EnvResult<PathBuf> {
    let name = Path::new(package)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(package));
    Ok(std::path::absolute(output_dir)?.join(name))
}

/// Generate documentation for `package` (a module name or path).
///
/// Installs pdoc when missing, runs it through the active interpreter, and
/// returns the generated output path.
pub async fn make(env: &Environment, package: &str, options: &DocOptions) -> EnvResult<PathBuf> {
    pip::ensure_installed(env, &Package::new(DOC_PACKAGE), &options.install).await?;

    let args = format!(
        "-m {} {} {}",
        DOC_MODULE,
        options.flags().render(),
        quote_arg(package)
    );
    let code = env.run_python(args).await?;
    if code != 0 {
        return Err(EnvError::GenerationFailed {
            package: package.to_string(),
            code,
        });
    }

    let out_path = output_path(&options.output_dir, package)?;
    if !out_path.exists() {
        return Err(EnvError::NotFound(out_path));
    }
    info!("[pdoc] Documentation for {} written to {:?}", package, out_path);
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        assert_eq!(DocOptions::default().flags().render(), "--html --output-dir .");
    }

    #[test]
    fn test_all_flags() {
        let options = DocOptions {
            config: Some("show_source_code=False".into()),
            filter: Some("Environment".into()),
            force: true,
            html: false,
            pdf: true,
            output_dir: PathBuf::from("test doc"),
            template_dir: Some(PathBuf::from("templates")),
            http: Some(":8080".into()),
            skip_errors: true,
            install: FlagSet::new(),
        };
        assert_eq!(
            options.flags().render(),
            "--config show_source_code=False --filter Environment --force --pdf \
             --output-dir \"test doc\" --template-dir templates --http :8080 --skip-errors"
        );
    }

    #[test]
    fn test_options_from_json() {
        let options: DocOptions =
            serde_json::from_str(r#"{"force": true, "output_dir": "doc", "install": {"no_cache_dir": true}}"#)
                .unwrap();
        assert!(options.force);
        assert!(options.html);
        assert_eq!(options.output_dir, PathBuf::from("doc"));
        assert_eq!(options.install.render(), "--no-cache-dir");
    }

    #[cfg(unix)]
    #[test]
    fn test_output_path_uses_package_name() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            output_path(Path::new("doc"), "src/pybuild").unwrap(),
            cwd.join("doc").join("pybuild")
        );
        assert_eq!(
            output_path(Path::new("/tmp/doc"), "pybuild").unwrap(),
            PathBuf::from("/tmp/doc/pybuild")
        );
    }
}
