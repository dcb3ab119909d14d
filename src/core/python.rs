use crate::config::build_spec::PythonConfig;
use crate::domain::ports::ScriptRunner;
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const EXTRACT_SCRIPT_FILE: &str = "extract-dependencies.sh";

const EXTRACT_SCRIPT: &str = r#"#!/usr/bin/env bash
set -euxo pipefail

python3 -m venv .venv
. .venv/bin/activate
pip install poetry poetry-plugin-export
poetry lock
poetry export --without-hashes --format=requirements.txt --output requirements.txt
"#;

#[derive(Debug, Serialize)]
struct Pyproject {
    tool: Tool,
    #[serde(rename = "build-system")]
    build_system: BuildSystem,
}

#[derive(Debug, Serialize)]
struct Tool {
    poetry: Poetry,
}

#[derive(Debug, Serialize)]
struct Poetry {
    name: String,
    version: String,
    description: String,
    authors: Vec<String>,
    #[serde(rename = "package-mode")]
    package_mode: bool,
    dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct BuildSystem {
    requires: Vec<String>,
    #[serde(rename = "build-backend")]
    build_backend: String,
}

/// Renders the Poetry project whose lock produces the full dependency closure.
pub fn render_pyproject(config: &PythonConfig) -> Result<String> {
    let mut dependencies = BTreeMap::new();
    dependencies.insert("python".to_string(), format!("^{}", config.python_version));
    for requirement in &config.dependencies {
        let (name, version) = requirement.split_once("==").ok_or_else(|| {
            ConstructorError::validation(
                "packageManagers.python.dependencies",
                format!("'{}' is not pinned with ==", requirement),
            )
        })?;
        dependencies.insert(name.to_string(), version.to_string());
    }

    let project = Pyproject {
        tool: Tool {
            poetry: Poetry {
                name: "constructor-dependencies".to_string(),
                version: "0.1.0".to_string(),
                description: String::new(),
                authors: Vec::new(),
                package_mode: false,
                dependencies,
            },
        },
        build_system: BuildSystem {
            requires: vec!["poetry-core".to_string()],
            build_backend: "poetry.core.masonry.api".to_string(),
        },
    };
    Ok(toml::to_string(&project)?)
}

/// Produces `requirements.txt` for the python package manager block.
pub struct PythonResolver {
    scripts: Arc<dyn ScriptRunner>,
    log: LogContext,
}

impl PythonResolver {
    pub fn new(scripts: Arc<dyn ScriptRunner>, log: LogContext) -> Self {
        Self {
            scripts,
            log: log.component("python"),
        }
    }

    pub async fn resolve(&self, config: &PythonConfig, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let requirements = dir.join(REQUIREMENTS_FILE);

        if !config.include_dependencies {
            let mut content = config.dependencies.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            fs::write(&requirements, content)?;
            tracing::info!(
                parent: self.log.span(),
                "Wrote {} pinned dependencies to {}",
                config.dependencies.len(),
                requirements.display()
            );
            return Ok(requirements);
        }

        // Stale output from an earlier run must not pass for a fresh export.
        if requirements.exists() {
            fs::remove_file(&requirements)?;
        }
        fs::write(dir.join(PYPROJECT_FILE), render_pyproject(config)?)?;
        let script = dir.join(EXTRACT_SCRIPT_FILE);
        fs::write(&script, EXTRACT_SCRIPT)?;

        tracing::info!(
            parent: self.log.span(),
            "Resolving transitive dependencies for python {}",
            config.python_version
        );
        let output = self.scripts.run_script(&script, dir).await?;
        if !output.success() {
            return Err(ConstructorError::DependencyResolutionError {
                message: format!(
                    "{} exited with status {}: {}",
                    EXTRACT_SCRIPT_FILE,
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }
        if !requirements.is_file() {
            return Err(ConstructorError::DependencyResolutionError {
                message: format!("{} was not produced", requirements.display()),
            });
        }
        Ok(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Pretends to be the extraction script, optionally writing the export.
    struct FakeScripts {
        export: Option<&'static str>,
        exit_code: i32,
        calls: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ScriptRunner for FakeScripts {
        async fn run_script(&self, script: &Path, cwd: &Path) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(script.to_path_buf());
            if let Some(export) = self.export {
                fs::write(cwd.join(REQUIREMENTS_FILE), export)?;
            }
            Ok(CommandOutput {
                exit_code: self.exit_code,
                ..CommandOutput::default()
            })
        }
    }

    fn config(include_dependencies: bool) -> PythonConfig {
        PythonConfig {
            python_version: "3.11".to_string(),
            include_dependencies,
            dependencies: vec!["requests==2.31.0".to_string(), "idna==3.6".to_string()],
        }
    }

    fn scripts(export: Option<&'static str>, exit_code: i32) -> Arc<FakeScripts> {
        Arc::new(FakeScripts {
            export,
            exit_code,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_pinned_dependencies_are_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let fake = scripts(None, 0);
        let resolver = PythonResolver::new(fake.clone(), LogContext::disabled());

        let path = resolver.resolve(&config(false), dir.path()).await.unwrap();

        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "requests==2.31.0\nidna==3.6\n"
        );
        assert!(fake.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transitive_resolution_runs_script() {
        let dir = TempDir::new().unwrap();
        let fake = scripts(Some("certifi==2024.2.2\nrequests==2.31.0\n"), 0);
        let resolver = PythonResolver::new(fake.clone(), LogContext::disabled());

        let path = resolver.resolve(&config(true), dir.path()).await.unwrap();

        assert!(fs::read_to_string(path).unwrap().contains("certifi==2024.2.2"));
        assert_eq!(
            fake.calls.lock().unwrap().as_slice(),
            &[dir.path().join(EXTRACT_SCRIPT_FILE)]
        );
        let script = fs::read_to_string(dir.path().join(EXTRACT_SCRIPT_FILE)).unwrap();
        assert!(script.contains("poetry export --without-hashes"));
        assert!(dir.path().join(PYPROJECT_FILE).is_file());
    }

    #[tokio::test]
    async fn test_missing_export_is_a_resolution_error() {
        let dir = TempDir::new().unwrap();
        let resolver = PythonResolver::new(scripts(None, 0), LogContext::disabled());

        let err = resolver.resolve(&config(true), dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            ConstructorError::DependencyResolutionError { .. }
        ));
    }

    #[tokio::test]
    async fn test_failing_script_is_a_resolution_error() {
        let dir = TempDir::new().unwrap();
        let resolver = PythonResolver::new(scripts(Some("x==1\n"), 1), LogContext::disabled());

        assert!(resolver.resolve(&config(true), dir.path()).await.is_err());
    }

    #[test]
    fn test_pyproject_pins_dependencies() {
        let rendered = render_pyproject(&config(true)).unwrap();
        let parsed: toml::Value = toml::from_str(&rendered).unwrap();
        let deps = &parsed["tool"]["poetry"]["dependencies"];

        assert_eq!(deps["python"].as_str(), Some("^3.11"));
        assert_eq!(deps["requests"].as_str(), Some("2.31.0"));
        assert_eq!(
            parsed["build-system"]["build-backend"].as_str(),
            Some("poetry.core.masonry.api")
        );
    }
}
