use crate::utils::error::{ConstructorError, Result};
use crate::utils::validation::{
    validate_git_url, validate_non_empty_string, validate_path, validate_path_segment,
    validate_pinned_requirement, validate_relative_path, validate_version, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_LOCKFILE: &str = "constructor.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Git,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildSpec {
    pub kind: SpecKind,
    pub workdir: WorkdirConfig,
    #[serde(default)]
    pub package_managers: PackageManagers,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkdirConfig {
    pub path: String,
    /// Dependency manifest location, relative to the workdir.
    #[serde(default = "default_lockfile")]
    pub lockfile: String,
}

fn default_lockfile() -> String {
    DEFAULT_LOCKFILE.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PackageManagers {
    /// Accepted so existing files load; ansible content is not resolved.
    pub ansible: Option<serde_yaml::Mapping>,
    pub python: Option<PythonConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PythonConfig {
    pub python_version: String,
    #[serde(default)]
    pub include_dependencies: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerSpec {
    pub name: String,
    pub image_name: String,
    pub containerfile_path: Option<String>,
    pub containerfile_content: Option<String>,
    #[serde(default)]
    pub restrictions: Restrictions,
    #[serde(default)]
    pub proxies: Proxies,
    #[serde(default = "default_sources_subpath")]
    pub sources_subpath: String,
    #[serde(default = "default_true")]
    pub podman_cache_enabled: bool,
}

fn default_sources_subpath() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Restrictions {
    #[serde(default)]
    pub disable_dns_resolution: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proxies {
    #[serde(default)]
    pub python: bool,
    #[serde(default)]
    pub golang: bool,
}

impl Proxies {
    pub fn any(&self) -> bool {
        self.python || self.golang
    }
}

/// Where a container's Containerfile comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerfileSource<'a> {
    Path(&'a str),
    Inline(&'a str),
}

impl ContainerSpec {
    /// `None` when the container breaks the exactly-one rule; `validate` rejects those.
    pub fn containerfile_source(&self) -> Option<ContainerfileSource<'_>> {
        match (&self.containerfile_path, &self.containerfile_content) {
            (Some(path), None) => Some(ContainerfileSource::Path(path)),
            (None, Some(content)) => Some(ContainerfileSource::Inline(content)),
            _ => None,
        }
    }

    fn validate_at(&self, index: usize) -> Result<()> {
        let field = |name: &str| format!("containers[{}].{}", index, name);

        // Names become directories under the workdir.
        validate_path_segment(&field("name"), &self.name)?;
        validate_non_empty_string(&field("imageName"), &self.image_name)?;
        validate_relative_path(&field("sourcesSubpath"), &self.sources_subpath)?;

        match (&self.containerfile_path, &self.containerfile_content) {
            (Some(path), None) => validate_path(&field("containerfilePath"), path),
            (None, Some(content)) => validate_non_empty_string(&field("containerfileContent"), content),
            (Some(_), Some(_)) => Err(ConstructorError::validation(
                field("containerfilePath"),
                "containerfilePath and containerfileContent are mutually exclusive",
            )),
            (None, None) => Err(ConstructorError::validation(
                field("containerfilePath"),
                "one of containerfilePath or containerfileContent is required",
            )),
        }
    }
}

impl BuildSpec {
    /// Loads a build spec from a YAML file. Parsing only; call `validate` next.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConstructorError::ConfigParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConstructorError::ConfigParseError { message, .. } => {
                ConstructorError::ConfigParseError {
                    path: path.display().to_string(),
                    message,
                }
            }
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        serde_yaml::from_str(&processed_content).map_err(|e| ConstructorError::ConfigParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConstructorError::validation("env substitution", e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn lockfile(&self) -> &str {
        &self.workdir.lockfile
    }

    /// True when any container routes traffic through the backing services.
    pub fn needs_services(&self) -> bool {
        self.containers.iter().any(|c| c.proxies.any())
    }

    fn validate_python(&self) -> Result<()> {
        let Some(python) = &self.package_managers.python else {
            return Ok(());
        };

        validate_version("packageManagers.python.pythonVersion", &python.python_version)?;
        for (i, dependency) in python.dependencies.iter().enumerate() {
            validate_pinned_requirement(
                &format!("packageManagers.python.dependencies[{}]", i),
                dependency,
            )?;
        }
        Ok(())
    }

    fn validate_sources(&self) -> Result<()> {
        let mut paths = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            validate_git_url(&format!("sources[{}].url", i), &source.url)?;
            validate_non_empty_string(&format!("sources[{}].ref", i), &source.reference)?;
            validate_relative_path(&format!("sources[{}].path", i), &source.path)?;
            if !paths.insert(source.path.as_str()) {
                return Err(ConstructorError::validation(
                    format!("sources[{}].path", i),
                    format!("'{}' is used by more than one source", source.path),
                ));
            }
        }
        Ok(())
    }

    fn validate_containers(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(ConstructorError::validation(
                "containers",
                "at least one container is required",
            ));
        }

        let mut names = HashSet::new();
        for (i, container) in self.containers.iter().enumerate() {
            container.validate_at(i)?;
            if !names.insert(container.name.as_str()) {
                return Err(ConstructorError::validation(
                    format!("containers[{}].name", i),
                    format!("duplicate container name '{}'", container.name),
                ));
            }
        }
        Ok(())
    }
}

impl Validate for BuildSpec {
    fn validate(&self) -> Result<()> {
        validate_path("workdir.path", &self.workdir.path)?;
        validate_relative_path("workdir.lockfile", &self.workdir.lockfile)?;
        self.validate_python()?;
        self.validate_sources()?;
        self.validate_containers()
    }
}
