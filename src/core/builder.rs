//! Multi-container build pipeline driven by `constructor.yml`.

use crate::adapters::nexus::{Credentials, NexusClient};
use crate::config::build_spec::{BuildSpec, ContainerSpec, ContainerfileSource, SourceConfig};
use crate::config::settings::DEFAULT_PIP_REPOSITORY;
use crate::core::interceptor::Interceptor;
use crate::core::manifest::dump_dependencies;
use crate::core::proxy_script::{render_proxy_script, PROXY_SCRIPT_FILE};
use crate::core::python::PythonResolver;
use crate::domain::model::{CommandOutput, ImageBuildRequest, ServiceRole, ServiceSet};
use crate::domain::ports::{ContainerEngine, GitClient, ScriptRunner, ServiceProvider};
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use crate::utils::validation::Validate;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything generated by a run lives under `<workdir>/constructor`.
pub const CONSTRUCTOR_DIR: &str = "constructor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    LoadAndValidate,
    EnsureWorkdir,
    PullSources,
    ResolvePackageManagers,
    EnsureServicesHealthy,
    GenerateProxyArtifacts,
    BuildEachImage,
    DumpDependencyManifest,
    Report,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::LoadAndValidate => "load and validate",
            BuildStage::EnsureWorkdir => "ensure workdir",
            BuildStage::PullSources => "pull sources",
            BuildStage::ResolvePackageManagers => "resolve package managers",
            BuildStage::EnsureServicesHealthy => "ensure services healthy",
            BuildStage::GenerateProxyArtifacts => "generate proxy artifacts",
            BuildStage::BuildEachImage => "build images",
            BuildStage::DumpDependencyManifest => "dump dependency manifest",
            BuildStage::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub run_id: String,
    /// Image names in declaration order.
    pub images: Vec<String>,
    /// Written only when the backing services were used.
    pub manifest: Option<PathBuf>,
}

/// Ports the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn ContainerEngine>,
    pub git: Arc<dyn GitClient>,
    pub scripts: Arc<dyn ScriptRunner>,
    pub services: Arc<dyn ServiceProvider>,
}

pub fn new_run_id() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

/// Resolves `path` against `base` unless it is already absolute.
fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Build-arg value pointing at the container's sources inside the context.
fn sources_path(subpath: &str) -> String {
    let trimmed = subpath.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        format!("{}/sources", CONSTRUCTOR_DIR)
    } else {
        format!("{}/sources/{}", CONSTRUCTOR_DIR, trimmed)
    }
}

pub fn build_flags(container: &ContainerSpec) -> Vec<String> {
    let mut flags = Vec::new();
    if !container.podman_cache_enabled {
        flags.push("--no-cache".to_string());
    }
    if container.restrictions.disable_dns_resolution {
        flags.push("--dns".to_string());
        flags.push("none".to_string());
    }
    flags.push("--build-arg".to_string());
    flags.push(format!("SOURCES_PATH={}", sources_path(&container.sources_subpath)));
    flags
}

/// A non-zero build becomes a `BuildFailure` carrying the last stderr line.
pub fn ensure_built(image: &str, output: &CommandOutput) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    let message = output
        .stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no output on stderr")
        .to_string();
    Err(ConstructorError::BuildFailure {
        image: image.to_string(),
        exit_code: output.exit_code,
        message,
    })
}

pub struct Builder {
    spec: BuildSpec,
    config_dir: PathBuf,
    collaborators: Collaborators,
    credentials: Credentials,
    pip_repository: String,
    run_id: String,
    log: LogContext,
}

impl Builder {
    /// `config_dir` anchors relative paths in the build spec.
    pub fn new(
        spec: BuildSpec,
        config_dir: impl Into<PathBuf>,
        collaborators: Collaborators,
        log: LogContext,
    ) -> Self {
        Self {
            spec,
            config_dir: config_dir.into(),
            collaborators,
            credentials: Credentials::default(),
            pip_repository: DEFAULT_PIP_REPOSITORY.to_string(),
            run_id: new_run_id(),
            log: log.component("builder"),
        }
    }

    /// Loads `constructor.yml`; relative paths inside it resolve against its directory.
    pub fn from_config_file(
        path: &Path,
        collaborators: Collaborators,
        log: LogContext,
    ) -> Result<Self> {
        let spec = BuildSpec::from_file(path)?;
        let config_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let config_dir = if config_dir.is_absolute() {
            config_dir
        } else {
            std::env::current_dir()?.join(config_dir)
        };
        Ok(Self::new(spec, config_dir, collaborators, log))
    }

    pub fn with_repository(mut self, credentials: Credentials, pip_repository: &str) -> Self {
        self.credentials = credentials;
        self.pip_repository = pip_repository.to_string();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    fn stage(&self, stage: BuildStage) {
        tracing::info!(parent: self.log.span(), "Stage: {}", stage);
    }

    pub async fn run(&self) -> Result<BuildReport> {
        tracing::info!(parent: self.log.span(), "Starting build run {}", self.run_id);

        self.stage(BuildStage::LoadAndValidate);
        self.spec.validate()?;

        self.stage(BuildStage::EnsureWorkdir);
        let workdir = self.ensure_workdir()?;
        let constructor_dir = workdir.join(CONSTRUCTOR_DIR);

        self.stage(BuildStage::PullSources);
        for source in &self.spec.sources {
            self.pull_source(source, &constructor_dir.join("sources"))
                .await?;
        }

        self.stage(BuildStage::ResolvePackageManagers);
        self.resolve_package_managers(&constructor_dir).await?;

        self.stage(BuildStage::EnsureServicesHealthy);
        let services = if self.spec.needs_services() {
            Some(self.collaborators.services.services().await?)
        } else {
            tracing::info!(parent: self.log.span(), "No container uses a proxy, skipping services");
            None
        };

        if let Some(services) = &services {
            self.stage(BuildStage::GenerateProxyArtifacts);
            self.generate_proxy_artifacts(services, &constructor_dir)?;
        }

        self.stage(BuildStage::BuildEachImage);
        let mut images = Vec::with_capacity(self.spec.containers.len());
        for container in &self.spec.containers {
            self.build_container(container, services.as_ref(), &workdir)
                .await?;
            images.push(container.image_name.clone());
        }

        let manifest = match &services {
            Some(services) => {
                self.stage(BuildStage::DumpDependencyManifest);
                Some(self.dump_manifest(services, &workdir).await?)
            }
            None => None,
        };

        self.stage(BuildStage::Report);
        tracing::info!(
            parent: self.log.span(),
            "Built {} images in run {}",
            images.len(),
            self.run_id
        );
        Ok(BuildReport {
            run_id: self.run_id.clone(),
            images,
            manifest,
        })
    }

    fn ensure_workdir(&self) -> Result<PathBuf> {
        let workdir = resolve_against(&self.config_dir, &self.spec.workdir.path);
        fs::create_dir_all(&workdir)?;
        tracing::debug!(parent: self.log.span(), "Workdir: {}", workdir.display());
        Ok(workdir)
    }

    async fn pull_source(&self, source: &SourceConfig, sources_dir: &Path) -> Result<()> {
        let dest = sources_dir.join(&source.path);
        let git = &self.collaborators.git;

        let result = if dest.join(".git").exists() {
            tracing::info!(
                parent: self.log.span(),
                "Updating {} to '{}'",
                dest.display(),
                source.reference
            );
            match git.checkout(&dest, &source.reference).await {
                Ok(()) => git.pull(&dest, &source.reference).await,
                Err(e) => Err(e),
            }
        } else {
            tracing::info!(
                parent: self.log.span(),
                "Cloning {} at '{}' into {}",
                source.url,
                source.reference,
                dest.display()
            );
            fs::create_dir_all(sources_dir)?;
            git.clone_ref(&source.url, &source.reference, &dest).await
        };

        result.map_err(|e| match e {
            e @ ConstructorError::SourceFetchError { .. } => e,
            other => ConstructorError::SourceFetchError {
                url: source.url.clone(),
                reference: source.reference.clone(),
                message: other.to_string(),
            },
        })
    }

    async fn resolve_package_managers(&self, constructor_dir: &Path) -> Result<()> {
        let managers = &self.spec.package_managers;

        if managers.ansible.is_some() {
            tracing::warn!(
                parent: self.log.span(),
                "Ansible package manager is declared but not resolved"
            );
        }
        if let Some(python) = &managers.python {
            let resolver =
                PythonResolver::new(self.collaborators.scripts.clone(), self.log.clone());
            let requirements = resolver
                .resolve(python, &constructor_dir.join("python"))
                .await?;
            tracing::info!(
                parent: self.log.span(),
                "Python requirements: {}",
                requirements.display()
            );
        }
        Ok(())
    }

    fn generate_proxy_artifacts(&self, services: &ServiceSet, constructor_dir: &Path) -> Result<()> {
        for container in self.spec.containers.iter().filter(|c| c.proxies.python) {
            let dir = constructor_dir.join("proxy").join(&container.name);
            fs::create_dir_all(&dir)?;
            let script = dir.join(PROXY_SCRIPT_FILE);
            fs::write(
                &script,
                render_proxy_script(services, &container.proxies, &self.pip_repository),
            )?;
            tracing::debug!(parent: self.log.span(), "Wrote {}", script.display());
        }
        Ok(())
    }

    /// Copies or writes the container's build file into the workdir.
    fn materialise_containerfile(&self, container: &ContainerSpec, workdir: &Path) -> Result<PathBuf> {
        let dir = workdir
            .join(CONSTRUCTOR_DIR)
            .join("containers")
            .join(&container.name);
        fs::create_dir_all(&dir)?;
        let target = dir.join("Containerfile");

        match container.containerfile_source() {
            Some(ContainerfileSource::Path(path)) => {
                let source = resolve_against(&self.config_dir, path);
                fs::copy(&source, &target).map_err(|e| {
                    ConstructorError::validation(
                        format!("containers.{}.containerfilePath", container.name),
                        format!("cannot read {}: {}", source.display(), e),
                    )
                })?;
            }
            Some(ContainerfileSource::Inline(content)) => fs::write(&target, content)?,
            None => {
                return Err(ConstructorError::validation(
                    format!("containers.{}.containerfilePath", container.name),
                    "one of containerfilePath or containerfileContent is required",
                ))
            }
        }
        Ok(target)
    }

    async fn build_container(
        &self,
        container: &ContainerSpec,
        services: Option<&ServiceSet>,
        workdir: &Path,
    ) -> Result<()> {
        let mut containerfile = self.materialise_containerfile(container, workdir)?;

        if container.proxies.any() {
            if let Some(services) = services {
                let interceptor = Interceptor::new(&self.pip_repository, self.log.clone());
                containerfile = interceptor.intercept(&containerfile, services)?;
            }
        }

        let request = ImageBuildRequest {
            containerfile,
            context_dir: workdir.to_path_buf(),
            tag: container.image_name.clone(),
            flags: build_flags(container),
        };
        tracing::info!(
            parent: self.log.span(),
            "Building '{}' as {}",
            container.name,
            container.image_name
        );

        let output = self.collaborators.engine.build_image(&request).await?;
        ensure_built(&container.image_name, &output)
    }

    async fn dump_manifest(&self, services: &ServiceSet, workdir: &Path) -> Result<PathBuf> {
        let nexus = NexusClient::new(
            services.get(ServiceRole::RepoManager).local_url(),
            self.credentials.clone(),
        );
        let output = workdir.join(self.spec.lockfile());
        dump_dependencies(&nexus, &self.pip_repository, &output).await?;
        Ok(output)
    }
}
