//! Lifecycle of the local Cachito deployment (podman-compose project).

use crate::adapters::process::check_executable;
use crate::core::locator::{project_name, ProbeOutcome, ServiceLocator};
use crate::domain::model::ServiceSet;
use crate::domain::ports::{CommandRunner, ComposeSupervisor, ContainerEngine, GitClient};
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CACHITO_GIT_URL: &str = "https://github.com/containerbuildsystem/cachito";
pub const CACHITO_GIT_REF: &str = "master";
pub const REQUIRED_EXECUTABLES: [&str; 3] = ["podman", "podman-compose", "git"];
/// Searched in this order.
pub const COMPOSE_FILES: [&str; 3] = [
    "container-compose.yml",
    "podman-compose.yaml",
    "docker-compose.yml",
];
const NEXUS_SERVICE: &str = "nexus";

#[derive(Debug, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
pub struct ComposeService {
    pub image: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
}

impl ComposeFile {
    pub fn find(repo: &Path) -> Result<PathBuf> {
        COMPOSE_FILES
            .iter()
            .map(|name| repo.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ConstructorError::MissingConfigError {
                field: format!("compose file in {} ({})", repo.display(), COMPOSE_FILES.join(", ")),
            })
    }

    pub fn load(repo: &Path) -> Result<Self> {
        let path = Self::find(repo)?;
        let content = fs::read_to_string(&path)?;
        serde_yaml::from_str(&content).map_err(|e| ConstructorError::ConfigParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn nexus(&self) -> Result<&ComposeService> {
        self.services
            .get(NEXUS_SERVICE)
            .ok_or_else(|| ConstructorError::MissingConfigError {
                field: format!("services.{}", NEXUS_SERVICE),
            })
    }
}

pub struct Server {
    clone_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    engine: Arc<dyn ContainerEngine>,
    compose: Arc<dyn ComposeSupervisor>,
    git: Arc<dyn GitClient>,
    log: LogContext,
}

impl Server {
    pub fn new(
        clone_path: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        engine: Arc<dyn ContainerEngine>,
        compose: Arc<dyn ComposeSupervisor>,
        git: Arc<dyn GitClient>,
        log: LogContext,
    ) -> Self {
        Self {
            clone_path: clone_path.into(),
            runner,
            engine,
            compose,
            git,
            log: log.component("server"),
        }
    }

    pub fn clone_path(&self) -> &Path {
        &self.clone_path
    }

    pub fn project(&self) -> String {
        project_name(&self.clone_path)
    }

    pub async fn check_dependencies(&self) -> Result<()> {
        for program in REQUIRED_EXECUTABLES {
            if !check_executable(self.runner.as_ref(), program).await {
                return Err(ConstructorError::MissingConfigError {
                    field: format!("executable '{}' on PATH", program),
                });
            }
        }
        Ok(())
    }

    fn require_checkout(&self) -> Result<()> {
        if self.clone_path.is_dir() {
            Ok(())
        } else {
            Err(ConstructorError::MissingConfigError {
                field: format!("Cachito repository at {}", self.clone_path.display()),
            })
        }
    }

    /// Clones Cachito when needed, hands the nexus volume to the nexus user and starts everything.
    pub async fn deploy(&self) -> Result<()> {
        self.check_dependencies().await?;

        if self.clone_path.is_dir() {
            tracing::info!(parent: self.log.span(), "Repository found, skipping clone");
        } else {
            if let Some(parent) = self.clone_path.parent() {
                fs::create_dir_all(parent)?;
            }
            tracing::info!(parent: self.log.span(), "Cloning Cachito repository");
            self.git
                .clone_ref(CACHITO_GIT_URL, CACHITO_GIT_REF, &self.clone_path)
                .await?;
        }

        tracing::info!(parent: self.log.span(), "Fixing volume permissions");
        let compose = ComposeFile::load(&self.clone_path)?;
        let nexus = compose.nexus()?;
        let image = nexus
            .image
            .as_deref()
            .ok_or_else(|| ConstructorError::MissingConfigError {
                field: format!("services.{}.image", NEXUS_SERVICE),
            })?;
        let volume = nexus
            .volumes
            .first()
            .and_then(|volume| volume.split(':').next())
            .ok_or_else(|| ConstructorError::MissingConfigError {
                field: format!("services.{}.volumes", NEXUS_SERVICE),
            })?;

        let uid = self.id_of(image, "-u").await?;
        let gid = self.id_of(image, "-g").await?;
        let volume_path = self.clone_path.join(volume);
        fs::create_dir_all(&volume_path)?;
        self.engine
            .exec(&[
                "unshare".to_string(),
                "chown".to_string(),
                "-R".to_string(),
                format!("{}:{}", uid, gid),
                volume_path.display().to_string(),
            ])
            .await?;

        tracing::info!(parent: self.log.span(), "Starting Cachito services");
        self.compose.up(&self.clone_path).await
    }

    async fn id_of(&self, image: &str, flag: &str) -> Result<String> {
        let output = self
            .engine
            .run_image(image, Some(""), &["id".to_string(), flag.to_string()])
            .await?;
        Ok(output.trim().to_string())
    }

    pub async fn stop(&self) -> Result<()> {
        self.check_dependencies().await?;
        self.require_checkout()?;
        tracing::info!(parent: self.log.span(), "Stopping Cachito server");
        self.compose.down(&self.clone_path).await
    }

    /// Restarts the deployment when asked to, otherwise starts it only if it is not already up.
    pub async fn ensure_running(&self, locator: &ServiceLocator, restart: bool) -> Result<()> {
        if restart {
            self.stop().await?;
            return self.deploy().await;
        }
        if locator.is_running(&self.project()).await {
            tracing::info!(parent: self.log.span(), "Cachito server is already running");
            return Ok(());
        }
        self.deploy().await
    }

    /// Single probe: `Some` when every service answers, `None` when some are still down.
    pub async fn status(&self, locator: &ServiceLocator) -> Result<Option<ServiceSet>> {
        self.check_dependencies().await?;
        self.require_checkout()?;
        tracing::info!(parent: self.log.span(), "Retrieving Cachito server containers");

        match locator.probe_once(&self.project()).await {
            ProbeOutcome::Ready(services) => Ok(Some(services)),
            ProbeOutcome::Transient(reason) => {
                tracing::warn!(parent: self.log.span(), "{}", reason);
                Ok(None)
            }
            ProbeOutcome::Fatal(error) => Err(error),
        }
    }
}
