//! Dependency extraction through the pip proxy.
//!
//! A throwaway image installs a requirements file with DNS removed, so
//! every package comes through the repository manager. The components the
//! proxy cached are then read back as a pinned requirements file.

use crate::adapters::nexus::{Credentials, NexusClient};
use crate::config::settings::DEFAULT_PIP_REPOSITORY;
use crate::core::builder::ensure_built;
use crate::core::interceptor::{Interceptor, DISABLE_MARKER, PROXY_MARKER};
use crate::core::manifest::dump_dependencies;
use crate::domain::model::{ImageBuildRequest, ServiceRole, ServiceSet};
use crate::domain::ports::{ContainerEngine, ServiceProvider};
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build context for extraction, below the cache directory.
pub const PIP_EXTRACT_DIR: &str = "pip-extract";
pub const DEFAULT_BASE_IMAGE: &str = "registry.access.redhat.com/ubi9/python-311";
pub const EXTRACT_IMAGE_TAG: &str = "localhost/constructor-pip-extract:latest";
const REQUIREMENTS_IN_FILE: &str = "requirements-in.txt";

/// Containerfile that installs `requirements-in.txt` behind the proxy markers.
pub fn render_extract_containerfile(base_image: &str) -> String {
    format!(
        "FROM {base_image}\n\
         ADD ./{REQUIREMENTS_IN_FILE} /build/{REQUIREMENTS_IN_FILE}\n\
         {DISABLE_MARKER}\n\
         {PROXY_MARKER}\n\
         RUN set -x \\\n    \
         && pip install -vvvv -r /build/{REQUIREMENTS_IN_FILE} \\\n    \
         && pip freeze > /build/requirements-out.txt\n"
    )
}

fn check_output_parent(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(ConstructorError::validation(
                "requirements-out",
                format!("parent directory '{}' does not exist", parent.display()),
            ))
        }
        _ => Ok(()),
    }
}

pub struct PipExtractor {
    engine: Arc<dyn ContainerEngine>,
    services: Arc<dyn ServiceProvider>,
    cache_dir: PathBuf,
    credentials: Credentials,
    pip_repository: String,
    base_image: String,
    log: LogContext,
}

impl PipExtractor {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        services: Arc<dyn ServiceProvider>,
        cache_dir: impl Into<PathBuf>,
        log: LogContext,
    ) -> Self {
        Self {
            engine,
            services,
            cache_dir: cache_dir.into(),
            credentials: Credentials::default(),
            pip_repository: DEFAULT_PIP_REPOSITORY.to_string(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            log: log.component("pip"),
        }
    }

    pub fn with_repository(mut self, credentials: Credentials, pip_repository: &str) -> Self {
        self.credentials = credentials;
        self.pip_repository = pip_repository.to_string();
        self
    }

    pub fn with_base_image(mut self, base_image: impl Into<String>) -> Self {
        self.base_image = base_image.into();
        self
    }

    pub fn build_dir(&self) -> PathBuf {
        self.cache_dir.join(PIP_EXTRACT_DIR)
    }

    /// Installs `requirements_in` through the proxy and writes what it served to
    /// `requirements_out`. Returns how many dependencies were written.
    pub async fn extract(&self, requirements_in: &Path, requirements_out: &Path) -> Result<usize> {
        if !requirements_in.is_file() {
            return Err(ConstructorError::validation(
                "requirements-in",
                format!("'{}' does not exist", requirements_in.display()),
            ));
        }
        check_output_parent(requirements_out)?;

        let services = self.services.services().await?;

        let build_dir = self.build_dir();
        fs::create_dir_all(&build_dir)?;
        let containerfile = build_dir.join("Containerfile");
        tracing::info!(parent: self.log.span(), "Creating {}", containerfile.display());
        fs::write(&containerfile, render_extract_containerfile(&self.base_image))?;
        fs::copy(requirements_in, build_dir.join(REQUIREMENTS_IN_FILE))?;

        let interceptor = Interceptor::new(&self.pip_repository, self.log.clone());
        let request = ImageBuildRequest {
            containerfile: interceptor.intercept(&containerfile, &services)?,
            context_dir: build_dir,
            tag: EXTRACT_IMAGE_TAG.to_string(),
            flags: ["--no-cache", "--dns", "none"]
                .iter()
                .map(|flag| flag.to_string())
                .collect(),
        };
        tracing::info!(parent: self.log.span(), "Building the extraction image (no dns)");
        let output = self.engine.build_image(&request).await?;
        ensure_built(&request.tag, &output)?;

        self.write_components(&services, requirements_out).await
    }

    /// Writes what the pip proxy currently holds, without building anything.
    pub async fn dump(&self, requirements_out: &Path) -> Result<usize> {
        check_output_parent(requirements_out)?;
        let services = self.services.services().await?;
        self.write_components(&services, requirements_out).await
    }

    async fn write_components(&self, services: &ServiceSet, output: &Path) -> Result<usize> {
        let nexus = NexusClient::new(
            services.get(ServiceRole::RepoManager).local_url(),
            self.credentials.clone(),
        );
        dump_dependencies(&nexus, &self.pip_repository, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containerfile_has_markers_in_order() {
        let content = render_extract_containerfile("quay.io/example/python:3.11");
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "FROM quay.io/example/python:3.11");
        let disable = lines.iter().position(|l| *l == DISABLE_MARKER).unwrap();
        let proxy = lines.iter().position(|l| *l == PROXY_MARKER).unwrap();
        assert!(disable < proxy);
        assert!(lines[proxy + 1..]
            .join("\n")
            .contains("pip install -vvvv -r /build/requirements-in.txt"));
    }

    #[test]
    fn test_output_parent_must_exist() {
        assert!(check_output_parent(Path::new("requirements-out.txt")).is_ok());
        assert!(check_output_parent(Path::new("/nonexistent-dir-for-constructor/out.txt")).is_err());
    }
}
