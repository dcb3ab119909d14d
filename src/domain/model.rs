use crate::utils::error::{ConstructorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Host name containers use to reach services published on the build host.
pub const CONTAINER_HOST: &str = "host.containers.internal";

/// Logical role of a backing service. Declaration order is the env merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceRole {
    Proxy,
    RepoManager,
    PrefetchApi,
}

impl ServiceRole {
    pub const ALL: [ServiceRole; 3] = [
        ServiceRole::Proxy,
        ServiceRole::RepoManager,
        ServiceRole::PrefetchApi,
    ];

    /// Compose service name that runs this role.
    pub fn compose_service(&self) -> &'static str {
        match self {
            ServiceRole::Proxy => "athens",
            ServiceRole::RepoManager => "nexus",
            ServiceRole::PrefetchApi => "cachito-api",
        }
    }

    /// Container name fragment podman-compose gives this role inside `project`.
    pub fn container_pattern(&self, project: &str) -> String {
        format!("{}_{}_1", project, self.compose_service())
    }

    pub fn health_path(&self) -> &'static str {
        match self {
            ServiceRole::Proxy => "/healthz",
            ServiceRole::RepoManager => "/",
            ServiceRole::PrefetchApi => "/api/v1/status/short",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.compose_service())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

/// One row of the container engine's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub state: String,
    pub network: String,
    pub ports: Vec<PortMapping>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    role: ServiceRole,
    container_name: String,
    network: String,
    host_port: u16,
    container_port: u16,
    base_url: String,
    local_url: String,
    custom_env: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// `local_host` replaces the container-facing host in `local_url`.
    pub fn new(
        role: ServiceRole,
        container: &ContainerSummary,
        port: &PortMapping,
        local_host: &str,
        custom_env: BTreeMap<String, String>,
    ) -> Self {
        let base_url = format!("http://{}:{}", CONTAINER_HOST, port.host_port);
        let local_url = base_url.replace(CONTAINER_HOST, local_host);
        Self {
            role,
            container_name: container.name.clone(),
            network: container.network.clone(),
            host_port: port.host_port,
            container_port: port.container_port,
            base_url,
            local_url,
            custom_env,
        }
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    pub fn container_port(&self) -> u16 {
        self.container_port
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    pub fn custom_env(&self) -> &BTreeMap<String, String> {
        &self.custom_env
    }
}

/// All three backing services, or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSet {
    services: BTreeMap<ServiceRole, ServiceDescriptor>,
}

impl ServiceSet {
    pub fn from_descriptors(descriptors: Vec<ServiceDescriptor>) -> Result<Self> {
        let mut services = BTreeMap::new();
        for descriptor in descriptors {
            services.insert(descriptor.role(), descriptor);
        }

        let missing: Vec<String> = ServiceRole::ALL
            .iter()
            .filter(|role| !services.contains_key(*role))
            .map(|role| role.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConstructorError::ServiceUnavailableError {
                attempts: 0,
                last_error: format!("missing services: {}", missing.join(", ")),
            });
        }

        Ok(Self { services })
    }

    pub fn get(&self, role: ServiceRole) -> &ServiceDescriptor {
        // Construction guarantees every role is present.
        &self.services[&role]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    /// Environment of every service merged in role order. A later service
    /// overrides the value of an earlier key, which keeps its position.
    pub fn merged_env(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for descriptor in self.iter() {
            for (key, value) in descriptor.custom_env() {
                match positions.get(key) {
                    Some(&index) => merged[index].1 = value.clone(),
                    None => {
                        positions.insert(key.clone(), merged.len());
                        merged.push((key.clone(), value.clone()));
                    }
                }
            }
        }

        merged
    }
}

/// A build file split around its sentinel markers, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedFile {
    pub source_path: PathBuf,
    pub generated_path: PathBuf,
    pub before_disable: String,
    pub disable_block: String,
    pub between: String,
    pub proxy_block: String,
    pub after_proxy: String,
}

impl InterceptedFile {
    /// Regions and blocks are newline-terminated, so rendering is concatenation.
    pub fn render(&self) -> String {
        [
            self.before_disable.as_str(),
            self.disable_block.as_str(),
            self.between.as_str(),
            self.proxy_block.as_str(),
            self.after_proxy.as_str(),
        ]
        .concat()
    }
}

/// Component stored in a repository-manager repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub format: String,
}

impl Component {
    pub fn pinned(&self) -> String {
        format!("{}=={}", self.name, self.version)
    }
}

/// Everything the container engine needs for one `build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildRequest {
    pub containerfile: PathBuf,
    pub context_dir: PathBuf,
    pub tag: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
