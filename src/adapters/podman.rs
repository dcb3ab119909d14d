use crate::adapters::process::run_checked;
use crate::domain::model::{CommandOutput, ContainerSummary, ImageBuildRequest, PortMapping};
use crate::domain::ports::{CommandRunner, CommandSpec, ContainerEngine};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Compose label podman-compose puts on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "io.podman.compose.project";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsEntry {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    networks: Vec<String>,
    #[serde(default)]
    ports: Option<Vec<PsPort>>,
}

#[derive(Debug, Deserialize)]
struct PsPort {
    host_port: u16,
    container_port: u16,
}

/// Parses `podman ps --format json`.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerSummary>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = serde_json::from_str(stdout)?;
    Ok(entries
        .into_iter()
        .map(|entry| ContainerSummary {
            name: entry.names.into_iter().next().unwrap_or_default(),
            state: entry.state,
            network: entry.networks.into_iter().next().unwrap_or_default(),
            ports: entry
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| PortMapping {
                    host_port: p.host_port,
                    container_port: p.container_port,
                })
                .collect(),
        })
        .collect())
}

pub struct PodmanEngine {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl PodmanEngine {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "podman".to_string(),
        }
    }

    pub fn build_args(request: &ImageBuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            request.containerfile.display().to_string(),
            "-t".to_string(),
            request.tag.clone(),
        ];
        args.extend(request.flags.iter().cloned());
        args.push(request.context_dir.display().to_string());
        args
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn list_containers(&self, project: &str) -> Result<Vec<ContainerSummary>> {
        let command = CommandSpec::new(
            &self.binary,
            [
                "ps".to_string(),
                "-a".to_string(),
                "--format".to_string(),
                "json".to_string(),
                "--filter".to_string(),
                format!("label={}={}", COMPOSE_PROJECT_LABEL, project),
            ],
        );
        let output = run_checked(self.runner.as_ref(), &command).await?;
        parse_ps_output(&output.stdout)
    }

    async fn build_image(&self, request: &ImageBuildRequest) -> Result<CommandOutput> {
        let command = CommandSpec::new(&self.binary, Self::build_args(request))
            .in_dir(&request.context_dir)
            .echoed(true);
        self.runner.run(&command).await
    }

    async fn run_image(
        &self,
        image: &str,
        entrypoint: Option<&str>,
        args: &[String],
    ) -> Result<String> {
        let mut full_args = vec!["run".to_string(), "--rm".to_string()];
        if let Some(entrypoint) = entrypoint {
            full_args.push(format!("--entrypoint={}", entrypoint));
        }
        full_args.push(image.to_string());
        full_args.extend(args.iter().cloned());

        let output = run_checked(self.runner.as_ref(), &CommandSpec::new(&self.binary, full_args))
            .await?;
        Ok(output.stdout)
    }

    async fn exec(&self, args: &[String]) -> Result<CommandOutput> {
        run_checked(
            self.runner.as_ref(),
            &CommandSpec::new(&self.binary, args.iter().cloned()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_ps_output() {
        let stdout = r#"[
            {
                "Names": ["cachito_repo_nexus_1"],
                "State": "running",
                "Networks": ["cachito_repo_default"],
                "Ports": [{"host_ip": "", "host_port": 8082, "container_port": 8081, "protocol": "tcp", "range": 1}],
                "Labels": {"io.podman.compose.project": "cachito_repo"}
            },
            {
                "Names": ["cachito_repo_db_1"],
                "State": "exited",
                "Networks": [],
                "Ports": null
            }
        ]"#;

        let containers = parse_ps_output(stdout).unwrap();

        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "cachito_repo_nexus_1");
        assert!(containers[0].is_running());
        assert_eq!(containers[0].network, "cachito_repo_default");
        assert_eq!(
            containers[0].ports,
            vec![PortMapping {
                host_port: 8082,
                container_port: 8081
            }]
        );
        assert!(!containers[1].is_running());
        assert!(containers[1].ports.is_empty());
        assert_eq!(containers[1].network, "");
    }

    #[test]
    fn test_parse_empty_ps_output() {
        assert!(parse_ps_output("").unwrap().is_empty());
        assert!(parse_ps_output("[]").unwrap().is_empty());
    }

    #[test]
    fn test_build_args_put_context_last() {
        let request = ImageBuildRequest {
            containerfile: PathBuf::from("/work/Containerfile"),
            context_dir: PathBuf::from("/work"),
            tag: "localhost/app:latest".to_string(),
            flags: vec!["--no-cache".to_string()],
        };

        assert_eq!(
            PodmanEngine::build_args(&request),
            vec![
                "build",
                "-f",
                "/work/Containerfile",
                "-t",
                "localhost/app:latest",
                "--no-cache",
                "/work"
            ]
        );
    }
}
