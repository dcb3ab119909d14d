use crate::adapters::process::run_checked;
use crate::domain::ports::{CommandRunner, CommandSpec, ComposeSupervisor};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// `podman-compose` run inside the deployment checkout.
pub struct PodmanCompose {
    runner: Arc<dyn CommandRunner>,
}

impl PodmanCompose {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ComposeSupervisor for PodmanCompose {
    async fn up(&self, workdir: &Path) -> Result<()> {
        let command = CommandSpec::new("podman-compose", ["up", "-d"]).in_dir(workdir);
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(())
    }

    async fn down(&self, workdir: &Path) -> Result<()> {
        let command = CommandSpec::new("podman-compose", ["down"]).in_dir(workdir);
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(())
    }
}
