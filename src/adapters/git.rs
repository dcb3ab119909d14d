use crate::adapters::process::run_checked;
use crate::domain::ports::{CommandRunner, CommandSpec, GitClient};
use crate::utils::error::{ConstructorError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub struct GitCli {
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, url: &str, reference: &str, command: CommandSpec) -> Result<()> {
        run_checked(self.runner.as_ref(), &command)
            .await
            .map(|_| ())
            .map_err(|e| ConstructorError::SourceFetchError {
                url: url.to_string(),
                reference: reference.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn clone_ref(&self, url: &str, reference: &str, dest: &Path) -> Result<()> {
        let command = CommandSpec::new(
            "git",
            [
                "clone".to_string(),
                "--depth".to_string(),
                "1".to_string(),
                "--branch".to_string(),
                reference.to_string(),
                url.to_string(),
                dest.display().to_string(),
            ],
        );
        self.git(url, reference, command).await
    }

    async fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        let command = CommandSpec::new("git", ["checkout", reference]).in_dir(repo);
        self.git(&repo.display().to_string(), reference, command).await
    }

    async fn pull(&self, repo: &Path, reference: &str) -> Result<()> {
        let command = CommandSpec::new("git", ["pull", "origin", reference]).in_dir(repo);
        self.git(&repo.display().to_string(), reference, command).await
    }
}
