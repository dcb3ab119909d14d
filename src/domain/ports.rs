use crate::domain::model::{CommandOutput, ContainerSummary, ImageBuildRequest, ServiceSet};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Mirror output to the console while capturing it.
    pub echo: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            echo: false,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn echoed(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs to completion. A non-zero exit is reported in the output, not as an error.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_containers(&self, project: &str) -> Result<Vec<ContainerSummary>>;
    /// The build's exit status is in `CommandOutput::exit_code`.
    async fn build_image(&self, request: &ImageBuildRequest) -> Result<CommandOutput>;
    /// Runs `image` once and returns its stdout.
    async fn run_image(&self, image: &str, entrypoint: Option<&str>, args: &[String])
        -> Result<String>;
    /// Arbitrary engine subcommand, e.g. `unshare chown`.
    async fn exec(&self, args: &[String]) -> Result<CommandOutput>;
}

#[async_trait]
pub trait ComposeSupervisor: Send + Sync {
    async fn up(&self, workdir: &Path) -> Result<()>;
    async fn down(&self, workdir: &Path) -> Result<()>;
}

#[async_trait]
pub trait GitClient: Send + Sync {
    /// Shallow clone of `reference` into `dest`.
    async fn clone_ref(&self, url: &str, reference: &str, dest: &Path) -> Result<()>;
    async fn checkout(&self, repo: &Path, reference: &str) -> Result<()>;
    async fn pull(&self, repo: &Path, reference: &str) -> Result<()>;
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &Path, cwd: &Path) -> Result<CommandOutput>;
}

/// Source of a healthy [`ServiceSet`].
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn services(&self) -> Result<ServiceSet>;
}
