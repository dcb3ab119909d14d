use crate::domain::model::CommandOutput;
use crate::domain::ports::{CommandRunner, CommandSpec, ScriptRunner};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Runs generated scripts with `bash`, echoing their output.
pub struct BashScriptRunner {
    runner: Arc<dyn CommandRunner>,
}

impl BashScriptRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ScriptRunner for BashScriptRunner {
    async fn run_script(&self, script: &Path, cwd: &Path) -> Result<CommandOutput> {
        let command = CommandSpec::new("bash", [script.display().to_string()])
            .in_dir(cwd)
            .echoed(true);
        self.runner.run(&command).await
    }
}
