use clap::Parser;
use constructor::adapters::compose::PodmanCompose;
use constructor::adapters::git::GitCli;
use constructor::adapters::nexus::NexusClient;
use constructor::adapters::podman::PodmanEngine;
use constructor::adapters::process::ProcessRunner;
use constructor::adapters::script::BashScriptRunner;
use constructor::config::{
    BuilderCommand, CliConfig, Command, NexusCommand, PipCommand, ServerCommand,
    DEFAULT_CACHE_DIR,
};
use constructor::core::builder::new_run_id;
use constructor::core::locator::project_name;
use constructor::core::manifest::{dump_dependencies, render_manifest};
use constructor::core::{Builder, Collaborators, PipExtractor, Server, ServiceLocator};
use constructor::domain::ports::{CommandRunner, ContainerEngine};
use constructor::utils::logger::{self, LogContext};
use constructor::utils::validation::Validate;
use constructor::{ConstructorError, LocatorSettings, Result, ServiceRole};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process-backed ports shared by every command.
struct Runtime {
    runner: Arc<dyn CommandRunner>,
    engine: Arc<dyn ContainerEngine>,
    settings: LocatorSettings,
    log: LogContext,
}

impl Runtime {
    fn locator(&self, clone_path: &Path) -> ServiceLocator {
        ServiceLocator::new(self.engine.clone(), self.settings.clone(), self.log.clone())
            .with_project(project_name(clone_path))
    }

    fn server(&self, clone_path: &Path) -> Server {
        Server::new(
            clone_path,
            self.runner.clone(),
            self.engine.clone(),
            Arc::new(PodmanCompose::new(self.runner.clone())),
            Arc::new(GitCli::new(self.runner.clone())),
            self.log.clone(),
        )
    }

    fn pip(&self, locator: ServiceLocator, cache_dir: &Path) -> PipExtractor {
        PipExtractor::new(
            self.engine.clone(),
            Arc::new(locator),
            cache_dir,
            self.log.clone(),
        )
        .with_repository(
            self.settings.credentials.clone(),
            &self.settings.pip_repository,
        )
    }

    /// One probe of the deployment, printed for `server status` and `pip status`.
    async fn print_status(&self, clone_path: &Path) -> Result<()> {
        let locator = self.locator(clone_path);
        match self.server(clone_path).status(&locator).await? {
            Some(services) => {
                println!("All services are operational");
                for service in services.iter() {
                    println!("  {:<12} {}", service.role(), service.local_url());
                }
            }
            None => println!("Some services are not operational"),
        }
        Ok(())
    }

    async fn nexus(&self, clone_path: &Path) -> Result<NexusClient> {
        let services = self.locator(clone_path).locate(&project_name(clone_path)).await?;
        Ok(NexusClient::new(
            services.get(ServiceRole::RepoManager).local_url(),
            self.settings.credentials.clone(),
        ))
    }
}

fn absolute(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(command: Command, runtime: Runtime, run_id: String) -> Result<()> {
    match command {
        Command::Builder {
            command: BuilderCommand::Build { config, clone },
        } => {
            let clone_path = absolute(&clone.clone_path)?;
            let collaborators = Collaborators {
                engine: runtime.engine.clone(),
                git: Arc::new(GitCli::new(runtime.runner.clone())),
                scripts: Arc::new(BashScriptRunner::new(runtime.runner.clone())),
                services: Arc::new(runtime.locator(&clone_path)),
            };
            let builder =
                Builder::from_config_file(Path::new(&config), collaborators, runtime.log.clone())?
                    .with_repository(
                        runtime.settings.credentials.clone(),
                        &runtime.settings.pip_repository,
                    )
                    .with_run_id(run_id);

            let report = builder.run().await?;
            for image in &report.images {
                println!("{}", image);
            }
            if let Some(manifest) = &report.manifest {
                tracing::info!("Dependency manifest: {}", manifest.display());
            }
        }

        Command::Server { command } => match command {
            ServerCommand::Deploy { clone } => {
                runtime.server(&absolute(&clone.clone_path)?).deploy().await?;
                println!("Cachito server deployed");
            }
            ServerCommand::Stop { clone } => {
                runtime.server(&absolute(&clone.clone_path)?).stop().await?;
                println!("Cachito server stopped");
            }
            ServerCommand::Status { clone } => {
                runtime.print_status(&absolute(&clone.clone_path)?).await?;
            }
        },

        Command::Nexus { command } => match command {
            NexusCommand::ListRepos { json, clone } => {
                let nexus = runtime.nexus(&absolute(&clone.clone_path)?).await?;
                let repos = nexus.list_repositories().await?;
                if json {
                    print_json(&repos)?;
                } else {
                    for repo in &repos {
                        println!("{}", repo["name"].as_str().unwrap_or_default());
                    }
                }
            }
            NexusCommand::ListComponents {
                repo_name,
                json,
                clone,
            } => {
                let nexus = runtime.nexus(&absolute(&clone.clone_path)?).await?;
                let mut components = nexus.list_components(&repo_name).await?;
                components.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
                if json {
                    print_json(&components)?;
                } else {
                    for component in &components {
                        println!("{}", component.pinned());
                    }
                }
            }
            NexusCommand::DescribeRepo {
                repo_name,
                json,
                clone,
            } => {
                let nexus = runtime.nexus(&absolute(&clone.clone_path)?).await?;
                let repo = nexus.describe_repository(&repo_name).await?;
                if json {
                    print_json(&repo)?;
                } else {
                    for key in ["name", "format", "type", "url"] {
                        println!("{:<8} {}", key, repo[key].as_str().unwrap_or("-"));
                    }
                    let components = nexus.list_components(&repo_name).await?;
                    print!("{}", render_manifest(&components));
                }
            }
            NexusCommand::DumpDependencies { output, clone } => {
                let nexus = runtime.nexus(&absolute(&clone.clone_path)?).await?;
                let count = dump_dependencies(
                    &nexus,
                    &runtime.settings.pip_repository,
                    Path::new(&output),
                )
                .await?;
                println!("Wrote {} dependencies to {}", count, output);
            }
        },

        Command::Pip { command } => match command {
            PipCommand::ExtractDependencies {
                requirements_in,
                requirements_out,
                restart_server,
                base_image,
                cache_dir,
                clone,
            } => {
                let clone_path = absolute(&clone.clone_path)?;
                let locator = runtime.locator(&clone_path);
                runtime
                    .server(&clone_path)
                    .ensure_running(&locator, restart_server)
                    .await?;

                let count = runtime
                    .pip(locator, &absolute(&cache_dir)?)
                    .with_base_image(base_image)
                    .extract(Path::new(&requirements_in), Path::new(&requirements_out))
                    .await?;
                println!("Wrote {} dependencies to {}", count, requirements_out);
            }
            PipCommand::Status { clone } => {
                runtime.print_status(&absolute(&clone.clone_path)?).await?;
            }
            PipCommand::DebugProxy {
                requirements_out,
                clone,
            } => {
                let clone_path = absolute(&clone.clone_path)?;
                let count = runtime
                    .pip(runtime.locator(&clone_path), Path::new(DEFAULT_CACHE_DIR))
                    .dump(Path::new(&requirements_out))
                    .await?;
                println!("Wrote {} dependencies to {}", count, requirements_out);
            }
        },
    }
    Ok(())
}

fn report_failure(error: &ConstructorError) -> ! {
    tracing::error!(
        "{} (category: {:?}, severity: {:?})",
        error,
        error.category(),
        error.severity()
    );
    tracing::error!("Recovery suggestion: {}", error.recovery_suggestion());
    eprintln!("{}", error.user_friendly_message());
    eprintln!("Suggestion: {}", error.recovery_suggestion());
    std::process::exit(error.exit_code());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();
    logger::init_cli_logger(cli.verbose);

    let run_id = new_run_id();
    let log = LogContext::root(&run_id);
    tracing::debug!(parent: log.span(), "CLI config: {:?}", cli);

    let settings = match LocatorSettings::from_env().and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => settings,
        Err(e) => report_failure(&e),
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(log.clone()));
    let runtime = Runtime {
        engine: Arc::new(PodmanEngine::new(runner.clone())),
        runner,
        settings,
        log,
    };

    if let Err(e) = dispatch(cli.command, runtime, run_id).await {
        report_failure(&e);
    }
    Ok(())
}
