pub mod build_spec;
pub mod settings;

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "./constructor.yml";
pub const DEFAULT_CLONE_PATH: &str = "./cache/cachito_repo";
pub const DEFAULT_CACHE_DIR: &str = "./cache";
pub const DEFAULT_REQUIREMENTS_IN: &str = "./requirements-in.txt";
pub const DEFAULT_REQUIREMENTS_OUT: &str = "./requirements-out.txt";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "constructor")]
#[command(about = "Build container images with dependencies proxied through Cachito services")]
pub struct CliConfig {
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct CloneArgs {
    /// Path where the Cachito repository is located
    #[arg(short = 'p', long, default_value = DEFAULT_CLONE_PATH)]
    pub clone_path: String,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Container builder commands
    Builder {
        #[command(subcommand)]
        command: BuilderCommand,
    },
    /// Cachito server commands
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },
    /// Sonatype Nexus commands
    Nexus {
        #[command(subcommand)]
        command: NexusCommand,
    },
    /// Pip server commands
    Pip {
        #[command(subcommand)]
        command: PipCommand,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum BuilderCommand {
    /// Build every container declared in the configuration file
    Build {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,

        #[command(flatten)]
        clone: CloneArgs,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum ServerCommand {
    /// Deploy a new Cachito server with all the related services
    Deploy {
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Stop the Cachito server
    Stop {
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Show the status of the Cachito server
    Status {
        #[command(flatten)]
        clone: CloneArgs,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum NexusCommand {
    /// List Nexus repositories
    ListRepos {
        #[arg(long, help = "Print JSON")]
        json: bool,
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// List components in a Nexus repository
    ListComponents {
        repo_name: String,
        #[arg(long, help = "Print JSON")]
        json: bool,
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Describe a Nexus repository
    DescribeRepo {
        repo_name: String,
        #[arg(long, help = "Print JSON")]
        json: bool,
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Write the pip proxy's observed dependencies to a file
    DumpDependencies {
        #[arg(short, long)]
        output: String,
        #[command(flatten)]
        clone: CloneArgs,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum PipCommand {
    /// Resolve requirements-in.txt through the pip proxy and write the pinned result
    ExtractDependencies {
        #[arg(short = 'i', long, default_value = DEFAULT_REQUIREMENTS_IN)]
        requirements_in: String,
        #[arg(short = 'o', long, default_value = DEFAULT_REQUIREMENTS_OUT)]
        requirements_out: String,
        /// Restart the Cachito server to clean the cache
        #[arg(short = 'r', long)]
        restart_server: bool,
        #[arg(long, default_value = crate::core::pip::DEFAULT_BASE_IMAGE)]
        base_image: String,
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: String,
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Show the status of the Cachito server
    Status {
        #[command(flatten)]
        clone: CloneArgs,
    },
    /// Write what the pip proxy currently holds, without building
    DebugProxy {
        #[arg(short = 'o', long)]
        requirements_out: String,
        #[command(flatten)]
        clone: CloneArgs,
    },
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let cli = CliConfig::try_parse_from(["constructor", "builder", "build"]).unwrap();
        match cli.command {
            Command::Builder {
                command: BuilderCommand::Build { config, clone },
            } => {
                assert_eq!(config, DEFAULT_CONFIG_PATH);
                assert_eq!(clone.clone_path, DEFAULT_CLONE_PATH);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_build_with_config_and_verbose() {
        let cli = CliConfig::try_parse_from([
            "constructor",
            "builder",
            "build",
            "-c",
            "ci/constructor.yml",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Builder {
                command: BuilderCommand::Build { ref config, .. }
            } if config == "ci/constructor.yml"
        ));
    }

    #[test]
    fn test_nexus_list_components_requires_repo() {
        assert!(CliConfig::try_parse_from(["constructor", "nexus", "list-components"]).is_err());
        assert!(CliConfig::try_parse_from([
            "constructor",
            "nexus",
            "list-components",
            "cachito-pip-proxy",
            "--json"
        ])
        .is_ok());
    }

    #[test]
    fn test_pip_extract_defaults_and_restart() {
        let cli =
            CliConfig::try_parse_from(["constructor", "pip", "extract-dependencies", "-r"]).unwrap();
        match cli.command {
            Command::Pip {
                command:
                    PipCommand::ExtractDependencies {
                        requirements_in,
                        requirements_out,
                        restart_server,
                        ..
                    },
            } => {
                assert_eq!(requirements_in, DEFAULT_REQUIREMENTS_IN);
                assert_eq!(requirements_out, DEFAULT_REQUIREMENTS_OUT);
                assert!(restart_server);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_pip_debug_proxy_requires_output() {
        assert!(CliConfig::try_parse_from(["constructor", "pip", "debug-proxy"]).is_err());
        assert!(CliConfig::try_parse_from(["constructor", "pip", "debug-proxy", "-o", "out.txt"]).is_ok());
        assert!(CliConfig::try_parse_from(["constructor", "pip", "status"]).is_ok());
    }
}
