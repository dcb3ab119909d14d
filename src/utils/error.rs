use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConstructorError {
    #[error("Invalid value for '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError { path: String, message: String },

    #[error("Services are not available after {attempts} attempts: {last_error}")]
    ServiceUnavailableError { attempts: u32, last_error: String },

    #[error("Service '{service}' is misconfigured: {reason}")]
    ServiceMisconfiguredError { service: String, reason: String },

    #[error("Failed to fetch source '{url}' at '{reference}': {message}")]
    SourceFetchError {
        url: String,
        reference: String,
        message: String,
    },

    #[error("Build of image '{image}' failed with exit code {exit_code}: {message}")]
    BuildFailure {
        image: String,
        exit_code: i32,
        message: String,
    },

    #[error("Cannot intercept build file '{path}': {message}")]
    InterceptionError { path: String, message: String },

    #[error("Command '{command}' exited with status {exit_code}: {stderr}")]
    CommandError {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Dependency resolution failed: {message}")]
    DependencyResolutionError { message: String },

    #[error("Repository manager request to '{url}' returned status {status}")]
    NexusError { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Services,
    Sources,
    Build,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ConstructorError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn interception(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::InterceptionError {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError { .. }
            | Self::MissingConfigError { .. }
            | Self::ConfigParseError { .. }
            | Self::YamlError(_) => ErrorCategory::Configuration,
            Self::ServiceUnavailableError { .. }
            | Self::ServiceMisconfiguredError { .. }
            | Self::NexusError { .. }
            | Self::HttpError(_)
            | Self::JsonError(_) => ErrorCategory::Services,
            Self::SourceFetchError { .. } => ErrorCategory::Sources,
            Self::BuildFailure { .. }
            | Self::InterceptionError { .. }
            | Self::CommandError { .. }
            | Self::DependencyResolutionError { .. }
            | Self::TomlError(_) => ErrorCategory::Build,
            Self::IoError(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ServiceUnavailableError { .. } | Self::HttpError(_) => ErrorSeverity::Medium,
            Self::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Process exit code for the CLI. Every error is fatal, so none map to 0.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ValidationError { field, .. } => {
                format!("Fix the '{}' field in the build configuration", field)
            }
            Self::MissingConfigError { field } => format!("Provide '{}' and retry", field),
            Self::ConfigParseError { .. } | Self::YamlError(_) => {
                "Check that the configuration file is valid YAML".to_string()
            }
            Self::ServiceUnavailableError { .. } => {
                "Start the services with 'constructor server deploy' and retry".to_string()
            }
            Self::ServiceMisconfiguredError { service, .. } => {
                format!("Inspect the '{}' container and redeploy the services", service)
            }
            Self::SourceFetchError { url, .. } => {
                format!("Check that '{}' is reachable and the ref exists", url)
            }
            Self::BuildFailure { image, .. } => {
                format!("Inspect the build output for '{}' above", image)
            }
            Self::InterceptionError { .. } => {
                "Add '#<cachito-disable>' followed later by '#<cachito-proxy>' to the Containerfile"
                    .to_string()
            }
            Self::CommandError { .. } => "Rerun with --verbose to see the command".to_string(),
            Self::DependencyResolutionError { .. } => {
                "Check the declared python dependencies and python version".to_string()
            }
            Self::NexusError { .. } | Self::HttpError(_) | Self::JsonError(_) => {
                "Check that the repository manager is running".to_string()
            }
            Self::IoError(_) | Self::TomlError(_) => {
                "Check permissions on the working directory".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Services => format!("Backing services problem: {}", self),
            ErrorCategory::Sources => format!("Source checkout problem: {}", self),
            ErrorCategory::Build => format!("Build problem: {}", self),
            ErrorCategory::Io => format!("Filesystem problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConstructorError>;
