pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::config::build_spec::BuildSpec;
pub use crate::config::settings::LocatorSettings;
pub use crate::core::{BuildReport, Builder, Collaborators, Interceptor, ServiceLocator};
pub use crate::domain::model::{ServiceDescriptor, ServiceRole, ServiceSet};
pub use crate::utils::error::{ConstructorError, Result};
