pub mod builder;
pub mod interceptor;
pub mod locator;
pub mod manifest;
pub mod pip;
pub mod proxy_script;
pub mod python;
pub mod server;

pub use builder::{BuildReport, BuildStage, Builder, Collaborators};
pub use interceptor::Interceptor;
pub use locator::{ProbeOutcome, ServiceLocator};
pub use pip::PipExtractor;
pub use server::Server;
