mod config;
mod factory;
mod paths;
mod prerequisites;
mod process;
mod sandbox;

pub use config::ProcessConfig;
pub use factory::ProcessFactory;
pub use paths::{FactoryPaths, SandboxPaths};
pub use prerequisites::check_prerequisites;
pub use crate::sandbox::ProcessSandbox;
