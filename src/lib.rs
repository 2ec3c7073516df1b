pub mod boot_params;
pub mod clienv;
pub mod companion;
pub mod config;
pub mod error;
pub mod idle;
pub mod plugin;
pub mod privilege;
pub mod properties;
pub mod resolver;
pub mod tuning;

pub use config::RildConfig;
pub use error::{Result, RildError};
pub use resolver::{CliRequest, ModuleLocator, Resolution, Resolver};
