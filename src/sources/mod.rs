//! Configuration source implementations.

mod config_source;
mod env;
mod file;

pub use config_source::ConfigSource;
pub use env::{EnvSource, REDIS_ENV_PREFIX};
pub use file::FileSource;
