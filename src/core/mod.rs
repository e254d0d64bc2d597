//! Listener configuration: settings, sources, and the builder.

mod builder;
mod loader;
mod settings;
mod validation;

pub use builder::InvalidatorBuilder;
pub(crate) use loader::ConfigLoader;
pub use settings::{InvalidatorConfig, ReconnectConfig};
pub use validation::Validate;
