//! Configuration validation support.

use crate::error::ValidationError;

/// Trait for configuration validation.
///
/// [`InvalidatorConfig`](crate::core::InvalidatorConfig) implements this and
/// the builder calls it before a listener is created.
///
/// # Examples
///
/// ```rust
/// use keyspace_invalidator::core::Validate;
/// use keyspace_invalidator::error::ValidationError;
///
/// struct Namespace(String);
///
/// impl Validate for Namespace {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.0.contains(' ') {
///             return Err(ValidationError::invalid_field(
///                 "namespace",
///                 "must not contain spaces",
///             ));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
