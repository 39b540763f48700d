use thiserror::Error;

use crate::build::BuildStatus;
use crate::iteration::IterationError;
use crate::registry::RegistryError;

/// Errors returned by [`Bucket`](super::Bucket) operations.
///
/// Each error is scoped to the component it names; other components' builds
/// are unaffected.
#[derive(Debug, Error)]
pub enum BucketError {
  /// A build was requested for a component that was never registered.
  #[error("component not registered: {0}")]
  ComponentNotRegistered(String),

  /// A build already exists, or is being created, for the component.
  #[error("build already exists for component: {0}")]
  BuildAlreadyExists(String),

  /// No build exists yet for the component.
  #[error("build not found for component: {0}")]
  BuildNotFound(String),

  /// The build reached a terminal status and accepts no further status changes.
  #[error("build for {component} is already {status}")]
  BuildFinalized { component: String, status: BuildStatus },

  /// A build cannot be completed without published images.
  #[error("build for {0} has no images to publish")]
  NoImages(String),

  /// The bucket slug is empty.
  #[error("bucket slug must not be empty")]
  InvalidSlug,

  /// The operation was cancelled before the registry answered.
  #[error("operation cancelled")]
  Cancelled,

  #[error("registry error: {0}")]
  Registry(#[from] RegistryError),

  #[error("iteration error: {0}")]
  Iteration(#[from] IterationError),
}
