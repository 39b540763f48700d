//! Remote artifact registry collaborator.
//!
//! The bookkeeping layer never speaks a wire protocol itself. It hands
//! [`BucketSnapshot`]s and [`BuildSnapshot`]s to a [`RegistryClient`] whenever a build is created or
//! its reported state changes. Transport, retries and authentication are the
//! implementor's concern.


use async_trait::async_trait;
use thiserror::Error;

use crate::bucket::BucketSnapshot;
use crate::build::BuildSnapshot;

/// Errors reported by a registry client.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// The request could not be delivered or answered.
  #[error("registry request failed: {0}")]
  Request(String),

  /// The registry refused the payload for a component.
  #[error("registry rejected build for {component}: {message}")]
  Rejected { component: String, message: String },

  /// The registry has no record the update can apply to.
  #[error("registry record not found: {0}")]
  NotFound(String),
}

/// Creates and updates build records in a remote artifact registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
  /// Create the bucket record, or update its description and labels if it exists.
  async fn upsert_bucket(&self, bucket: &BucketSnapshot) -> Result<(), RegistryError>;

  /// Create the remote record for a new build in `bucket`.
  ///
  /// Returns the identifier the registry assigned to the build.
  async fn create_build(&self, bucket: &str, build: &BuildSnapshot) -> Result<String, RegistryError>;

  /// Push the current state of an existing build in `bucket`.
  async fn update_build(&self, bucket: &str, build: &BuildSnapshot) -> Result<(), RegistryError>;
}
