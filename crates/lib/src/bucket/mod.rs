//! Buckets: the entry point for the build orchestration layer.
//!
//! A bucket owns exactly one [`Iteration`] and mediates every write to it.
//! The orchestration layer typically:
//! 1. Initializes the bucket record in the registry
//! 2. Registers each component it intends to build
//! 3. Creates the initial build per component, often from one task per component
//! 4. Merges labels and images into builds as pipeline steps produce metadata
//! 5. Reports the final status of each build
//!
//! Operations that reach the registry take a [`CancellationToken`]; the
//! in-memory bookkeeping itself never blocks on I/O.

mod error;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::build::{Build, BuildStatus, Image, StatusChange};
use crate::iteration::{ComponentState, Iteration, IterationOptions};
use crate::registry::{RegistryClient, RegistryError};

pub use error::BucketError;

/// Bucket-level metadata sent to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSnapshot {
  pub slug: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub labels: HashMap<String, String>,
}

/// A named collection of build metadata for one pipeline run.
pub struct Bucket {
  /// Human-readable bucket name.
  pub slug: String,
  pub description: String,
  /// Labels describing the bucket itself.
  pub bucket_labels: HashMap<String, String>,
  /// Labels applied to every build at creation time.
  pub build_labels: HashMap<String, String>,
  iteration: Iteration,
  client: Arc<dyn RegistryClient>,
}

impl std::fmt::Debug for Bucket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Bucket")
      .field("slug", &self.slug)
      .field("description", &self.description)
      .field("bucket_labels", &self.bucket_labels)
      .field("build_labels", &self.build_labels)
      .field("iteration", &self.iteration)
      .finish_non_exhaustive()
  }
}

impl Bucket {
  /// Create a bucket with a fresh iteration.
  pub fn new(slug: &str, options: IterationOptions, client: Arc<dyn RegistryClient>) -> Result<Self, BucketError> {
    let bucket = Self {
      slug: slug.to_string(),
      description: String::new(),
      bucket_labels: HashMap::new(),
      build_labels: HashMap::new(),
      iteration: Iteration::new(&options)?,
      client,
    };
    bucket.validate()?;

    info!(
      bucket = %bucket.slug,
      fingerprint = %bucket.iteration.fingerprint(),
      "created bucket"
    );
    Ok(bucket)
  }

  pub fn validate(&self) -> Result<(), BucketError> {
    if self.slug.trim().is_empty() {
      return Err(BucketError::InvalidSlug);
    }
    Ok(())
  }

  /// Create or update the bucket record in the registry with the bucket's
  /// description and labels.
  pub async fn initialize(&self, cancel: &CancellationToken) -> Result<(), BucketError> {
    self.validate()?;
    let payload = self.snapshot();
    with_cancel(cancel, self.client.upsert_bucket(&payload)).await?;
    info!(bucket = %self.slug, label_count = payload.labels.len(), "initialized bucket");
    Ok(())
  }

  pub fn snapshot(&self) -> BucketSnapshot {
    BucketSnapshot {
      slug: self.slug.clone(),
      description: self.description.clone(),
      labels: self.bucket_labels.clone(),
    }
  }

  pub fn iteration(&self) -> &Iteration {
    &self.iteration
  }

  /// Declare the intent to build `component`.
  ///
  /// Registering a component that is already known, in any state, is a no-op.
  pub fn register_build_for_component(&self, component: &str) {
    if self.iteration.register(component) {
      debug!(bucket = %self.slug, component = %component, "registered component");
    } else {
      debug!(bucket = %self.slug, component = %component, "component already registered");
    }
  }

  pub fn component_state(&self, component: &str) -> ComponentState {
    self.iteration.state(component)
  }

  /// Create the build record for a registered `component` and announce it to the registry.
  ///
  /// The build is seeded with a copy of the bucket's current `build_labels`.
  /// If the registry call fails or `cancel` fires, nothing is stored and the
  /// component stays registered, so the creation can be retried.
  pub async fn create_initial_build_for_iteration(
    &self,
    cancel: &CancellationToken,
    component: &str,
  ) -> Result<(), BucketError> {
    let reservation = match self.iteration.reserve(component) {
      Ok(reservation) => reservation,
      Err(ComponentState::Unregistered) => return Err(BucketError::ComponentNotRegistered(component.to_string())),
      Err(state) => {
        debug!(component = %component, state = ?state, "refusing duplicate build");
        return Err(BucketError::BuildAlreadyExists(component.to_string()));
      }
    };

    let build = Build::new(
      component,
      self.iteration.fingerprint(),
      self.iteration.run_uuid(),
      self.build_labels.clone(),
    );

    let id = match with_cancel(cancel, self.client.create_build(&self.slug, &build.snapshot())).await {
      Ok(id) => id,
      Err(e) => {
        warn!(bucket = %self.slug, component = %component, error = %e, "failed to create build");
        return Err(e);
      }
    };

    let build = Arc::new(build.with_id(id));
    info!(
      bucket = %self.slug,
      component = %component,
      build_id = %build.id(),
      label_count = build.labels().len(),
      "created initial build"
    );
    reservation.complete(build);
    Ok(())
  }

  /// Merge `labels` into the build for `component`.
  ///
  /// Incoming values win on key collisions; existing keys not in `labels` are kept.
  /// The merged labels reach the registry with the build's next status update.
  pub fn update_labels_for_build(&self, component: &str, labels: HashMap<String, String>) -> Result<(), BucketError> {
    let build = self.require_build(component)?;
    let added = build.merge_labels(labels);
    debug!(component = %component, added, "merged build labels");
    Ok(())
  }

  /// Record images published by the build for `component`.
  pub fn update_images_for_build(&self, component: &str, images: Vec<Image>) -> Result<(), BucketError> {
    let build = self.require_build(component)?;
    debug!(component = %component, count = images.len(), "adding build images");
    build.add_images(images);
    Ok(())
  }

  /// Report a new status for the build of `component`.
  ///
  /// The registry is updated first and the local record afterwards. Reporting
  /// the status the build already has is a no-op. Concurrent reports for one
  /// build are applied one at a time, so a build that reached a terminal status
  /// is never pushed again.
  pub async fn update_build_status(
    &self,
    cancel: &CancellationToken,
    component: &str,
    status: BuildStatus,
  ) -> Result<(), BucketError> {
    let build = self.require_build(component)?;

    let _transition = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(BucketError::Cancelled),
      guard = build.lock_transition() => guard,
    };

    let current = build.status();
    if current == status {
      debug!(component = %component, status = %status, "build status unchanged");
      return Ok(());
    }
    if current.is_terminal() {
      return Err(BucketError::BuildFinalized {
        component: component.to_string(),
        status: current,
      });
    }

    let mut payload = build.snapshot();
    payload.status = status;
    with_cancel(cancel, self.client.update_build(&self.slug, &payload)).await?;

    match build.set_status(status) {
      StatusChange::Rejected(current) => Err(BucketError::BuildFinalized {
        component: component.to_string(),
        status: current,
      }),
      StatusChange::Applied | StatusChange::Unchanged => {
        info!(bucket = %self.slug, component = %component, status = %status, "updated build status");
        Ok(())
      }
    }
  }

  /// Mark the build for `component` as done.
  ///
  /// A build must have published at least one image to be completed.
  pub async fn mark_build_complete(&self, cancel: &CancellationToken, component: &str) -> Result<(), BucketError> {
    let build = self.require_build(component)?;
    if build.images().is_empty() {
      return Err(BucketError::NoImages(component.to_string()));
    }
    self.update_build_status(cancel, component, BuildStatus::Done).await
  }

  pub fn build(&self, component: &str) -> Option<Arc<Build>> {
    self.iteration.load(component)
  }

  /// All builds of the iteration, in no particular order.
  pub fn builds(&self) -> Vec<Arc<Build>> {
    self.iteration.builds()
  }

  fn require_build(&self, component: &str) -> Result<Arc<Build>, BucketError> {
    self
      .iteration
      .load(component)
      .ok_or_else(|| BucketError::BuildNotFound(component.to_string()))
  }
}

/// Run a registry call unless `cancel` fires first.
async fn with_cancel<T>(
  cancel: &CancellationToken,
  call: impl Future<Output = Result<T, RegistryError>>,
) -> Result<T, BucketError> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(BucketError::Cancelled),
    result = call => Ok(result?),
  }
}
