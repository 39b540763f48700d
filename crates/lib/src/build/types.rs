use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a build as reported to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
  #[default]
  Unset,
  Running,
  Done,
  Failed,
  Cancelled,
}

impl BuildStatus {
  /// Terminal statuses accept no further transitions.
  pub fn is_terminal(self) -> bool {
    matches!(self, BuildStatus::Done | BuildStatus::Failed | BuildStatus::Cancelled)
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BuildStatus::Unset => "UNSET",
      BuildStatus::Running => "RUNNING",
      BuildStatus::Done => "DONE",
      BuildStatus::Failed => "FAILED",
      BuildStatus::Cancelled => "CANCELLED",
    };
    f.write_str(name)
  }
}

/// An artifact published by a build, e.g. a machine image in one cloud region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
  pub image_id: String,
  pub provider_name: String,
  pub region: String,
}

impl Image {
  pub fn new(image_id: &str, provider_name: &str, region: &str) -> Self {
    Self {
      image_id: image_id.to_string(),
      provider_name: provider_name.to_string(),
      region: region.to_string(),
    }
  }
}

/// Point-in-time value copy of a [`Build`], used as the registry payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
  /// Identifier assigned by the registry. Empty until the build was created remotely.
  pub id: String,
  pub component_type: String,
  pub fingerprint: String,
  pub run_uuid: Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cloud_provider: Option<String>,
  pub labels: HashMap<String, String>,
  pub images: Vec<Image>,
  pub status: BuildStatus,
}

/// Outcome of a status change request on a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
  /// The build already had the requested status.
  Unchanged,
  /// The status was updated.
  Applied,
  /// The build is in a terminal status and kept it.
  Rejected(BuildStatus),
}

#[derive(Debug, Default)]
struct BuildState {
  cloud_provider: Option<String>,
  labels: HashMap<String, String>,
  images: Vec<Image>,
  status: BuildStatus,
}

/// Metadata record for one component's build output.
#[derive(Debug)]
pub struct Build {
  id: String,
  component_type: String,
  fingerprint: String,
  run_uuid: Uuid,
  state: Mutex<BuildState>,
  transition: tokio::sync::Mutex<()>,
}

impl Build {
  /// Create a running build seeded with `labels`.
  ///
  /// The labels are taken by value, so the build never aliases the caller's map.
  pub fn new(component_type: &str, fingerprint: &str, run_uuid: Uuid, labels: HashMap<String, String>) -> Self {
    Self {
      id: String::new(),
      component_type: component_type.to_string(),
      fingerprint: fingerprint.to_string(),
      run_uuid,
      state: Mutex::new(BuildState {
        labels,
        status: BuildStatus::Running,
        ..Default::default()
      }),
      transition: tokio::sync::Mutex::new(()),
    }
  }

  /// Attach the identifier the registry assigned to this build.
  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = id.into();
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn component_type(&self) -> &str {
    &self.component_type
  }

  pub fn fingerprint(&self) -> &str {
    &self.fingerprint
  }

  pub fn run_uuid(&self) -> Uuid {
    self.run_uuid
  }

  pub fn labels(&self) -> HashMap<String, String> {
    self.state.lock().labels.clone()
  }

  pub fn status(&self) -> BuildStatus {
    self.state.lock().status
  }

  pub fn images(&self) -> Vec<Image> {
    self.state.lock().images.clone()
  }

  pub fn cloud_provider(&self) -> Option<String> {
    self.state.lock().cloud_provider.clone()
  }

  /// Merge `labels` into this build's labels.
  ///
  /// New keys are added, colliding keys take the incoming value, and keys
  /// absent from `labels` are left untouched. Returns how many keys were new.
  pub fn merge_labels(&self, labels: HashMap<String, String>) -> usize {
    let mut state = self.state.lock();
    let before = state.labels.len();
    state.labels.extend(labels);
    state.labels.len() - before
  }

  /// Append published images. The first image's provider becomes the build's
  /// cloud provider unless one is already set.
  pub fn add_images(&self, images: Vec<Image>) {
    let mut state = self.state.lock();
    if state.cloud_provider.is_none()
      && let Some(first) = images.first()
    {
      state.cloud_provider = Some(first.provider_name.clone());
    }
    state.images.extend(images);
  }

  /// Hold exclusive rights to change this build's status.
  ///
  /// A status change spans a registry round trip; holding the guard across the
  /// check, the push and [`Build::set_status`] keeps the registry and the local
  /// record in step.
  pub async fn lock_transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
    self.transition.lock().await
  }

  /// Move the build to `status` unless it already reached a terminal status.
  pub fn set_status(&self, status: BuildStatus) -> StatusChange {
    let mut state = self.state.lock();
    if state.status == status {
      return StatusChange::Unchanged;
    }
    if state.status.is_terminal() {
      return StatusChange::Rejected(state.status);
    }
    state.status = status;
    StatusChange::Applied
  }

  pub fn snapshot(&self) -> BuildSnapshot {
    let state = self.state.lock();
    BuildSnapshot {
      id: self.id.clone(),
      component_type: self.component_type.clone(),
      fingerprint: self.fingerprint.clone(),
      run_uuid: self.run_uuid,
      cloud_provider: state.cloud_provider.clone(),
      labels: state.labels.clone(),
      images: state.images.clone(),
      status: state.status,
    }
  }
}
