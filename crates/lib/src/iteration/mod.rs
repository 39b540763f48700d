//! Iterations: one versioned sweep of builds.
//!
//! An iteration tracks, per component, where that component is in its
//! lifecycle and the [`Build`] record once one exists:
//!
//! ```text
//! Unregistered -> Registered -> Pending -> Built
//!                      ^           |
//!                      +-----------+  (creation failed or was cancelled)
//! ```
//!
//! Only the owning bucket drives these transitions; everything that writes is
//! crate-private.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::build::Build;
use crate::consts::FINGERPRINT_ENV;

/// Errors that can occur when setting up an iteration.
#[derive(Debug, Error)]
pub enum IterationError {
  /// Neither the options nor the environment supplied a fingerprint.
  #[error("no build fingerprint configured: pass one explicitly or set {env}")]
  MissingFingerprint { env: &'static str },
}

/// Options for creating an [`Iteration`].
#[derive(Debug, Clone, Default)]
pub struct IterationOptions {
  /// Explicit build fingerprint. Takes precedence over the environment.
  pub fingerprint: Option<String>,
}

impl IterationOptions {
  pub fn with_fingerprint(fingerprint: &str) -> Self {
    Self {
      fingerprint: Some(fingerprint.to_string()),
    }
  }

  /// Resolve the fingerprint from the options, falling back to `BUILDMARK_BUILD_FINGERPRINT`.
  ///
  /// Blank values count as unset.
  pub fn resolve_fingerprint(&self) -> Result<String, IterationError> {
    let explicit = self.fingerprint.clone().filter(|fp| !fp.trim().is_empty());
    explicit
      .or_else(|| std::env::var(FINGERPRINT_ENV).ok().filter(|fp| !fp.trim().is_empty()))
      .ok_or(IterationError::MissingFingerprint { env: FINGERPRINT_ENV })
  }
}

/// Where a component is in its build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
  /// Never registered with the iteration.
  Unregistered,
  /// Registered, no build created yet.
  Registered,
  /// A build is being created.
  Pending,
  /// A build exists.
  Built,
}

/// One versioned sweep of builds.
#[derive(Debug)]
pub struct Iteration {
  fingerprint: String,
  run_uuid: Uuid,
  components: Mutex<HashMap<String, ComponentState>>,
  builds: RwLock<HashMap<String, Arc<Build>>>,
}

impl Iteration {
  pub fn new(options: &IterationOptions) -> Result<Self, IterationError> {
    let fingerprint = options.resolve_fingerprint()?;
    let run_uuid = Uuid::new_v4();
    debug!(fingerprint = %fingerprint, run_uuid = %run_uuid, "created iteration");

    Ok(Self {
      fingerprint,
      run_uuid,
      components: Mutex::new(HashMap::new()),
      builds: RwLock::new(HashMap::new()),
    })
  }

  pub fn fingerprint(&self) -> &str {
    &self.fingerprint
  }

  pub fn run_uuid(&self) -> Uuid {
    self.run_uuid
  }

  pub fn state(&self, component: &str) -> ComponentState {
    self
      .components
      .lock()
      .get(component)
      .copied()
      .unwrap_or(ComponentState::Unregistered)
  }

  /// Components registered with this iteration, in no particular order.
  pub fn components(&self) -> Vec<String> {
    self.components.lock().keys().cloned().collect()
  }

  /// Look up the build for `component`.
  pub(crate) fn load(&self, component: &str) -> Option<Arc<Build>> {
    self.builds.read().get(component).cloned()
  }

  /// Insert the build for `component`. Returns `false`, leaving the map
  /// untouched, if one is already stored.
  pub(crate) fn store(&self, component: &str, build: Arc<Build>) -> bool {
    let mut builds = self.builds.write();
    if builds.contains_key(component) {
      return false;
    }
    builds.insert(component.to_string(), build);
    true
  }

  /// All builds, in no particular order.
  pub(crate) fn builds(&self) -> Vec<Arc<Build>> {
    self.builds.read().values().cloned().collect()
  }

  /// Register `component`. Returns `false` if it was already known, in any state.
  pub(crate) fn register(&self, component: &str) -> bool {
    let mut components = self.components.lock();
    if components.contains_key(component) {
      return false;
    }
    components.insert(component.to_string(), ComponentState::Registered);
    true
  }

  /// Claim the right to create the build for `component`.
  ///
  /// Only a `Registered` component can be reserved; any other state is
  /// returned as the error. The reservation moves the component back to
  /// `Registered` when dropped without [`Reservation::complete`].
  pub(crate) fn reserve<'a>(&'a self, component: &'a str) -> Result<Reservation<'a>, ComponentState> {
    let mut components = self.components.lock();
    match components.get_mut(component) {
      Some(state @ ComponentState::Registered) => {
        *state = ComponentState::Pending;
        Ok(Reservation {
          iteration: self,
          component,
          done: false,
        })
      }
      Some(state) => Err(*state),
      None => Err(ComponentState::Unregistered),
    }
  }

  fn release(&self, component: &str) {
    let mut components = self.components.lock();
    if let Some(state @ ComponentState::Pending) = components.get_mut(component) {
      *state = ComponentState::Registered;
    }
  }
}

/// Exclusive claim on creating one component's build.
#[derive(Debug)]
pub(crate) struct Reservation<'a> {
  iteration: &'a Iteration,
  component: &'a str,
  done: bool,
}

impl Reservation<'_> {
  /// Store `build` and mark the component `Built`.
  pub(crate) fn complete(mut self, build: Arc<Build>) {
    let mut components = self.iteration.components.lock();
    if !self.iteration.store(self.component, build) {
      warn!(component = %self.component, "build already stored for pending component, keeping existing");
    }
    components.insert(self.component.to_string(), ComponentState::Built);
    self.done = true;
  }
}

impl Drop for Reservation<'_> {
  fn drop(&mut self) {
    if !self.done {
      debug!(component = %self.component, "releasing build reservation");
      self.iteration.release(self.component);
    }
  }
}
