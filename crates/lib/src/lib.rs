//! buildmark-lib: In-process bookkeeping of build artifact metadata
//!
//! This crate tracks what an image-build pipeline produced so the metadata
//! can be reported to a remote artifact registry:
//! - `Bucket`: a named collection of build metadata, the entry point for callers
//! - `Iteration`: one versioned sweep of builds owned by a bucket
//! - `Build`: the metadata record for one component's build output
//! - `RegistryClient`: the remote registry collaborator

pub mod bucket;
pub mod build;
pub mod consts;
pub mod iteration;
pub mod registry;

pub use bucket::{Bucket, BucketError, BucketSnapshot};
pub use build::{Build, BuildSnapshot, BuildStatus, Image};
pub use iteration::{ComponentState, Iteration, IterationError, IterationOptions};
pub use registry::{RegistryClient, RegistryError};
