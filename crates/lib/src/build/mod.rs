//! Build records.
//!
//! A build is the metadata record for one component's build output within an
//! iteration. It is created once per component, never replaced, and only
//! mutated through its labels, images and status.
//!
//! # Characteristics
//!
//! - **Keyed**: Each build belongs to exactly one component type, fixed at creation
//! - **Synchronized**: Mutable state sits behind a per-build lock, so pipeline stages
//!   can report labels while another task reads the build for export
//! - **Exportable**: [`Build::snapshot`] yields a serializable value copy for the registry

mod types;

pub use types::*;
