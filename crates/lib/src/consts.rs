//! Constants shared across the crate.

/// Environment variable supplying the build fingerprint when none is configured.
pub const FINGERPRINT_ENV: &str = "BUILDMARK_BUILD_FINGERPRINT";
