//! Bundle-Digest: Build Output Contract and Content Hashing for Sitecast
//!
//! This crate knows where a site build leaves its artifacts and how to
//! fingerprint them. The fingerprints feed edge versioning: a bundle whose
//! bytes did not change must hash identically across machines and runs.
//!
//! ## Layer 1 - Build Artifacts
//!
//! Focus: deterministic hashing and a fixed artifact layout.

mod digest;
mod error;
mod layout;

pub use digest::{bundle_size, hash_bundle};
pub use error::BundleError;
pub use layout::{
    BuildOutput, ASSETS_DIR, BUILD_ID_FILE, CACHE_DIR, IMAGE_FUNCTION_DIR, OUTPUT_DIR,
    REVALIDATION_FUNCTION_DIR, SERVER_FUNCTION_DIR,
};

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, BundleError>;
