//! Build output directory contract.
//!
//! The site build leaves its artifacts at fixed paths relative to the site
//! root. `BuildOutput::locate` only computes those paths, so it is safe to
//! call before the build has run; everything that touches disk belongs to
//! the finalization phase.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::BundleError;
use crate::Result;

/// Directory holding the packaged build output
pub const OUTPUT_DIR: &str = ".open-next";
/// Render compute bundle (under `OUTPUT_DIR`)
pub const SERVER_FUNCTION_DIR: &str = "server-function";
/// Revalidation consumer bundle (under `OUTPUT_DIR`)
pub const REVALIDATION_FUNCTION_DIR: &str = "revalidation-function";
/// Image transform bundle (under `OUTPUT_DIR`)
pub const IMAGE_FUNCTION_DIR: &str = "image-optimization-function";
/// Static assets (under `OUTPUT_DIR`)
pub const ASSETS_DIR: &str = "assets";
/// Prerendered cache artifacts (under `OUTPUT_DIR`)
pub const CACHE_DIR: &str = "cache";
/// Build identifier file (relative to the site root)
pub const BUILD_ID_FILE: &str = ".next/BUILD_ID";

/// Resolved artifact paths of one site build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    pub root: PathBuf,
    pub server_bundle: PathBuf,
    pub revalidation_bundle: PathBuf,
    pub image_bundle: PathBuf,
    pub assets_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub build_id_file: PathBuf,
}

impl BuildOutput {
    /// Compute artifact paths under `root` without touching disk.
    pub fn locate(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let output = root.join(OUTPUT_DIR);
        Self {
            server_bundle: output.join(SERVER_FUNCTION_DIR),
            revalidation_bundle: output.join(REVALIDATION_FUNCTION_DIR),
            image_bundle: output.join(IMAGE_FUNCTION_DIR),
            assets_dir: output.join(ASSETS_DIR),
            cache_dir: output.join(CACHE_DIR),
            build_id_file: root.join(BUILD_ID_FILE),
            root,
        }
    }

    /// Fail with the first missing artifact, if any.
    pub fn verify(&self) -> Result<()> {
        for path in [
            &self.server_bundle,
            &self.revalidation_bundle,
            &self.image_bundle,
            &self.assets_dir,
            &self.build_id_file,
        ] {
            if !path.exists() {
                return Err(BundleError::MissingArtifact(path.clone()));
            }
        }
        Ok(())
    }

    /// Read the build identifier as a trimmed string.
    pub fn read_build_id(&self) -> Result<String> {
        if !self.build_id_file.is_file() {
            return Err(BundleError::MissingArtifact(self.build_id_file.clone()));
        }
        let id = std::fs::read_to_string(&self.build_id_file)?;
        let id = id.trim();
        if id.is_empty() {
            return Err(BundleError::EmptyBuildId(self.build_id_file.clone()));
        }
        Ok(id.to_string())
    }
}
